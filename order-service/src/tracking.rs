use std::fmt;

use chrono::{DateTime, Duration, Utc};
use common_money::Money;
use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::order::{OrderRecord, OrderStatus, PaymentMethod};
use crate::payment::PaymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingStatus {
    #[serde(rename = "Order Placed")]
    OrderPlaced,
    Confirmed,
    Packaging,
    Shipped,
    #[serde(rename = "Out for Delivery")]
    OutForDelivery,
    Delivered,
    Cancelled,
}

/// The forward path, in order. `Cancelled` sits outside it.
pub const FORWARD_STEPS: [TrackingStatus; 6] = [
    TrackingStatus::OrderPlaced,
    TrackingStatus::Confirmed,
    TrackingStatus::Packaging,
    TrackingStatus::Shipped,
    TrackingStatus::OutForDelivery,
    TrackingStatus::Delivered,
];

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::OrderPlaced => "Order Placed",
            TrackingStatus::Confirmed => "Confirmed",
            TrackingStatus::Packaging => "Packaging",
            TrackingStatus::Shipped => "Shipped",
            TrackingStatus::OutForDelivery => "Out for Delivery",
            TrackingStatus::Delivered => "Delivered",
            TrackingStatus::Cancelled => "Cancelled",
        }
    }

    /// Accepts the display label in any case, or its snake_case form.
    pub fn parse(s: &str) -> Option<TrackingStatus> {
        let key = s.trim().to_ascii_lowercase().replace('_', " ");
        match key.as_str() {
            "order placed" => Some(TrackingStatus::OrderPlaced),
            "confirmed" => Some(TrackingStatus::Confirmed),
            "packaging" => Some(TrackingStatus::Packaging),
            "shipped" => Some(TrackingStatus::Shipped),
            "out for delivery" => Some(TrackingStatus::OutForDelivery),
            "delivered" => Some(TrackingStatus::Delivered),
            "cancelled" => Some(TrackingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn rank(&self) -> Option<usize> {
        FORWARD_STEPS.iter().position(|s| s == self)
    }

    pub fn is_cancellable(&self) -> bool {
        !matches!(self, TrackingStatus::OutForDelivery | TrackingStatus::Delivered | TrackingStatus::Cancelled)
    }

    pub fn description(&self) -> &'static str {
        match self {
            TrackingStatus::OrderPlaced => "Your order has been placed successfully",
            TrackingStatus::Confirmed => "Order confirmed and being prepared",
            TrackingStatus::Packaging => "Your order is being packed",
            TrackingStatus::Shipped => "Your order has been shipped",
            TrackingStatus::OutForDelivery => "Your order is out for delivery",
            TrackingStatus::Delivered => "Your order has been delivered",
            TrackingStatus::Cancelled => "Your order has been cancelled",
        }
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub status: TrackingStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracking {
    pub code: String,
    pub status: TrackingStatus,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub carrier: String,
    pub last_updated: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub history: Vec<TrackingEvent>,
}

impl Tracking {
    pub fn new(code: String, carrier: String, estimated_delivery: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            code,
            status: TrackingStatus::OrderPlaced,
            estimated_delivery,
            carrier,
            last_updated: now,
            delivered_at: None,
            history: vec![TrackingEvent { status: TrackingStatus::OrderPlaced, at: now }],
        }
    }

    /// Move to `status` unconditionally, stamping the time. Callers check legality.
    pub fn record(&mut self, status: TrackingStatus, now: DateTime<Utc>) {
        self.status = status;
        self.last_updated = now;
        self.history.push(TrackingEvent { status, at: now });
    }

    pub fn reached_at(&self, status: TrackingStatus) -> Option<DateTime<Utc>> {
        self.history.iter().rev().find(|e| e.status == status).map(|e| e.at)
    }
}

#[derive(Debug, Clone)]
pub struct TrackingPolicy {
    pub shipped_estimate_days: i64,
    pub default_carrier: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingChange {
    pub from: TrackingStatus,
    pub to: TrackingStatus,
    /// Set when cancellation turned a captured payment into a refund obligation.
    pub refund_owed: Option<Money>,
}

/// Cancel the order while the shipment has not left for delivery. A captured gateway
/// payment becomes `refunded`; no money moves here.
pub fn cancel_record(record: &mut OrderRecord, now: DateTime<Utc>) -> Result<TrackingChange, OrderError> {
    let from = record.tracking.status;
    if !from.is_cancellable() {
        return Err(OrderError::NotCancellable { current: from.as_str().to_string() });
    }
    record.order.status = OrderStatus::Cancelled;
    record.order.touch(now);
    record.tracking.record(TrackingStatus::Cancelled, now);

    let refund_owed = if record.payment.owes_refund_on_cancel() {
        record.payment.transition(PaymentStatus::Refunded, now)?;
        Some(record.payment.amount)
    } else {
        None
    };
    Ok(TrackingChange { from, to: TrackingStatus::Cancelled, refund_owed })
}

/// Move tracking to any later forward step; jumping ahead (Confirmed to Delivered) is allowed,
/// going back is not. A gateway order only moves forward once its payment is captured.
pub fn advance_record(
    record: &mut OrderRecord,
    to: TrackingStatus,
    now: DateTime<Utc>,
    policy: &TrackingPolicy,
) -> Result<TrackingChange, OrderError> {
    let from = record.tracking.status;
    let invalid = || OrderError::InvalidTransition {
        entity: "tracking",
        current: from.as_str().to_string(),
        requested: to.as_str().to_string(),
    };

    if record.tracking.carrier.trim().is_empty() {
        record.tracking.carrier = policy.default_carrier.clone();
    }

    if to == TrackingStatus::Cancelled {
        if !from.is_cancellable() {
            return Err(invalid());
        }
        return cancel_record(record, now);
    }

    match (from.rank(), to.rank()) {
        (Some(current), Some(next)) if next > current => {}
        _ => return Err(invalid()),
    }
    let payment = &record.payment;
    if payment.method == PaymentMethod::Gateway && payment.status != PaymentStatus::Completed {
        return Err(OrderError::PaymentOutstanding { current: payment.status.as_str().to_string() });
    }

    let tracking = &mut record.tracking;
    if to.rank() >= TrackingStatus::Shipped.rank() && tracking.estimated_delivery.is_none() {
        tracking.estimated_delivery = Some(now + Duration::days(policy.shipped_estimate_days));
    }
    if to == TrackingStatus::Delivered {
        tracking.delivered_at = Some(now);
    }
    tracking.record(to, now);
    record.order.touch(now);
    Ok(TrackingChange { from, to, refund_owed: None })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineStep {
    pub status: TrackingStatus,
    pub completed: bool,
    pub at: Option<DateTime<Utc>>,
}

/// The six forward steps with completion flags. A cancelled shipment shows the steps it
/// actually reached.
pub fn timeline(tracking: &Tracking) -> Vec<TimelineStep> {
    let current = tracking.status.rank();
    FORWARD_STEPS
        .iter()
        .map(|step| {
            let at = tracking.reached_at(*step);
            let passed = match (current, step.rank()) {
                (Some(c), Some(s)) => s <= c,
                _ => false,
            };
            TimelineStep { status: *step, completed: passed || at.is_some(), at }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_labels_and_snake_case() {
        assert_eq!(TrackingStatus::parse("Out for Delivery"), Some(TrackingStatus::OutForDelivery));
        assert_eq!(TrackingStatus::parse("out_for_delivery"), Some(TrackingStatus::OutForDelivery));
        assert_eq!(TrackingStatus::parse("SHIPPED"), Some(TrackingStatus::Shipped));
        assert_eq!(TrackingStatus::parse("lost"), None);
    }

    #[test]
    fn cancellable_only_before_dispatch() {
        assert!(TrackingStatus::OrderPlaced.is_cancellable());
        assert!(TrackingStatus::Shipped.is_cancellable());
        assert!(!TrackingStatus::OutForDelivery.is_cancellable());
        assert!(!TrackingStatus::Delivered.is_cancellable());
        assert!(!TrackingStatus::Cancelled.is_cancellable());
    }

    #[test]
    fn timeline_marks_reached_steps() {
        let t0 = Utc::now();
        let mut t = Tracking::new("TRK000001".into(), "Bazar Express".into(), None, t0);
        t.record(TrackingStatus::Confirmed, t0 + Duration::hours(1));
        t.record(TrackingStatus::Shipped, t0 + Duration::hours(5));
        let steps = timeline(&t);
        assert_eq!(steps.len(), 6);
        let done: Vec<bool> = steps.iter().map(|s| s.completed).collect();
        assert_eq!(done, [true, true, true, true, false, false]);
        // Packaging was skipped: completed, but no timestamp of its own.
        assert_eq!(steps[2].at, None);
        assert_eq!(steps[3].at, Some(t0 + Duration::hours(5)));
    }

    #[test]
    fn cancelled_timeline_keeps_history() {
        let t0 = Utc::now();
        let mut t = Tracking::new("TRK000002".into(), "Bazar Express".into(), None, t0);
        t.record(TrackingStatus::Confirmed, t0);
        t.record(TrackingStatus::Cancelled, t0);
        let done: Vec<bool> = timeline(&t).iter().map(|s| s.completed).collect();
        assert_eq!(done, [true, true, false, false, false, false]);
    }
}
