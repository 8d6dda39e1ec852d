use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use common_money::Money;
use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::order::OrderRecord;
use crate::tracking::TrackingStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    Defective,
    WrongItem,
    NotAsDescribed,
    Damaged,
    SizeIssue,
    QualityIssue,
    ChangedMind,
    Other,
}

impl ReturnReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnReason::Defective => "defective",
            ReturnReason::WrongItem => "wrong_item",
            ReturnReason::NotAsDescribed => "not_as_described",
            ReturnReason::Damaged => "damaged",
            ReturnReason::SizeIssue => "size_issue",
            ReturnReason::QualityIssue => "quality_issue",
            ReturnReason::ChangedMind => "changed_mind",
            ReturnReason::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<ReturnReason> {
        match s {
            "defective" => Some(ReturnReason::Defective),
            "wrong_item" => Some(ReturnReason::WrongItem),
            "not_as_described" => Some(ReturnReason::NotAsDescribed),
            "damaged" => Some(ReturnReason::Damaged),
            "size_issue" => Some(ReturnReason::SizeIssue),
            "quality_issue" => Some(ReturnReason::QualityIssue),
            "changed_mind" => Some(ReturnReason::ChangedMind),
            "other" => Some(ReturnReason::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Requested,
    Approved,
    PickupScheduled,
    PickedUp,
    Received,
    QualityCheck,
    RefundInitiated,
    RefundCompleted,
    Rejected,
}

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Requested => "requested",
            ReturnStatus::Approved => "approved",
            ReturnStatus::PickupScheduled => "pickup_scheduled",
            ReturnStatus::PickedUp => "picked_up",
            ReturnStatus::Received => "received",
            ReturnStatus::QualityCheck => "quality_check",
            ReturnStatus::RefundInitiated => "refund_initiated",
            ReturnStatus::RefundCompleted => "refund_completed",
            ReturnStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<ReturnStatus> {
        match s.trim() {
            "requested" => Some(ReturnStatus::Requested),
            "approved" => Some(ReturnStatus::Approved),
            "pickup_scheduled" => Some(ReturnStatus::PickupScheduled),
            "picked_up" => Some(ReturnStatus::PickedUp),
            "received" => Some(ReturnStatus::Received),
            "quality_check" => Some(ReturnStatus::QualityCheck),
            "refund_initiated" => Some(ReturnStatus::RefundInitiated),
            "refund_completed" => Some(ReturnStatus::RefundCompleted),
            "rejected" => Some(ReturnStatus::Rejected),
            _ => None,
        }
    }

    /// The single forward successor; terminal states have none.
    pub fn next(&self) -> Option<ReturnStatus> {
        use ReturnStatus::*;
        match self {
            Requested => Some(Approved),
            Approved => Some(PickupScheduled),
            PickupScheduled => Some(PickedUp),
            PickedUp => Some(Received),
            Received => Some(QualityCheck),
            QualityCheck => Some(RefundInitiated),
            RefundInitiated => Some(RefundCompleted),
            RefundCompleted | Rejected => None,
        }
    }

    pub fn is_terminal(&self) -> bool { self.next().is_none() }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

pub fn is_valid_transition(from: ReturnStatus, to: ReturnStatus) -> bool {
    if to == ReturnStatus::Rejected {
        return matches!(from, ReturnStatus::Requested | ReturnStatus::Approved);
    }
    from.next() == Some(to)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnRequest {
    pub code: String,
    pub reason: ReturnReason,
    pub reason_text: String,
    pub refund_amount: Money,
    pub status: ReturnStatus,
    pub pickup_date: Option<NaiveDate>,
    pub rejection_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Last moment a return may be requested. Delivery time falls back to the last tracking
/// update for records delivered before `delivered_at` existed.
pub fn return_deadline(record: &OrderRecord, default_window_days: u32) -> Option<DateTime<Utc>> {
    if record.tracking.status != TrackingStatus::Delivered {
        return None;
    }
    let delivered = record.tracking.delivered_at.unwrap_or(record.tracking.last_updated);
    let window = record.order.return_window_days(default_window_days);
    Some(delivered + Duration::days(i64::from(window)))
}

/// Open a return on a delivered order. One return per order, ever.
pub fn open_return(
    record: &mut OrderRecord,
    code: String,
    reason: ReturnReason,
    reason_text: &str,
    now: DateTime<Utc>,
    default_window_days: u32,
) -> Result<(), OrderError> {
    let current = record.tracking.status;
    if current != TrackingStatus::Delivered {
        return Err(OrderError::NotDelivered { current: current.as_str().to_string() });
    }
    if record.return_request.is_some() {
        return Err(OrderError::ReturnAlreadyRequested);
    }
    if let Some(deadline) = return_deadline(record, default_window_days) {
        if now > deadline {
            return Err(OrderError::ReturnWindowExpired { deadline });
        }
    }
    record.return_request = Some(ReturnRequest {
        code,
        reason,
        reason_text: reason_text.trim().to_string(),
        refund_amount: record.order.pricing.final_total,
        status: ReturnStatus::Requested,
        pickup_date: None,
        rejection_reason: None,
        admin_notes: None,
        approved_at: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
    });
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReturnUpdate {
    pub pickup_date: Option<NaiveDate>,
    pub rejection_reason: Option<String>,
    pub admin_notes: Option<String>,
}

pub fn advance_return(
    request: &mut ReturnRequest,
    to: ReturnStatus,
    update: ReturnUpdate,
    now: DateTime<Utc>,
) -> Result<(), OrderError> {
    if !is_valid_transition(request.status, to) {
        return Err(OrderError::InvalidTransition {
            entity: "return",
            current: request.status.as_str().to_string(),
            requested: to.as_str().to_string(),
        });
    }
    match to {
        ReturnStatus::Approved => request.approved_at = Some(now),
        ReturnStatus::PickupScheduled => {
            if update.pickup_date.is_some() {
                request.pickup_date = update.pickup_date;
            }
        }
        ReturnStatus::Rejected => request.rejection_reason = update.rejection_reason.filter(|r| !r.trim().is_empty()),
        ReturnStatus::RefundCompleted => request.completed_at = Some(now),
        _ => {}
    }
    if let Some(notes) = update.admin_notes.filter(|n| !n.trim().is_empty()) {
        request.admin_notes = Some(notes);
    }
    request.status = to;
    request.updated_at = now;
    Ok(())
}
