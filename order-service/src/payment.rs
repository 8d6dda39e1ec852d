use std::fmt;

use chrono::{DateTime, Duration, Utc};
use common_money::Money;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::OrderError;
use crate::order::{OrderRecord, OrderStatus, PaymentMethod, PaymentMirror};
use crate::tracking::TrackingStatus;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Allowed payment moves:
/// pending -> completed | failed
/// failed -> completed (customer retried on the same gateway order)
/// completed -> refunded (cancellation after capture)
/// pending | failed -> refunded (capture that lands after the order was cancelled)
pub fn is_valid_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    match from {
        Pending => matches!(to, Completed | Failed | Refunded),
        Failed => matches!(to, Completed | Refunded),
        Completed => matches!(to, Refunded),
        Refunded => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub id: Uuid,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub gateway_order_ref: Option<String>,
    pub gateway_payment_ref: Option<String>,
    pub gateway_signature: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(id: Uuid, amount: Money, method: PaymentMethod, gateway_order_ref: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            amount,
            method,
            status: PaymentStatus::Pending,
            gateway_order_ref,
            gateway_payment_ref: None,
            gateway_signature: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, to: PaymentStatus, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !is_valid_transition(self.status, to) {
            return Err(OrderError::InvalidTransition {
                entity: "payment",
                current: self.status.as_str().to_string(),
                requested: to.as_str().to_string(),
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// A captured gateway payment that cancellation must hand back.
    pub fn owes_refund_on_cancel(&self) -> bool {
        self.method == PaymentMethod::Gateway && self.status == PaymentStatus::Completed
    }
}

/// Verifies `hex(HMAC-SHA256(secret, order_ref + "|" + payment_ref))` signatures.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier").field("secret", &"<redacted>").finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self { Self { secret: secret.as_ref().to_vec() } }

    pub fn sign(&self, gateway_order_ref: &str, gateway_payment_ref: &str) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(gateway_order_ref.as_bytes());
        mac.update(b"|");
        mac.update(gateway_payment_ref.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time comparison; a length mismatch is a plain mismatch.
    pub fn verify(&self, gateway_order_ref: &str, gateway_payment_ref: &str, signature: &str) -> bool {
        match self.sign(gateway_order_ref, gateway_payment_ref) {
            Some(expected) => expected.as_bytes().ct_eq(signature.trim().as_bytes()).into(),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackDisposition {
    /// Payment captured and the order confirmed.
    Confirmed,
    /// Payment captured for an order cancelled meanwhile; the amount is owed back.
    RefundOwed,
    /// The payment was already settled; nothing changed.
    Replayed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub disposition: CallbackDisposition,
    pub record_sales: bool,
}

impl Settlement {
    pub fn applied(&self) -> bool { self.disposition != CallbackDisposition::Replayed }
}

/// Apply a signature-verified success callback to the record, which the caller holds locked.
pub fn settle_success(
    record: &mut OrderRecord,
    gateway_payment_ref: &str,
    signature: &str,
    now: DateTime<Utc>,
    default_delivery_days: i64,
) -> Result<Settlement, OrderError> {
    match record.payment.status {
        PaymentStatus::Completed | PaymentStatus::Refunded => {
            return Ok(Settlement { disposition: CallbackDisposition::Replayed, record_sales: false });
        }
        PaymentStatus::Pending | PaymentStatus::Failed => {}
    }

    let payment = &mut record.payment;
    payment.gateway_payment_ref = Some(gateway_payment_ref.to_string());
    payment.gateway_signature = Some(signature.trim().to_string());
    payment.failure_reason = None;
    record.order.payment_status = PaymentMirror::Completed;
    record.order.touch(now);

    if record.order.status == OrderStatus::Cancelled {
        payment.transition(PaymentStatus::Refunded, now)?;
        return Ok(Settlement { disposition: CallbackDisposition::RefundOwed, record_sales: false });
    }

    payment.transition(PaymentStatus::Completed, now)?;
    record.order.status = OrderStatus::Confirmed;
    let tracking = &mut record.tracking;
    if tracking.status == TrackingStatus::OrderPlaced {
        tracking.record(TrackingStatus::Confirmed, now);
    }
    if tracking.estimated_delivery.is_none() {
        tracking.estimated_delivery = Some(now + Duration::days(default_delivery_days));
    }
    Ok(Settlement { disposition: CallbackDisposition::Confirmed, record_sales: true })
}

/// Record a gateway-reported failure. Returns whether anything changed.
pub fn settle_failure(record: &mut OrderRecord, reason: &str, now: DateTime<Utc>) -> Result<bool, OrderError> {
    if record.payment.status == PaymentStatus::Failed {
        return Ok(false);
    }
    record.payment.transition(PaymentStatus::Failed, now)?;
    let reason = reason.trim();
    record.payment.failure_reason = (!reason.is_empty()).then(|| reason.to_string());
    record.order.payment_status = PaymentMirror::Failed;
    record.order.touch(now);
    Ok(true)
}
