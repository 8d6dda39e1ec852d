use chrono::{DateTime, Utc};
use common_money::{Currency, Money, MoneyError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrderError;
use crate::payment::Payment;
use crate::returns::ReturnRequest;
use crate::snapshot::LineItem;
use crate::tracking::Tracking;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<OrderStatus> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cod,
    Gateway,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Gateway => "gateway",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentMethod> {
        match s {
            "cod" => Some(PaymentMethod::Cod),
            "gateway" | "razorpay" => Some(PaymentMethod::Gateway),
            _ => None,
        }
    }
}

/// Customer-facing payment state kept on the order row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMirror {
    Pending,
    Completed,
    Failed,
}

impl PaymentMirror {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMirror::Pending => "pending",
            PaymentMirror::Completed => "completed",
            PaymentMirror::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentMirror> {
        match s {
            "pending" => Some(PaymentMirror::Pending),
            "completed" => Some(PaymentMirror::Completed),
            "failed" => Some(PaymentMirror::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    pub address_line: String,
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    pub postal_code: String,
    #[serde(default)]
    pub landmark: Option<String>,
}

impl ShippingAddress {
    pub fn validate(&self) -> Result<(), OrderError> {
        let required = [
            ("name", &self.name),
            ("phone", &self.phone),
            ("address_line", &self.address_line),
            ("postal_code", &self.postal_code),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(OrderError::InvalidAddress(field));
            }
        }
        Ok(())
    }

    pub fn one_line(&self) -> String {
        [self.address_line.as_str(), self.locality.as_str(), self.city.as_str(), self.state.as_str()]
            .iter()
            .filter(|s| !s.trim().is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", ")
            + " - "
            + self.postal_code.as_str()
    }
}

/// Order amounts. `final_total = subtotal - discount + delivery_charge`, never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub subtotal: Money,
    pub discount: Money,
    pub delivery_charge: Money,
    pub final_total: Money,
}

impl Pricing {
    pub fn compute(subtotal: Money, discount: Money, delivery_charge: Money) -> Result<Self, MoneyError> {
        let discount = discount.min(subtotal)?.clamp_non_negative();
        let final_total = subtotal.checked_sub(discount)?.checked_add(delivery_charge)?.clamp_non_negative();
        Ok(Self { subtotal, discount, delivery_charge, final_total })
    }

    pub fn currency(&self) -> Currency { self.final_total.currency() }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub code: String,
    pub user_id: Uuid,
    pub address: ShippingAddress,
    pub items: Vec<LineItem>,
    pub pricing: Pricing,
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentMirror,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Largest per-item return window; the whole order shares it.
    pub fn return_window_days(&self, default_days: u32) -> u32 {
        self.items.iter().map(|i| i.return_window_days).max().unwrap_or(default_days)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

/// The unit the store reads and writes atomically: an order with its payment, its
/// tracking and at most one return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub order: Order,
    pub payment: Payment,
    pub tracking: Tracking,
    pub return_request: Option<ReturnRequest>,
}

impl OrderRecord {
    pub fn code(&self) -> &str { &self.order.code }

    /// Units sold per product, for the catalog's sales counters.
    pub fn sales(&self) -> Vec<(Uuid, u32)> {
        self.order.items.iter().map(|i| (i.product_id, i.quantity)).collect()
    }
}
