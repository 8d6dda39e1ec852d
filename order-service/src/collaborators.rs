use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common_money::Money;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::coupon::Coupon;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub return_window_days: Option<u32>,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
}

#[async_trait]
pub trait Accounts: Send + Sync {
    /// Whole days since the account was created; `None` for an unknown user.
    async fn account_age_days(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<i64>, StoreError>;
}

#[async_trait]
pub trait CartSource: Send + Sync {
    async fn cart_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, StoreError>;
    async fn clear_cart(&self, user_id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CouponSource: Send + Sync {
    /// Lookup by normalized code.
    async fn find(&self, code: &str) -> Result<Option<Coupon>, StoreError>;
    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>, StoreError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self { Self(Mutex::new(start)) }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Customer-facing lifecycle events. Delivery is best-effort.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    OrderPlaced { order_code: String, user_id: Uuid, final_total: Money, payment_method: String },
    PaymentConfirmed { order_code: String, user_id: Uuid },
    OrderCancelled { order_code: String, user_id: Uuid, refund_owed: Option<Money> },
    TrackingUpdated { order_code: String, user_id: Uuid, status: String },
    ReturnUpdated { order_code: String, return_code: String, user_id: Uuid, status: String },
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced { .. } => "order_placed",
            OrderEvent::PaymentConfirmed { .. } => "payment_confirmed",
            OrderEvent::OrderCancelled { .. } => "order_cancelled",
            OrderEvent::TrackingUpdated { .. } => "tracking_updated",
            OrderEvent::ReturnUpdated { .. } => "return_updated",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &OrderEvent) -> Result<()>;
}

/// Writes events to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<()> {
        info!(event = event.name(), payload = %serde_json::to_string(event)?, "order notification");
        Ok(())
    }
}

/// Posts events as JSON to a webhook (mail/SMS relay).
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self { Self { client, url: url.into() } }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<()> {
        let response = self.client.post(&self.url).json(event).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Notification webhook returned status {}", response.status()));
        }
        Ok(())
    }
}
