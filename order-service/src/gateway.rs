use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use common_money::Money;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Unavailable(String),
    #[error("gateway rejected the order with status {status}")]
    Rejected { status: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: Money,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open an order at the gateway for `amount`; `receipt` is our reference for it.
    async fn create_order(&self, amount: Money, receipt: &str) -> Result<GatewayOrder, GatewayError>;

    /// Public key handed to the checkout widget, when there is one.
    fn key_id(&self) -> Option<&str>;
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    id: String,
}

/// Razorpay Orders API client.
#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

impl fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("api_base", &self.api_base)
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .finish()
    }
}

impl RazorpayGateway {
    pub fn new(client: Client, api_base: impl Into<String>, key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self { client, api_base: api_base.into(), key_id: key_id.into(), key_secret: key_secret.into() }
    }

    async fn post_order(&self, amount: Money, receipt: &str) -> anyhow::Result<reqwest::Response> {
        let url = format!("{}/v1/orders", self.api_base.trim_end_matches('/'));
        let body = CreateOrderBody { amount: amount.minor(), currency: amount.currency().code(), receipt, payment_capture: 1 };
        self.client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, amount: Money, receipt: &str) -> Result<GatewayOrder, GatewayError> {
        let response = self.post_order(amount, receipt).await.map_err(|e| GatewayError::Unavailable(format!("{e:#}")))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("status {status}")));
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected { status: status.as_u16() });
        }
        let parsed: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("malformed gateway response: {e}")))?;
        Ok(GatewayOrder { id: parsed.id, amount })
    }

    fn key_id(&self) -> Option<&str> { Some(&self.key_id) }
}

/// Offline gateway: issues local order ids. Can be switched to fail for outage drills.
#[derive(Debug, Default)]
pub struct StubGateway {
    failing: AtomicBool,
}

impl StubGateway {
    pub fn new() -> Self { Self::default() }

    pub fn set_failing(&self, failing: bool) { self.failing.store(failing, Ordering::SeqCst); }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(&self, amount: Money, _receipt: &str) -> Result<GatewayOrder, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("stub gateway is failing".into()));
        }
        Ok(GatewayOrder { id: format!("order_{}", Uuid::new_v4().simple()), amount })
    }

    fn key_id(&self) -> Option<&str> { None }
}

/// Receipt reference sent with a gateway order (the gateway caps it at 40 characters).
pub fn receipt_for(payment_id: Uuid) -> String {
    format!("rcpt_{}", payment_id.simple())
}
