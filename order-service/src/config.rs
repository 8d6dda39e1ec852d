use std::env;
use std::fmt;

use anyhow::{Context, Result};
use common_money::{Currency, Money};

use crate::delivery::DeliveryPolicy;
use crate::tracking::TrackingPolicy;

pub const DEFAULT_CARRIER: &str = "Bazar Express";
pub const DEFAULT_RAZORPAY_API_BASE: &str = "https://api.razorpay.com";
const DEFAULT_STUB_SECRET: &str = "stub_gateway_secret";

#[derive(Clone, PartialEq, Eq)]
pub enum GatewaySettings {
    Razorpay { key_id: String, key_secret: String, api_base: String },
    /// No credentials configured: orders are issued locally and callbacks are signed with `secret`.
    Stub { secret: String },
}

impl GatewaySettings {
    pub fn signing_secret(&self) -> &str {
        match self {
            GatewaySettings::Razorpay { key_secret, .. } => key_secret,
            GatewaySettings::Stub { secret } => secret,
        }
    }
}

impl fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewaySettings::Razorpay { key_id, api_base, .. } => f
                .debug_struct("Razorpay")
                .field("key_id", key_id)
                .field("key_secret", &"<redacted>")
                .field("api_base", api_base)
                .finish(),
            GatewaySettings::Stub { .. } => f.debug_struct("Stub").field("secret", &"<redacted>").finish(),
        }
    }
}

#[derive(Clone)]
pub struct OrderConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub currency: Currency,
    pub delivery: DeliveryPolicy,
    pub default_delivery_days: i64,
    pub shipped_estimate_days: i64,
    pub return_window_days: u32,
    pub default_carrier: String,
    pub gateway: GatewaySettings,
    pub notify_webhook_url: Option<String>,
}

impl fmt::Debug for OrderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            // Connection strings carry credentials.
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("currency", &self.currency)
            .field("delivery", &self.delivery)
            .field("default_delivery_days", &self.default_delivery_days)
            .field("shipped_estimate_days", &self.shipped_estimate_days)
            .field("return_window_days", &self.return_window_days)
            .field("default_carrier", &self.default_carrier)
            .field("gateway", &self.gateway)
            .field("notify_webhook_url", &self.notify_webhook_url)
            .finish()
    }
}

impl OrderConfig {
    /// Defaults for `currency`, with the stub gateway.
    pub fn defaults(currency: Currency) -> Result<Self> {
        Ok(Self {
            host: "0.0.0.0".to_string(),
            port: 8084,
            database_url: None,
            currency,
            delivery: DeliveryPolicy::standard(currency)?,
            default_delivery_days: 5,
            shipped_estimate_days: 3,
            return_window_days: 7,
            default_carrier: DEFAULT_CARRIER.to_string(),
            gateway: GatewaySettings::Stub { secret: DEFAULT_STUB_SECRET.to_string() },
            notify_webhook_url: None,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parsed = |key: &str| -> Result<Option<i64>> {
            get(key).map(|v| v.parse::<i64>().with_context(|| format!("{key} must be an integer"))).transpose()
        };

        let currency = match get("STORE_CURRENCY") {
            Some(code) => code.parse::<Currency>().context("STORE_CURRENCY")?,
            None => Currency::default(),
        };
        let mut cfg = Self::defaults(currency)?;

        if let Some(host) = get("HOST") {
            cfg.host = host;
        }
        if let Some(port) = get("PORT") {
            cfg.port = port.parse().context("PORT must be a valid port number")?;
        }
        cfg.database_url = get("DATABASE_URL");

        let money = |key: &str| -> Result<Option<Money>> {
            let Some(raw) = get(key) else { return Ok(None) };
            let amount = Money::parse_decimal(&raw, currency).with_context(|| format!("{key} must be a decimal amount"))?;
            if amount.is_negative() {
                anyhow::bail!("{key} must not be negative");
            }
            Ok(Some(amount))
        };
        if let Some(m) = money("DELIVERY_FREE_THRESHOLD")? {
            cfg.delivery.free_threshold = m;
        }
        if let Some(m) = money("DELIVERY_METRO_FEE")? {
            cfg.delivery.metro_fee = m;
        }
        if let Some(m) = money("DELIVERY_STANDARD_FEE")? {
            cfg.delivery.standard_fee = m;
        }
        if let Some(csv) = get("DELIVERY_METRO_PREFIXES") {
            cfg.delivery.metro_prefixes = csv.split(',').map(str::trim).filter(|p| !p.is_empty()).map(String::from).collect();
        }
        if let Some(days) = parsed("NEW_ACCOUNT_FREE_DELIVERY_DAYS")? {
            cfg.delivery.new_account_days = days;
        }
        if let Some(days) = parsed("DEFAULT_DELIVERY_DAYS")? {
            cfg.default_delivery_days = days.max(1);
        }
        if let Some(days) = parsed("SHIPPED_ESTIMATE_DAYS")? {
            cfg.shipped_estimate_days = days.max(1);
        }
        if let Some(days) = parsed("RETURN_WINDOW_DAYS")? {
            cfg.return_window_days = u32::try_from(days.max(0)).unwrap_or(u32::MAX);
        }
        if let Some(carrier) = get("DEFAULT_CARRIER") {
            cfg.default_carrier = carrier;
        }

        cfg.gateway = match (get("RAZORPAY_KEY_ID"), get("RAZORPAY_KEY_SECRET")) {
            (Some(key_id), Some(key_secret)) => GatewaySettings::Razorpay {
                key_id,
                key_secret,
                api_base: get("RAZORPAY_API_BASE").unwrap_or_else(|| DEFAULT_RAZORPAY_API_BASE.to_string()),
            },
            (Some(_), None) => anyhow::bail!("RAZORPAY_KEY_SECRET must be set when RAZORPAY_KEY_ID is"),
            (None, _) => GatewaySettings::Stub {
                secret: get("GATEWAY_STUB_SECRET").unwrap_or_else(|| DEFAULT_STUB_SECRET.to_string()),
            },
        };
        cfg.notify_webhook_url = get("ORDER_NOTIFY_WEBHOOK_URL");
        Ok(cfg)
    }

    pub fn tracking_policy(&self) -> TrackingPolicy {
        TrackingPolicy { shipped_estimate_days: self.shipped_estimate_days, default_carrier: self.default_carrier.clone() }
    }
}
