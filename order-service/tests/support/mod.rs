#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common_money::{Currency, Money};
use common_observability::OrderMetrics;
use uuid::Uuid;

use order_service::collaborators::{ManualClock, Notifier, OrderEvent, Product};
use order_service::config::GatewaySettings;
use order_service::coupon::Coupon;
use order_service::gateway::StubGateway;
use order_service::order::{PaymentMethod, ShippingAddress};
use order_service::payment::SignatureVerifier;
use order_service::store::memory::MemoryBackend;
use order_service::{AppState, CheckoutRequest, Collaborators, OrderConfig, OrderService};

pub const SECRET: &str = "test_gateway_secret";

/// Records event names instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<&'static str>>,
}

impl RecordingNotifier {
    pub fn names(&self) -> Vec<&'static str> { self.events.lock().unwrap().clone() }

    /// Notifications are sent from spawned tasks; give them a moment to land.
    pub async fn settled(&self, count: usize) -> Vec<&'static str> {
        for _ in 0..200 {
            if self.names().len() >= count {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        self.names()
    }
}

/// A relay that never answers.
pub struct StalledNotifier;

#[async_trait]
impl Notifier for StalledNotifier {
    async fn notify(&self, _event: &OrderEvent) -> anyhow::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &OrderEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.name());
        Ok(())
    }
}

pub fn inr(major: i64) -> Money { Money::from_major(major, Currency::Inr).unwrap() }

pub fn start() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap() }

pub fn address(postal_code: &str) -> ShippingAddress {
    ShippingAddress {
        name: "Asha Rao".into(),
        phone: "9800000000".into(),
        address_line: "12 MG Road".into(),
        locality: "Ashok Nagar".into(),
        city: "Bengaluru".into(),
        state: "KA".into(),
        postal_code: postal_code.into(),
        landmark: None,
    }
}

pub fn checkout(method: PaymentMethod, coupon: Option<&str>) -> CheckoutRequest {
    CheckoutRequest { address: address("560001"), coupon_code: coupon.map(str::to_string), payment_method: method }
}

pub struct Harness {
    pub state: AppState,
    pub backend: MemoryBackend,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<StubGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub verifier: SignatureVerifier,
    /// Account created a month before `start()`, so never "new".
    pub user: Uuid,
    pub kettle: Uuid,
    pub mixer: Uuid,
}

impl Harness {
    pub async fn new() -> Self { Self::build(None).await }

    /// Same fixture, but events go to `relay` instead of the recorder.
    pub async fn with_notifier(relay: Arc<dyn Notifier>) -> Self { Self::build(Some(relay)).await }

    async fn build(relay: Option<Arc<dyn Notifier>>) -> Self {
        let backend = MemoryBackend::new();
        let clock = Arc::new(ManualClock::new(start()));
        let gateway = Arc::new(StubGateway::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let relay: Arc<dyn Notifier> = relay.unwrap_or_else(|| notifier.clone());

        let mut config = OrderConfig::defaults(Currency::Inr).unwrap();
        config.gateway = GatewaySettings::Stub { secret: SECRET.into() };
        let deps = Collaborators {
            gateway: gateway.clone(),
            notifier: relay,
            clock: clock.clone(),
            ..Collaborators::in_memory(&backend)
        };
        let service = OrderService::new(config, deps, OrderMetrics::new().unwrap());

        let kettle = Uuid::new_v4();
        let mixer = Uuid::new_v4();
        backend
            .catalog
            .upsert(Product { id: kettle, name: "Electric Kettle".into(), price: inr(300), return_window_days: None, active: true })
            .await;
        backend
            .catalog
            .upsert(Product { id: mixer, name: "Mixer Grinder".into(), price: inr(600), return_window_days: Some(10), active: true })
            .await;
        backend
            .coupons
            .upsert(Coupon {
                code: "SAVE10".into(),
                title: "10% off".into(),
                description: Some("Up to 100 off on orders above 1000".into()),
                percent: 10,
                min_amount: inr(1000),
                max_discount: inr(100),
                valid_till: start() + Duration::days(30),
                active: true,
            })
            .await;

        let user = Uuid::new_v4();
        backend.accounts.register(user, start() - Duration::days(30)).await;

        Self {
            state: AppState::new(service),
            backend,
            clock,
            gateway,
            notifier,
            verifier: SignatureVerifier::new(SECRET),
            user,
            kettle,
            mixer,
        }
    }

    pub fn service(&self) -> &OrderService { &self.state.service }

    pub fn sign(&self, gateway_order_ref: &str, gateway_payment_ref: &str) -> String {
        self.verifier.sign(gateway_order_ref, gateway_payment_ref).unwrap()
    }

    /// Put 2 x mixer (1200.00) in the user's cart.
    pub async fn fill_cart_1200(&self) {
        self.backend.carts.add(self.user, self.mixer, 2).await;
    }

    /// Put a single kettle (300.00) in the user's cart.
    pub async fn fill_cart_300(&self) {
        self.backend.carts.add(self.user, self.kettle, 1).await;
    }
}
