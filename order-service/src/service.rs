use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common_money::Money;
use common_observability::OrderMetrics;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::{Accounts, CartSource, Catalog, Clock, CouponSource, Notifier, OrderEvent, SystemClock, TracingNotifier};
use crate::config::OrderConfig;
use crate::coupon::{normalize_code, Coupon, CouponApplication};
use crate::delivery::{serviceable, DeliveryQuote};
use crate::error::OrderError;
use crate::gateway::{receipt_for, PaymentGateway, StubGateway};
use crate::ids::{CodeGenerator, RandomCodes};
use crate::invoice::{build_invoice, Invoice};
use crate::order::{Order, OrderRecord, OrderStatus, PaymentMethod, PaymentMirror, Pricing, ShippingAddress};
use crate::payment::{settle_failure, settle_success, CallbackDisposition, Payment, SignatureVerifier};
use crate::returns::{advance_return, open_return, ReturnReason, ReturnRequest, ReturnStatus, ReturnUpdate};
use crate::snapshot::{build_snapshot, CartSnapshot};
use crate::store::memory::MemoryBackend;
use crate::store::{Effects, OrderStore, RecordKey, StoreError};
use crate::tracking::{advance_record, cancel_record, timeline, TimelineStep, Tracking, TrackingChange, TrackingStatus};

/// Attempts at allocating fresh codes before giving up on a collision.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// Everything the service talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn Catalog>,
    pub accounts: Arc<dyn Accounts>,
    pub carts: Arc<dyn CartSource>,
    pub coupons: Arc<dyn CouponSource>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub codes: Arc<dyn CodeGenerator>,
}

impl Collaborators {
    /// In-memory adapters with the stub gateway, log-only notifications and the system clock.
    pub fn in_memory(backend: &MemoryBackend) -> Self {
        Self {
            store: backend.store.clone(),
            catalog: backend.catalog.clone(),
            accounts: backend.accounts.clone(),
            carts: backend.carts.clone(),
            coupons: backend.coupons.clone(),
            gateway: Arc::new(StubGateway::new()),
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            codes: Arc::new(RandomCodes),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub address: ShippingAddress,
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,
}

/// What the client needs to open the gateway's checkout widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayHandoff {
    pub gateway_order_ref: String,
    pub amount: Money,
    pub key_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub record: OrderRecord,
    pub gateway: Option<GatewayHandoff>,
}

#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub order_code: String,
    pub disposition: CallbackDisposition,
    pub applied: bool,
    pub refund_owed: Option<Money>,
}

#[derive(Debug, Clone)]
pub struct FailureOutcome {
    pub order_code: String,
    pub applied: bool,
}

#[derive(Debug, Clone)]
pub struct TrackingOutcome {
    pub record: OrderRecord,
    pub change: TrackingChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Serviceability {
    pub serviceable: bool,
    pub metro: bool,
    pub estimated_days: Option<u32>,
}

pub struct OrderService {
    config: OrderConfig,
    verifier: SignatureVerifier,
    deps: Collaborators,
    metrics: OrderMetrics,
}

impl OrderService {
    pub fn new(config: OrderConfig, deps: Collaborators, metrics: OrderMetrics) -> Self {
        let verifier = SignatureVerifier::new(config.gateway.signing_secret());
        Self { config, verifier, deps, metrics }
    }

    pub fn config(&self) -> &OrderConfig { &self.config }

    pub fn metrics(&self) -> &OrderMetrics { &self.metrics }

    /// Snapshot the user's live cart and place the order.
    pub async fn checkout(&self, user_id: Uuid, request: CheckoutRequest) -> Result<CheckoutReceipt, OrderError> {
        let lines = self.deps.carts.cart_lines(user_id).await?;
        let snapshot = build_snapshot(
            &lines,
            self.deps.catalog.as_ref(),
            self.config.currency,
            self.config.return_window_days,
        )
        .await?;
        self.create_order(user_id, snapshot, request).await
    }

    pub async fn create_order(
        &self,
        user_id: Uuid,
        snapshot: CartSnapshot,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt, OrderError> {
        if snapshot.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        request.address.validate()?;
        if !serviceable(&request.address.postal_code) {
            return Err(OrderError::Unserviceable(request.address.postal_code.trim().to_string()));
        }
        let now = self.deps.clock.now();
        let currency = snapshot.subtotal.currency();

        let (discount, coupon_code) = match request.coupon_code.as_deref().map(normalize_code).filter(|c| !c.is_empty()) {
            Some(code) => {
                let applied = self.price_coupon(&code, snapshot.subtotal).await?;
                (applied.discount, Some(applied.code))
            }
            None => (Money::zero(currency), None),
        };

        let quote = self.quote_for(user_id, snapshot.subtotal, &request.address.postal_code).await?;
        let pricing = Pricing::compute(snapshot.subtotal, discount, quote.charge)?;
        let method = request.payment_method;
        let payment_id = Uuid::new_v4();

        // The gateway order must exist before anything is persisted.
        let gateway_order = match method {
            PaymentMethod::Gateway => {
                let timer = self.metrics.gateway_order_latency_seconds.start_timer();
                let created = self.deps.gateway.create_order(pricing.final_total, &receipt_for(payment_id)).await;
                timer.observe_duration();
                let created = created.map_err(|e| {
                    warn!(error = %e, "gateway order creation failed");
                    OrderError::GatewayUnavailable(e.to_string())
                })?;
                Some(created)
            }
            PaymentMethod::Cod => None,
        };

        let draft = Draft {
            order_id: Uuid::new_v4(),
            payment_id,
            user_id,
            address: request.address,
            snapshot,
            pricing,
            coupon_code,
            method,
            gateway_order_ref: gateway_order.as_ref().map(|g| g.id.clone()),
        };
        let effects = Effects { record_sales: method == PaymentMethod::Cod };

        let mut attempt = 0;
        let record = loop {
            attempt += 1;
            let record = self.assemble(&draft, now);
            match self.deps.store.insert(&record, effects).await {
                Ok(()) => break record,
                Err(StoreError::Conflict(constraint)) if attempt < MAX_CODE_ATTEMPTS => {
                    warn!(%constraint, attempt, "code collision on order insert; regenerating");
                }
                Err(StoreError::Conflict(constraint)) => {
                    warn!(%constraint, attempt, "giving up on order insert");
                    return Err(OrderError::IdentifiersExhausted(attempt));
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = self.deps.carts.clear_cart(user_id).await {
            warn!(%user_id, order_code = %record.order.code, error = %e, "failed to clear cart after checkout");
        }

        self.metrics.orders_created_total.with_label_values(&[method.as_str()]).inc();
        info!(
            order_code = %record.order.code,
            tracking_code = %record.tracking.code,
            method = method.as_str(),
            final_total = %pricing.final_total,
            "order created"
        );
        self.notify(OrderEvent::OrderPlaced {
            order_code: record.order.code.clone(),
            user_id,
            final_total: pricing.final_total,
            payment_method: method.as_str().to_string(),
        });

        let gateway = gateway_order.map(|g| GatewayHandoff {
            gateway_order_ref: g.id,
            amount: g.amount,
            key_id: self.deps.gateway.key_id().map(str::to_string),
        });
        Ok(CheckoutReceipt { record, gateway })
    }

    fn assemble(&self, draft: &Draft, now: DateTime<Utc>) -> OrderRecord {
        let estimate = now + Duration::days(self.config.default_delivery_days);
        let mut tracking = Tracking::new(
            self.deps.codes.tracking_code(),
            self.config.default_carrier.clone(),
            Some(estimate),
            now,
        );
        let mut order = Order {
            id: draft.order_id,
            code: self.deps.codes.order_code(),
            user_id: draft.user_id,
            address: draft.address.clone(),
            items: draft.snapshot.items.clone(),
            pricing: draft.pricing,
            coupon_code: draft.coupon_code.clone(),
            status: OrderStatus::Pending,
            payment_method: draft.method,
            payment_status: PaymentMirror::Pending,
            created_at: now,
            updated_at: now,
        };
        // Cash on delivery confirms at once; the payment stays pending until collected.
        if draft.method == PaymentMethod::Cod {
            order.status = OrderStatus::Confirmed;
            tracking.record(TrackingStatus::Confirmed, now);
        }
        let payment = Payment::new(draft.payment_id, draft.pricing.final_total, draft.method, draft.gateway_order_ref.clone(), now);
        OrderRecord { order, payment, tracking, return_request: None }
    }

    /// Reconcile a gateway success callback. The signature is checked before anything is read.
    pub async fn verify_gateway_callback(
        &self,
        gateway_order_ref: &str,
        gateway_payment_ref: &str,
        signature: &str,
    ) -> Result<CallbackOutcome, OrderError> {
        if !self.verifier.verify(gateway_order_ref, gateway_payment_ref, signature) {
            self.metrics.gateway_callbacks_total.with_label_values(&["sig_mismatch"]).inc();
            warn!(%gateway_order_ref, "gateway callback signature mismatch");
            return Err(OrderError::SignatureMismatch);
        }
        let now = self.deps.clock.now();
        let delivery_days = self.config.default_delivery_days;
        let mut settlement = None;
        let record = self
            .deps
            .store
            .mutate(RecordKey::GatewayOrderRef(gateway_order_ref), &mut |record: &mut OrderRecord| {
                let s = settle_success(record, gateway_payment_ref, signature, now, delivery_days)?;
                settlement = Some(s);
                Ok(Effects { record_sales: s.record_sales })
            })
            .await?;
        let (Some(record), Some(settlement)) = (record, settlement) else {
            self.metrics.gateway_callbacks_total.with_label_values(&["orphaned"]).inc();
            warn!(%gateway_order_ref, "callback for unknown gateway order");
            return Err(OrderError::OrphanedCallback(gateway_order_ref.to_string()));
        };

        let order_code = record.order.code.clone();
        let mut refund_owed = None;
        match settlement.disposition {
            CallbackDisposition::Confirmed => {
                self.metrics.gateway_callbacks_total.with_label_values(&["confirmed"]).inc();
                info!(%order_code, tracking_code = %record.tracking.code, "payment captured; order confirmed");
                self.notify(OrderEvent::PaymentConfirmed { order_code: order_code.clone(), user_id: record.order.user_id });
            }
            CallbackDisposition::RefundOwed => {
                self.metrics.gateway_callbacks_total.with_label_values(&["refund_owed"]).inc();
                self.metrics.refund_obligations_total.inc();
                refund_owed = Some(record.payment.amount);
                warn!(%order_code, amount = %record.payment.amount, "payment captured for a cancelled order; refund owed");
            }
            CallbackDisposition::Replayed => {
                self.metrics.gateway_callbacks_total.with_label_values(&["replayed"]).inc();
                info!(%order_code, status = %record.payment.status, "duplicate gateway callback ignored");
            }
        }
        Ok(CallbackOutcome { order_code, disposition: settlement.disposition, applied: settlement.applied(), refund_owed })
    }

    /// Record that the gateway reported the payment as failed. The order stays pending so the
    /// customer can retry on the same gateway order.
    pub async fn record_gateway_failure(&self, gateway_order_ref: &str, reason: &str) -> Result<FailureOutcome, OrderError> {
        let now = self.deps.clock.now();
        let mut applied = false;
        let record = self
            .deps
            .store
            .mutate(RecordKey::GatewayOrderRef(gateway_order_ref), &mut |record: &mut OrderRecord| {
                applied = settle_failure(record, reason, now)?;
                Ok(Effects::default())
            })
            .await?
            .ok_or_else(|| OrderError::OrphanedCallback(gateway_order_ref.to_string()))?;
        if applied {
            self.metrics.gateway_callbacks_total.with_label_values(&["failed"]).inc();
            info!(order_code = %record.order.code, "gateway payment failed");
        }
        Ok(FailureOutcome { order_code: record.order.code, applied })
    }

    /// Privileged fulfillment update. `Cancelled` runs the same routine as [`Self::cancel_order`].
    pub async fn advance_tracking(&self, order_code: &str, to: TrackingStatus) -> Result<TrackingOutcome, OrderError> {
        let now = self.deps.clock.now();
        let policy = self.config.tracking_policy();
        let mut change = None;
        let record = self
            .deps
            .store
            .mutate(RecordKey::OrderCode(order_code), &mut |record: &mut OrderRecord| {
                change = Some(advance_record(record, to, now, &policy)?);
                Ok(Effects::default())
            })
            .await?;
        let (Some(record), Some(change)) = (record, change) else {
            return Err(OrderError::OrderNotFound(order_code.to_string()));
        };
        self.after_tracking_change(&record, &change);
        Ok(TrackingOutcome { record, change })
    }

    pub async fn cancel_order(&self, order_code: &str) -> Result<TrackingOutcome, OrderError> {
        let now = self.deps.clock.now();
        let mut change = None;
        let record = self
            .deps
            .store
            .mutate(RecordKey::OrderCode(order_code), &mut |record: &mut OrderRecord| {
                change = Some(cancel_record(record, now)?);
                Ok(Effects::default())
            })
            .await?;
        let (Some(record), Some(change)) = (record, change) else {
            return Err(OrderError::OrderNotFound(order_code.to_string()));
        };
        self.after_tracking_change(&record, &change);
        Ok(TrackingOutcome { record, change })
    }

    fn after_tracking_change(&self, record: &OrderRecord, change: &TrackingChange) {
        let order_code = record.order.code.clone();
        self.metrics.tracking_transitions_total.with_label_values(&[change.to.as_str()]).inc();
        info!(
            %order_code,
            tracking_code = %record.tracking.code,
            from = change.from.as_str(),
            status = change.to.as_str(),
            "tracking updated"
        );
        let event = if change.to == TrackingStatus::Cancelled {
            if let Some(amount) = change.refund_owed {
                self.metrics.refund_obligations_total.inc();
                warn!(%order_code, %amount, "order cancelled after capture; refund owed");
            }
            OrderEvent::OrderCancelled { order_code, user_id: record.order.user_id, refund_owed: change.refund_owed }
        } else {
            OrderEvent::TrackingUpdated {
                order_code,
                user_id: record.order.user_id,
                status: change.to.as_str().to_string(),
            }
        };
        self.notify(event);
    }

    /// Open the order's return. A freshly drawn return code that collides is redrawn.
    pub async fn request_return(
        &self,
        order_code: &str,
        reason: ReturnReason,
        reason_text: &str,
    ) -> Result<OrderRecord, OrderError> {
        let now = self.deps.clock.now();
        let window = self.config.return_window_days;
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let return_code = self.deps.codes.return_code();
            let result = self
                .deps
                .store
                .mutate(RecordKey::OrderCode(order_code), &mut |record: &mut OrderRecord| {
                    open_return(record, return_code.clone(), reason, reason_text, now, window)?;
                    Ok(Effects::default())
                })
                .await;
            match result {
                Ok(Some(record)) => {
                    self.metrics.return_transitions_total.with_label_values(&[ReturnStatus::Requested.as_str()]).inc();
                    info!(%order_code, %return_code, reason = reason.as_str(), "return requested");
                    self.notify(OrderEvent::ReturnUpdated {
                        order_code: order_code.to_string(),
                        return_code,
                        user_id: record.order.user_id,
                        status: ReturnStatus::Requested.as_str().to_string(),
                    });
                    return Ok(record);
                }
                Ok(None) => return Err(OrderError::OrderNotFound(order_code.to_string())),
                Err(OrderError::Store(StoreError::Conflict(constraint))) => {
                    warn!(%constraint, attempt, "return code collision; regenerating");
                }
                Err(e) => return Err(e),
            }
        }
        Err(OrderError::IdentifiersExhausted(MAX_CODE_ATTEMPTS))
    }

    pub async fn advance_return(
        &self,
        return_code: &str,
        to: ReturnStatus,
        update: ReturnUpdate,
    ) -> Result<OrderRecord, OrderError> {
        let now = self.deps.clock.now();
        let record = self
            .deps
            .store
            .mutate(RecordKey::ReturnCode(return_code), &mut |record: &mut OrderRecord| {
                let request = record
                    .return_request
                    .as_mut()
                    .ok_or_else(|| OrderError::ReturnNotFound(return_code.to_string()))?;
                advance_return(request, to, update.clone(), now)?;
                Ok(Effects::default())
            })
            .await?
            .ok_or_else(|| OrderError::ReturnNotFound(return_code.to_string()))?;

        self.metrics.return_transitions_total.with_label_values(&[to.as_str()]).inc();
        info!(order_code = %record.order.code, %return_code, status = to.as_str(), "return updated");
        self.notify(OrderEvent::ReturnUpdated {
            order_code: record.order.code.clone(),
            return_code: return_code.to_string(),
            user_id: record.order.user_id,
            status: to.as_str().to_string(),
        });
        Ok(record)
    }

    async fn price_coupon(&self, code: &str, cart_total: Money) -> Result<CouponApplication, OrderError> {
        let coupon = self.deps.coupons.find(code).await?.ok_or(OrderError::InvalidCoupon)?;
        Ok(coupon.apply(cart_total, self.deps.clock.now())?)
    }

    /// Price a coupon against a cart total without placing anything.
    pub async fn apply_coupon(&self, code: &str, cart_total: Money) -> Result<CouponApplication, OrderError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(OrderError::InvalidCoupon);
        }
        self.price_coupon(&code, cart_total).await
    }

    pub async fn list_coupons(&self) -> Result<Vec<Coupon>, OrderError> {
        Ok(self.deps.coupons.list_active(self.deps.clock.now()).await?)
    }

    async fn quote_for(&self, user_id: Uuid, subtotal: Money, postal_code: &str) -> Result<DeliveryQuote, OrderError> {
        // An account we know nothing about is not treated as new.
        let age = self
            .deps
            .accounts
            .account_age_days(user_id, self.deps.clock.now())
            .await?
            .unwrap_or(i64::MAX);
        Ok(self.config.delivery.quote(subtotal, postal_code, age)?)
    }

    pub async fn delivery_quote(&self, user_id: Uuid, subtotal: Money, postal_code: &str) -> Result<DeliveryQuote, OrderError> {
        if !serviceable(postal_code) {
            return Err(OrderError::Unserviceable(postal_code.trim().to_string()));
        }
        self.quote_for(user_id, subtotal, postal_code).await
    }

    pub fn check_serviceability(&self, postal_code: &str) -> Serviceability {
        if !serviceable(postal_code) {
            return Serviceability { serviceable: false, metro: false, estimated_days: None };
        }
        let metro = self.config.delivery.is_metro(postal_code);
        let days = if metro { self.config.delivery.metro_days } else { self.config.delivery.standard_days };
        Serviceability { serviceable: true, metro, estimated_days: Some(days) }
    }

    pub async fn get_order(&self, order_code: &str) -> Result<OrderRecord, OrderError> {
        self.deps
            .store
            .find(RecordKey::OrderCode(order_code))
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_code.to_string()))
    }

    pub async fn order_by_gateway_ref(&self, gateway_order_ref: &str) -> Result<OrderRecord, OrderError> {
        self.deps
            .store
            .find(RecordKey::GatewayOrderRef(gateway_order_ref))
            .await?
            .ok_or_else(|| OrderError::OrphanedCallback(gateway_order_ref.to_string()))
    }

    pub async fn order_history(&self, user_id: Uuid) -> Result<Vec<OrderRecord>, OrderError> {
        Ok(self.deps.store.list_for_user(user_id).await?)
    }

    pub async fn tracking_timeline(&self, order_code: &str) -> Result<(OrderRecord, Vec<TimelineStep>), OrderError> {
        let record = self.get_order(order_code).await?;
        let steps = timeline(&record.tracking);
        Ok((record, steps))
    }

    pub async fn return_status(&self, return_code: &str) -> Result<(OrderRecord, ReturnRequest), OrderError> {
        let record = self
            .deps
            .store
            .find(RecordKey::ReturnCode(return_code))
            .await?
            .ok_or_else(|| OrderError::ReturnNotFound(return_code.to_string()))?;
        let request = record
            .return_request
            .clone()
            .ok_or_else(|| OrderError::ReturnNotFound(return_code.to_string()))?;
        Ok((record, request))
    }

    pub async fn invoice(&self, order_code: &str) -> Result<(OrderRecord, Invoice), OrderError> {
        let record = self.get_order(order_code).await?;
        let invoice = build_invoice(&record.order)?;
        Ok((record, invoice))
    }

    /// Fire-and-forget: the send runs on its own task so a slow relay never holds up the caller.
    fn notify(&self, event: OrderEvent) {
        let notifier = self.deps.notifier.clone();
        let failures = self.metrics.notification_failures_total.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&event).await {
                failures.inc();
                warn!(event = event.name(), error = %e, "order notification failed");
            }
        });
    }
}

/// Inputs of an order that survive code regeneration.
struct Draft {
    order_id: Uuid,
    payment_id: Uuid,
    user_id: Uuid,
    address: ShippingAddress,
    snapshot: CartSnapshot,
    pricing: Pricing,
    coupon_code: Option<String>,
    method: PaymentMethod,
    gateway_order_ref: Option<String>,
}
