mod support;

use common_money::Money;
use order_service::collaborators::CartSource;
use order_service::delivery::ChargeBasis;
use order_service::order::{OrderStatus, PaymentMethod, PaymentMirror};
use order_service::payment::{CallbackDisposition, PaymentStatus};
use order_service::tracking::TrackingStatus;
use order_service::OrderError;
use std::sync::Arc;
use std::time::Duration;

use support::{checkout, inr, Harness, StalledNotifier};

#[tokio::test]
async fn coupon_checkout_prices_1200_down_to_1100() {
    let h = Harness::new().await;
    h.fill_cart_1200().await;

    let receipt = h.service().checkout(h.user, checkout(PaymentMethod::Gateway, Some(" save10 "))).await.unwrap();
    let pricing = receipt.record.order.pricing;
    assert_eq!(pricing.subtotal, inr(1200));
    assert_eq!(pricing.discount, inr(100));
    assert_eq!(pricing.delivery_charge, inr(0));
    assert_eq!(pricing.final_total, inr(1100));
    assert_eq!(receipt.record.order.coupon_code.as_deref(), Some("SAVE10"));

    let handoff = receipt.gateway.expect("gateway handoff");
    assert_eq!(handoff.amount, inr(1100));
    assert_eq!(receipt.record.payment.gateway_order_ref.as_deref(), Some(handoff.gateway_order_ref.as_str()));
}

#[tokio::test]
async fn cod_checkout_confirms_immediately() {
    let h = Harness::new().await;
    h.fill_cart_300().await;

    let receipt = h.service().checkout(h.user, checkout(PaymentMethod::Cod, None)).await.unwrap();
    let record = &receipt.record;
    assert!(receipt.gateway.is_none());
    assert_eq!(record.order.status, OrderStatus::Confirmed);
    assert_eq!(record.tracking.status, TrackingStatus::Confirmed);
    assert_eq!(record.payment.status, PaymentStatus::Pending);
    assert_eq!(record.order.payment_status, PaymentMirror::Pending);
    // 300 to a metro pin code: below the free threshold, metro fee applies.
    assert_eq!(record.order.pricing.delivery_charge, inr(40));
    assert_eq!(record.order.pricing.final_total, inr(340));
    assert_eq!(record.tracking.carrier, "Bazar Express");
    assert_eq!(record.tracking.estimated_delivery, Some(support::start() + chrono::Duration::days(5)));

    assert_eq!(h.backend.store.sales_count(h.kettle).await, 1);
    assert!(h.backend.carts.cart_lines(h.user).await.unwrap().is_empty());
    assert_eq!(h.notifier.settled(1).await, ["order_placed"]);
}

#[tokio::test]
async fn gateway_checkout_then_duplicate_callback_counts_sales_once() {
    let h = Harness::new().await;
    h.fill_cart_1200().await;

    let receipt = h.service().checkout(h.user, checkout(PaymentMethod::Gateway, Some("SAVE10"))).await.unwrap();
    assert_eq!(receipt.record.order.status, OrderStatus::Pending);
    assert_eq!(receipt.record.tracking.status, TrackingStatus::OrderPlaced);
    assert_eq!(h.backend.store.sales_count(h.mixer).await, 0);

    let gref = receipt.gateway.unwrap().gateway_order_ref;
    let sig = h.sign(&gref, "pay_001");

    let first = h.service().verify_gateway_callback(&gref, "pay_001", &sig).await.unwrap();
    assert_eq!(first.disposition, CallbackDisposition::Confirmed);
    assert!(first.applied);
    assert_eq!(h.backend.store.sales_count(h.mixer).await, 2);

    let again = h.service().verify_gateway_callback(&gref, "pay_001", &sig).await.unwrap();
    assert_eq!(again.disposition, CallbackDisposition::Replayed);
    assert!(!again.applied);
    assert_eq!(h.backend.store.sales_count(h.mixer).await, 2);

    let record = h.service().get_order(&first.order_code).await.unwrap();
    assert_eq!(record.order.status, OrderStatus::Confirmed);
    assert_eq!(record.order.payment_status, PaymentMirror::Completed);
    assert_eq!(record.payment.status, PaymentStatus::Completed);
    assert_eq!(record.payment.gateway_payment_ref.as_deref(), Some("pay_001"));
    assert_eq!(record.tracking.status, TrackingStatus::Confirmed);
    assert_eq!(h.notifier.settled(2).await, ["order_placed", "payment_confirmed"]);
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let h = Harness::new().await;
    let err = h.service().checkout(h.user, checkout(PaymentMethod::Cod, None)).await.unwrap_err();
    assert!(matches!(err, OrderError::EmptyCart));
    assert_eq!(h.backend.store.order_count().await, 0);
}

#[tokio::test]
async fn unavailable_product_aborts_checkout_and_keeps_cart() {
    let h = Harness::new().await;
    h.fill_cart_300().await;
    h.backend.carts.add(h.user, uuid::Uuid::new_v4(), 1).await;

    let err = h.service().checkout(h.user, checkout(PaymentMethod::Cod, None)).await.unwrap_err();
    assert!(matches!(err, OrderError::ProductUnavailable(_)));
    assert_eq!(h.backend.carts.cart_lines(h.user).await.unwrap().len(), 2);
    assert_eq!(h.backend.store.order_count().await, 0);
}

#[tokio::test]
async fn coupon_below_minimum_aborts_checkout() {
    let h = Harness::new().await;
    h.fill_cart_300().await;
    let err = h.service().checkout(h.user, checkout(PaymentMethod::Cod, Some("SAVE10"))).await.unwrap_err();
    match err {
        OrderError::BelowMinimum { minimum } => assert_eq!(minimum, inr(1000)),
        other => panic!("unexpected {other:?}"),
    }
    let err = h.service().checkout(h.user, checkout(PaymentMethod::Cod, Some("NOPE"))).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidCoupon));
    assert_eq!(h.backend.store.order_count().await, 0);
}

#[tokio::test]
async fn gateway_outage_creates_nothing() {
    let h = Harness::new().await;
    h.fill_cart_1200().await;
    h.gateway.set_failing(true);

    let err = h.service().checkout(h.user, checkout(PaymentMethod::Gateway, None)).await.unwrap_err();
    assert!(matches!(err, OrderError::GatewayUnavailable(_)));
    assert_eq!(h.backend.store.order_count().await, 0);
    assert_eq!(h.backend.carts.cart_lines(h.user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn new_accounts_get_free_delivery() {
    let h = Harness::new().await;
    let newcomer = uuid::Uuid::new_v4();
    h.backend.accounts.register(newcomer, support::start() - chrono::Duration::days(1)).await;

    let quote = h.service().delivery_quote(newcomer, inr(300), "302001").await.unwrap();
    assert_eq!(quote.charge, Money::zero(common_money::Currency::Inr));
    assert_eq!(quote.basis, ChargeBasis::NewAccount);

    let quote = h.service().delivery_quote(h.user, inr(300), "302001").await.unwrap();
    assert_eq!(quote.charge, inr(60));
    assert_eq!(quote.estimated_days, 5);

    let err = h.service().delivery_quote(h.user, inr(300), "30200").await.unwrap_err();
    assert!(matches!(err, OrderError::Unserviceable(_)));
}

#[tokio::test]
async fn apply_coupon_is_repeatable() {
    let h = Harness::new().await;
    let a = h.service().apply_coupon("save10", inr(1200)).await.unwrap();
    let b = h.service().apply_coupon("SAVE10", inr(1200)).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.final_amount, inr(1100));
    assert_eq!(h.service().list_coupons().await.unwrap().len(), 1);
}

#[tokio::test]
async fn history_lists_newest_first() {
    let h = Harness::new().await;
    h.fill_cart_300().await;
    let first = h.service().checkout(h.user, checkout(PaymentMethod::Cod, None)).await.unwrap();
    h.clock.advance(chrono::Duration::minutes(5));
    h.fill_cart_300().await;
    let second = h.service().checkout(h.user, checkout(PaymentMethod::Cod, None)).await.unwrap();

    let codes: Vec<String> = h
        .service()
        .order_history(h.user)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.order.code)
        .collect();
    assert_eq!(codes, [second.record.order.code, first.record.order.code]);
    assert!(h.service().order_history(uuid::Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn stalled_notification_relay_does_not_hold_up_requests() {
    let h = Harness::with_notifier(Arc::new(StalledNotifier)).await;
    h.fill_cart_1200().await;

    let receipt = tokio::time::timeout(Duration::from_secs(1), h.service().checkout(h.user, checkout(PaymentMethod::Gateway, None)))
        .await
        .expect("checkout waited on the notifier")
        .unwrap();
    let gref = receipt.gateway.unwrap().gateway_order_ref;
    let sig = h.sign(&gref, "pay_1");
    let outcome = tokio::time::timeout(Duration::from_secs(1), h.service().verify_gateway_callback(&gref, "pay_1", &sig))
        .await
        .expect("callback waited on the notifier")
        .unwrap();
    assert_eq!(outcome.disposition, CallbackDisposition::Confirmed);

    let cancelled = tokio::time::timeout(Duration::from_secs(1), h.service().cancel_order(&receipt.record.order.code))
        .await
        .expect("cancel waited on the notifier")
        .unwrap();
    assert_eq!(cancelled.change.refund_owed, Some(inr(1200)));
}
