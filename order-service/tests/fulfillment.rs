mod support;

use chrono::Duration;
use order_service::order::{OrderStatus, PaymentMethod};
use order_service::payment::PaymentStatus;
use order_service::returns::{ReturnReason, ReturnStatus, ReturnUpdate};
use order_service::tracking::TrackingStatus;
use order_service::OrderError;
use support::{checkout, inr, Harness};

async fn cod_order(h: &Harness) -> String {
    h.fill_cart_1200().await;
    h.service().checkout(h.user, checkout(PaymentMethod::Cod, None)).await.unwrap().record.order.code
}

async fn paid_gateway_order(h: &Harness) -> String {
    h.fill_cart_1200().await;
    let receipt = h.service().checkout(h.user, checkout(PaymentMethod::Gateway, None)).await.unwrap();
    let gref = receipt.gateway.unwrap().gateway_order_ref;
    let sig = h.sign(&gref, "pay_1");
    h.service().verify_gateway_callback(&gref, "pay_1", &sig).await.unwrap();
    receipt.record.order.code
}

async fn deliver(h: &Harness, code: &str) {
    for status in [TrackingStatus::Packaging, TrackingStatus::Shipped, TrackingStatus::OutForDelivery, TrackingStatus::Delivered] {
        h.service().advance_tracking(code, status).await.unwrap();
    }
}

#[tokio::test]
async fn tracking_moves_forward_only() {
    let h = Harness::new().await;
    let code = cod_order(&h).await;

    let outcome = h.service().advance_tracking(&code, TrackingStatus::Shipped).await.unwrap();
    assert_eq!(outcome.change.from, TrackingStatus::Confirmed);
    assert_eq!(outcome.record.tracking.status, TrackingStatus::Shipped);

    for backwards in [TrackingStatus::Packaging, TrackingStatus::Shipped, TrackingStatus::OrderPlaced] {
        let err = h.service().advance_tracking(&code, backwards).await.unwrap_err();
        match err {
            OrderError::InvalidTransition { entity, current, .. } => {
                assert_eq!(entity, "tracking");
                assert_eq!(current, "Shipped");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[tokio::test]
async fn delivery_stamps_time_and_timeline() {
    let h = Harness::new().await;
    let code = cod_order(&h).await;
    h.clock.advance(Duration::days(2));
    deliver(&h, &code).await;

    let (record, steps) = h.service().tracking_timeline(&code).await.unwrap();
    assert_eq!(record.tracking.delivered_at, Some(support::start() + Duration::days(2)));
    assert_eq!(steps.len(), 6);
    assert!(steps.iter().all(|s| s.completed));
    assert_eq!(record.tracking.history.len(), 6);
}

#[tokio::test]
async fn cancel_is_refused_once_out_for_delivery() {
    let h = Harness::new().await;
    let code = cod_order(&h).await;
    h.service().advance_tracking(&code, TrackingStatus::OutForDelivery).await.unwrap();

    let err = h.service().cancel_order(&code).await.unwrap_err();
    assert!(matches!(err, OrderError::NotCancellable { ref current } if current == "Out for Delivery"));
    let err = h.service().advance_tracking(&code, TrackingStatus::Cancelled).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition { .. }));

    let record = h.service().get_order(&code).await.unwrap();
    assert_eq!(record.order.status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn cancelling_a_paid_order_owes_a_refund() {
    let h = Harness::new().await;
    let code = paid_gateway_order(&h).await;

    let outcome = h.service().advance_tracking(&code, TrackingStatus::Cancelled).await.unwrap();
    assert_eq!(outcome.change.refund_owed, Some(inr(1200)));
    assert_eq!(outcome.record.order.status, OrderStatus::Cancelled);
    assert_eq!(outcome.record.payment.status, PaymentStatus::Refunded);

    let err = h.service().cancel_order(&code).await.unwrap_err();
    assert!(matches!(err, OrderError::NotCancellable { .. }));
    assert!(h.notifier.settled(3).await.contains(&"order_cancelled"));
}

#[tokio::test]
async fn cancelling_cod_owes_nothing() {
    let h = Harness::new().await;
    let code = cod_order(&h).await;
    let outcome = h.service().cancel_order(&code).await.unwrap();
    assert_eq!(outcome.change.refund_owed, None);
    assert_eq!(outcome.record.payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn unpaid_gateway_order_does_not_ship() {
    let h = Harness::new().await;
    h.fill_cart_1200().await;
    let receipt = h.service().checkout(h.user, checkout(PaymentMethod::Gateway, None)).await.unwrap();
    let code = receipt.record.order.code;

    for status in [TrackingStatus::Confirmed, TrackingStatus::Shipped, TrackingStatus::Delivered] {
        let err = h.service().advance_tracking(&code, status).await.unwrap_err();
        assert!(matches!(err, OrderError::PaymentOutstanding { ref current } if current == "pending"));
        assert_eq!(err.code(), "payment_outstanding");
    }
    let gref = receipt.gateway.unwrap().gateway_order_ref;
    h.service().record_gateway_failure(&gref, "card declined").await.unwrap();
    let err = h.service().advance_tracking(&code, TrackingStatus::Packaging).await.unwrap_err();
    assert!(matches!(err, OrderError::PaymentOutstanding { ref current } if current == "failed"));

    // Cancellation is still open to an unpaid order.
    let outcome = h.service().advance_tracking(&code, TrackingStatus::Cancelled).await.unwrap();
    assert_eq!(outcome.record.tracking.status, TrackingStatus::Cancelled);
    assert_eq!(outcome.change.refund_owed, None);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let h = Harness::new().await;
    let err = h.service().advance_tracking("ORD000000000", TrackingStatus::Packaging).await.unwrap_err();
    assert!(matches!(err, OrderError::OrderNotFound(_)));
}

#[tokio::test]
async fn return_requires_delivery() {
    let h = Harness::new().await;
    let code = cod_order(&h).await;
    let err = h.service().request_return(&code, ReturnReason::Defective, "").await.unwrap_err();
    assert!(matches!(err, OrderError::NotDelivered { .. }));
}

#[tokio::test]
async fn return_window_closes_after_the_longest_item_window() {
    // The mixer carries a 10 day window.
    let h = Harness::new().await;
    let code = cod_order(&h).await;
    deliver(&h, &code).await;

    h.clock.advance(Duration::days(11));
    let err = h.service().request_return(&code, ReturnReason::Damaged, "dented").await.unwrap_err();
    assert!(matches!(err, OrderError::ReturnWindowExpired { .. }));

    h.clock.advance(Duration::days(-1));
    let record = h.service().request_return(&code, ReturnReason::Damaged, "dented").await.unwrap();
    assert_eq!(record.return_request.unwrap().status, ReturnStatus::Requested);
}

#[tokio::test]
async fn return_on_day_eight_of_a_seven_day_window_is_expired() {
    let h = Harness::new().await;
    h.fill_cart_300().await;
    let code = h.service().checkout(h.user, checkout(PaymentMethod::Cod, None)).await.unwrap().record.order.code;
    deliver(&h, &code).await;

    h.clock.advance(Duration::days(8));
    let err = h.service().request_return(&code, ReturnReason::ChangedMind, "").await.unwrap_err();
    assert_eq!(err.code(), "return_window_expired");

    h.clock.advance(Duration::days(-1));
    assert!(h.service().request_return(&code, ReturnReason::ChangedMind, "").await.is_ok());
}

#[tokio::test]
async fn return_walks_the_workflow_to_refund() {
    let h = Harness::new().await;
    let code = cod_order(&h).await;
    deliver(&h, &code).await;

    let record = h.service().request_return(&code, ReturnReason::Defective, "does not power on").await.unwrap();
    let request = record.return_request.unwrap();
    assert_eq!(request.refund_amount, record.order.pricing.final_total);
    let rcode = request.code;

    let err = h.service().request_return(&code, ReturnReason::Defective, "again").await.unwrap_err();
    assert!(matches!(err, OrderError::ReturnAlreadyRequested));

    let err = h.service().advance_return(&rcode, ReturnStatus::PickedUp, ReturnUpdate::default()).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition { entity: "return", .. }));

    let pickup = (support::start() + Duration::days(3)).date_naive();
    let steps = [
        (ReturnStatus::Approved, ReturnUpdate::default()),
        (ReturnStatus::PickupScheduled, ReturnUpdate { pickup_date: Some(pickup), ..Default::default() }),
        (ReturnStatus::PickedUp, ReturnUpdate::default()),
        (ReturnStatus::Received, ReturnUpdate::default()),
        (ReturnStatus::QualityCheck, ReturnUpdate { admin_notes: Some("motor burnt".into()), ..Default::default() }),
        (ReturnStatus::RefundInitiated, ReturnUpdate::default()),
        (ReturnStatus::RefundCompleted, ReturnUpdate::default()),
    ];
    for (status, update) in steps {
        h.service().advance_return(&rcode, status, update).await.unwrap();
    }

    let (_, request) = h.service().return_status(&rcode).await.unwrap();
    assert_eq!(request.status, ReturnStatus::RefundCompleted);
    assert_eq!(request.pickup_date, Some(pickup));
    assert_eq!(request.admin_notes.as_deref(), Some("motor burnt"));
    assert!(request.approved_at.is_some());
    assert!(request.completed_at.is_some());

    let err = h.service().advance_return(&rcode, ReturnStatus::Rejected, ReturnUpdate::default()).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition { .. }));
}

#[tokio::test]
async fn rejected_return_blocks_another() {
    let h = Harness::new().await;
    let code = cod_order(&h).await;
    deliver(&h, &code).await;
    let rcode = h
        .service()
        .request_return(&code, ReturnReason::SizeIssue, "")
        .await
        .unwrap()
        .return_request
        .unwrap()
        .code;

    h.service().advance_return(&rcode, ReturnStatus::Approved, ReturnUpdate::default()).await.unwrap();
    let update = ReturnUpdate { rejection_reason: Some("tags removed".into()), ..Default::default() };
    let record = h.service().advance_return(&rcode, ReturnStatus::Rejected, update).await.unwrap();
    assert_eq!(record.return_request.unwrap().rejection_reason.as_deref(), Some("tags removed"));

    let err = h.service().request_return(&code, ReturnReason::SizeIssue, "").await.unwrap_err();
    assert!(matches!(err, OrderError::ReturnAlreadyRequested));
    let err = h.service().return_status("RET000000000").await.unwrap_err();
    assert!(matches!(err, OrderError::ReturnNotFound(_)));
}

#[tokio::test]
async fn invoice_total_matches_charge() {
    let h = Harness::new().await;
    h.fill_cart_300().await;
    let code = h.service().checkout(h.user, checkout(PaymentMethod::Cod, None)).await.unwrap().record.order.code;
    let (record, invoice) = h.service().invoice(&code).await.unwrap();
    assert_eq!(invoice.number, format!("INV-{code}"));
    assert_eq!(invoice.total, record.order.pricing.final_total);
    let t = invoice.tax;
    assert_eq!(t.taxable.checked_add(t.cgst).unwrap().checked_add(t.sgst).unwrap(), invoice.total);
}
