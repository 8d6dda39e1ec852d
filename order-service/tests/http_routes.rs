mod support;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use common_security::test_request_headers;
use serde_json::{json, Value};
use tower::ServiceExt; // for oneshot
use uuid::Uuid;

use order_service::build_router;
use support::Harness;

fn app(h: &Harness) -> Router { build_router(h.state.clone()) }

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).method("GET").body(Body::empty()).unwrap()
}

async fn json_body(resp: Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn order_body(method: &str) -> Value {
    json!({
        "address": {
            "name": "Asha Rao",
            "phone": "9800000000",
            "address_line": "12 MG Road",
            "city": "Bengaluru",
            "postal_code": "560001"
        },
        "coupon_code": "SAVE10",
        "payment_method": method
    })
}

async fn place_order(h: &Harness, method: &str) -> Value {
    h.fill_cart_1200().await;
    let mut req = post("/orders", order_body(method));
    test_request_headers!(req, roles = "customer", user = &h.user.to_string());
    let resp = app(h).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    json_body(resp).await
}

#[tokio::test]
async fn create_order_returns_created_with_pricing() {
    let h = Harness::new().await;
    let body = place_order(&h, "razorpay").await;
    assert_eq!(body["order"]["pricing"]["final_total"]["amount"], "1100.00");
    assert_eq!(body["order"]["status"], "pending");
    assert_eq!(body["gateway"]["amount"]["minor"], 110_000);
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let h = Harness::new().await;
    let resp = app(&h).oneshot(post("/orders", order_body("cod"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "missing_user");
}

#[tokio::test]
async fn unknown_payment_method_is_bad_request() {
    let h = Harness::new().await;
    h.fill_cart_1200().await;
    let mut req = post("/orders", order_body("cheque"));
    test_request_headers!(req, user = &h.user.to_string());
    let resp = app(&h).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "invalid_payment_method");
}

#[tokio::test]
async fn orders_are_visible_to_owner_and_staff_only() {
    let h = Harness::new().await;
    let body = place_order(&h, "cod").await;
    let code = body["order"]["order_code"].as_str().unwrap().to_string();
    let uri = format!("/orders/{code}");

    let mut req = get(&uri);
    test_request_headers!(req, roles = "customer", user = &Uuid::new_v4().to_string());
    let resp = app(&h).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let mut req = get(&uri);
    test_request_headers!(req, roles = "staff", user = &Uuid::new_v4().to_string());
    let resp = app(&h).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let mut req = get("/orders/ORD000000000");
    test_request_headers!(req, user = &h.user.to_string());
    let resp = app(&h).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "order_not_found");
}

#[tokio::test]
async fn customers_cannot_advance_tracking() {
    let h = Harness::new().await;
    let body = place_order(&h, "cod").await;
    let code = body["order"]["order_code"].as_str().unwrap().to_string();
    let uri = format!("/orders/{code}/tracking");

    let mut req = post(&uri, json!({ "status": "packaging" }));
    test_request_headers!(req, roles = "customer", user = &h.user.to_string());
    let resp = app(&h).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "missing_role");

    let mut req = post(&uri, json!({ "status": "out_for_delivery" }));
    test_request_headers!(req, roles = "admin", user = &Uuid::new_v4().to_string());
    let resp = app(&h).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "Out for Delivery");

    let mut req = post(&format!("/orders/{code}/cancel"), json!({}));
    test_request_headers!(req, user = &h.user.to_string());
    let resp = app(&h).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "not_cancellable");
}

#[tokio::test]
async fn callback_checks_signature_without_identity() {
    let h = Harness::new().await;
    let body = place_order(&h, "gateway").await;
    let gref = body["gateway"]["gateway_order_ref"].as_str().unwrap().to_string();

    let bad = json!({
        "razorpay_order_id": gref,
        "razorpay_payment_id": "pay_1",
        "razorpay_signature": "00"
    });
    let resp = app(&h).oneshot(post("/payments/gateway/callback", bad)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "sig_mismatch");

    let good = json!({
        "gateway_order_ref": gref,
        "gateway_payment_ref": "pay_1",
        "signature": h.sign(&gref, "pay_1")
    });
    let resp = app(&h).oneshot(post("/payments/gateway/callback", good)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["disposition"], "confirmed");
    assert_eq!(body["applied"], true);
}

#[tokio::test]
async fn serviceability_needs_no_identity() {
    let h = Harness::new().await;
    let resp = app(&h).oneshot(post("/delivery/serviceability", json!({ "postal_code": "110001" }))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["serviceable"], true);
    assert_eq!(body["metro"], true);

    let resp = app(&h).oneshot(post("/delivery/serviceability", json!({ "postal_code": "abc" }))).await.unwrap();
    assert_eq!(json_body(resp).await["serviceable"], false);
}

#[tokio::test]
async fn apply_coupon_rejects_malformed_amount() {
    let h = Harness::new().await;
    let mut req = post("/coupons/apply", json!({ "code": "SAVE10", "cart_total": "twelve" }));
    test_request_headers!(req, user = &h.user.to_string());
    let resp = app(&h).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "invalid_amount");

    let mut req = post("/coupons/apply", json!({ "code": "save10", "cart_total": "1200" }));
    test_request_headers!(req, user = &h.user.to_string());
    let resp = app(&h).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["final_amount"]["amount"], "1100.00");
}

#[tokio::test]
async fn health_and_metrics_are_served() {
    let h = Harness::new().await;
    let resp = app(&h).oneshot(get("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Counted by the error middleware.
    let resp = app(&h).oneshot(get("/orders")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app(&h).oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_errors_total"));
    assert!(text.contains("missing_user"));
}
