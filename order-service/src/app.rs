use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::{middleware, routing::{get, post}, Router};
use common_observability::OrderMetrics;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::order_handlers::{
    advance_return, advance_tracking, apply_coupon, cancel_order, check_serviceability, create_order, delivery_quote,
    gateway_callback, gateway_failure, get_invoice, get_order, get_return, get_tracking, list_coupons, list_orders,
    request_return,
};
use crate::service::OrderService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService>,
    pub metrics: OrderMetrics,
}

impl AppState {
    pub fn new(service: OrderService) -> Self {
        let metrics = service.metrics().clone();
        Self { service: Arc::new(service), metrics }
    }
}

pub async fn http_error_metrics(
    State(state): State<AppState>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()).unwrap_or("unknown");
        state.metrics.http_errors_total.with_label_values(&["order-service", code, status.as_str()]).inc();
    }
    resp
}

pub async fn health() -> &'static str { "ok" }

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics.encode() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("metrics encode error: {e}")),
    }
}

pub fn build_router(state: AppState) -> Router {
    let allowed_origins = [
        "http://localhost:3000",
        "http://localhost:3001",
        "http://localhost:5173",
    ];
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()).collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-roles"),
            HeaderName::from_static("x-trace-id"),
        ]);

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:order_code", get(get_order))
        .route("/orders/:order_code/tracking", get(get_tracking).post(advance_tracking))
        .route("/orders/:order_code/invoice", get(get_invoice))
        .route("/orders/:order_code/cancel", post(cancel_order))
        .route("/orders/:order_code/returns", post(request_return))
        .route("/returns/:return_code", get(get_return))
        .route("/returns/:return_code/status", post(advance_return))
        .route("/payments/gateway/callback", post(gateway_callback))
        .route("/payments/gateway/failure", post(gateway_failure))
        .route("/coupons", get(list_coupons))
        .route("/coupons/apply", post(apply_coupon))
        .route("/delivery/quote", post(delivery_quote))
        .route("/delivery/serviceability", post(check_serviceability))
        .layer(cors)
        .layer(middleware::from_fn_with_state(state.clone(), http_error_metrics))
        .with_state(state)
}
