use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use common_http_errors::{ApiError, ApiResult};
use common_money::Money;
use common_security::context::trace_id_from_headers;
use common_security::{ensure_any_role, ensure_owner_or_staff, SecurityContext, SecurityCtxExtractor, STAFF_ROLES};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::OrderError;
use crate::order::{PaymentMethod, ShippingAddress};
use crate::returns::{ReturnReason, ReturnStatus, ReturnUpdate};
use crate::service::CheckoutRequest;
use crate::tracking::TrackingStatus;
use crate::views::v1;

/// Map a service error onto the transport error, tagging it with the request's trace id.
fn api_err(trace_id: Option<Uuid>) -> impl Fn(OrderError) -> ApiError {
    move |err| {
        if matches!(err, OrderError::Store(_) | OrderError::IdentifiersExhausted(_)) {
            error!(error = %err, ?trace_id, "order operation failed");
        }
        ApiError::from(err).with_trace_id(trace_id)
    }
}

fn require_staff(sec: &SecurityContext) -> ApiResult<()> {
    ensure_any_role(sec, STAFF_ROLES).map_err(|e| e.into_api_error(sec.trace_id))
}

fn require_owner_or_staff(sec: &SecurityContext, owner: Uuid) -> ApiResult<()> {
    ensure_owner_or_staff(sec, owner).map_err(|e| e.into_api_error(sec.trace_id))
}

fn parse_money(raw: &str, state: &AppState, trace_id: Option<Uuid>) -> ApiResult<Money> {
    let currency = state.service.config().currency;
    Money::parse_decimal(raw, currency).map_err(|e| ApiError::BadRequest {
        code: "invalid_amount",
        trace_id,
        message: Some(e.to_string()),
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub address: ShippingAddress,
    #[serde(default)]
    pub coupon_code: Option<String>,
    pub payment_method: String,
}

pub async fn create_order(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Json(body): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<v1::CheckoutView>)> {
    let payment_method = PaymentMethod::parse(body.payment_method.trim()).ok_or(ApiError::BadRequest {
        code: "invalid_payment_method",
        trace_id: sec.trace_id,
        message: Some(format!("unknown payment method '{}'", body.payment_method)),
    })?;
    let request = CheckoutRequest { address: body.address, coupon_code: body.coupon_code, payment_method };
    let receipt = state.service.checkout(sec.user_id, request).await.map_err(api_err(sec.trace_id))?;
    Ok((StatusCode::CREATED, Json((&receipt).into())))
}

pub async fn list_orders(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
) -> ApiResult<Json<Vec<v1::OrderSummary>>> {
    let records = state.service.order_history(sec.user_id).await.map_err(api_err(sec.trace_id))?;
    Ok(Json(records.iter().map(Into::into).collect()))
}

pub async fn get_order(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Path(order_code): Path<String>,
) -> ApiResult<Json<v1::OrderView>> {
    let record = state.service.get_order(&order_code).await.map_err(api_err(sec.trace_id))?;
    require_owner_or_staff(&sec, record.order.user_id)?;
    Ok(Json((&record).into()))
}

pub async fn get_tracking(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Path(order_code): Path<String>,
) -> ApiResult<Json<v1::TimelineView>> {
    let (record, steps) = state.service.tracking_timeline(&order_code).await.map_err(api_err(sec.trace_id))?;
    require_owner_or_staff(&sec, record.order.user_id)?;
    Ok(Json(v1::TimelineView::new(&record, &steps)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Path(order_code): Path<String>,
) -> ApiResult<Json<v1::InvoiceView>> {
    let (record, invoice) = state.service.invoice(&order_code).await.map_err(api_err(sec.trace_id))?;
    require_owner_or_staff(&sec, record.order.user_id)?;
    Ok(Json((&invoice).into()))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Path(order_code): Path<String>,
) -> ApiResult<Json<v1::TrackingChangeView>> {
    let record = state.service.get_order(&order_code).await.map_err(api_err(sec.trace_id))?;
    require_owner_or_staff(&sec, record.order.user_id)?;
    let outcome = state.service.cancel_order(&order_code).await.map_err(api_err(sec.trace_id))?;
    Ok(Json((&outcome).into()))
}

#[derive(Debug, Deserialize)]
pub struct AdvanceTrackingRequest {
    pub status: String,
}

pub async fn advance_tracking(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Path(order_code): Path<String>,
    Json(body): Json<AdvanceTrackingRequest>,
) -> ApiResult<Json<v1::TrackingChangeView>> {
    require_staff(&sec)?;
    let status = TrackingStatus::parse(&body.status).ok_or(ApiError::BadRequest {
        code: "invalid_status",
        trace_id: sec.trace_id,
        message: Some(format!("unknown tracking status '{}'", body.status)),
    })?;
    let outcome = state.service.advance_tracking(&order_code, status).await.map_err(api_err(sec.trace_id))?;
    Ok(Json((&outcome).into()))
}

#[derive(Debug, Deserialize)]
pub struct RequestReturnBody {
    pub reason: String,
    #[serde(default)]
    pub reason_text: String,
}

pub async fn request_return(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Path(order_code): Path<String>,
    Json(body): Json<RequestReturnBody>,
) -> ApiResult<(StatusCode, Json<v1::ReturnView>)> {
    let record = state.service.get_order(&order_code).await.map_err(api_err(sec.trace_id))?;
    if record.order.user_id != sec.user_id {
        return Err(ApiError::Forbidden { trace_id: sec.trace_id });
    }
    let reason = ReturnReason::parse(&body.reason).ok_or(ApiError::BadRequest {
        code: "invalid_reason",
        trace_id: sec.trace_id,
        message: Some(format!("unknown return reason '{}'", body.reason)),
    })?;
    let record = state
        .service
        .request_return(&order_code, reason, &body.reason_text)
        .await
        .map_err(api_err(sec.trace_id))?;
    let request = record.return_request.as_ref().ok_or_else(|| ApiError::internal("return missing after insert", sec.trace_id))?;
    Ok((StatusCode::CREATED, Json(v1::ReturnView::new(&record.order.code, request))))
}

pub async fn get_return(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Path(return_code): Path<String>,
) -> ApiResult<Json<v1::ReturnView>> {
    let (record, request) = state.service.return_status(&return_code).await.map_err(api_err(sec.trace_id))?;
    require_owner_or_staff(&sec, record.order.user_id)?;
    Ok(Json(v1::ReturnView::new(&record.order.code, &request)))
}

#[derive(Debug, Deserialize)]
pub struct AdvanceReturnRequest {
    pub status: String,
    #[serde(flatten)]
    pub update: ReturnUpdate,
}

pub async fn advance_return(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Path(return_code): Path<String>,
    Json(body): Json<AdvanceReturnRequest>,
) -> ApiResult<Json<v1::ReturnView>> {
    require_staff(&sec)?;
    let status = ReturnStatus::parse(&body.status).ok_or(ApiError::BadRequest {
        code: "invalid_status",
        trace_id: sec.trace_id,
        message: Some(format!("unknown return status '{}'", body.status)),
    })?;
    let record = state
        .service
        .advance_return(&return_code, status, body.update)
        .await
        .map_err(api_err(sec.trace_id))?;
    let request = record.return_request.as_ref().ok_or_else(|| ApiError::internal("return missing after update", sec.trace_id))?;
    Ok(Json(v1::ReturnView::new(&record.order.code, request)))
}

#[derive(Debug, Deserialize)]
pub struct GatewayCallback {
    #[serde(alias = "razorpay_order_id")]
    pub gateway_order_ref: String,
    #[serde(alias = "razorpay_payment_id")]
    pub gateway_payment_ref: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

/// Authenticated by the signature alone; no user identity is expected.
pub async fn gateway_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GatewayCallback>,
) -> ApiResult<Json<v1::CallbackView>> {
    let trace_id = trace_id_from_headers(&headers).or_else(|| Some(Uuid::new_v4()));
    let outcome = state
        .service
        .verify_gateway_callback(&body.gateway_order_ref, &body.gateway_payment_ref, &body.signature)
        .await
        .map_err(api_err(trace_id))?;
    Ok(Json((&outcome).into()))
}

#[derive(Debug, Deserialize)]
pub struct GatewayFailure {
    #[serde(alias = "razorpay_order_id")]
    pub gateway_order_ref: String,
    #[serde(default)]
    pub reason: String,
}

pub async fn gateway_failure(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Json(body): Json<GatewayFailure>,
) -> ApiResult<Json<v1::FailureView>> {
    let record = state.service.order_by_gateway_ref(&body.gateway_order_ref).await.map_err(api_err(sec.trace_id))?;
    require_owner_or_staff(&sec, record.order.user_id)?;
    let outcome = state
        .service
        .record_gateway_failure(&body.gateway_order_ref, &body.reason)
        .await
        .map_err(api_err(sec.trace_id))?;
    Ok(Json((&outcome).into()))
}

pub async fn list_coupons(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
) -> ApiResult<Json<Vec<v1::CouponView>>> {
    let coupons = state.service.list_coupons().await.map_err(api_err(sec.trace_id))?;
    Ok(Json(coupons.iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
    /// Decimal amount in major units of the store currency.
    pub cart_total: String,
}

pub async fn apply_coupon(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Json(body): Json<ApplyCouponRequest>,
) -> ApiResult<Json<v1::CouponApplicationView>> {
    let cart_total = parse_money(&body.cart_total, &state, sec.trace_id)?;
    let applied = state.service.apply_coupon(&body.code, cart_total).await.map_err(api_err(sec.trace_id))?;
    Ok(Json((&applied).into()))
}

#[derive(Debug, Deserialize)]
pub struct DeliveryQuoteRequest {
    pub subtotal: String,
    pub postal_code: String,
}

pub async fn delivery_quote(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Json(body): Json<DeliveryQuoteRequest>,
) -> ApiResult<Json<v1::DeliveryQuoteView>> {
    let subtotal = parse_money(&body.subtotal, &state, sec.trace_id)?;
    let quote = state
        .service
        .delivery_quote(sec.user_id, subtotal, &body.postal_code)
        .await
        .map_err(api_err(sec.trace_id))?;
    Ok(Json((&quote).into()))
}

#[derive(Debug, Deserialize)]
pub struct ServiceabilityRequest {
    pub postal_code: String,
}

pub async fn check_serviceability(
    State(state): State<AppState>,
    Json(body): Json<ServiceabilityRequest>,
) -> Json<v1::ServiceabilityView> {
    let result = state.service.check_serviceability(&body.postal_code);
    Json(v1::ServiceabilityView::new(&body.postal_code, result))
}
