use chrono::{DateTime, Utc};
use common_http_errors::ApiError;
use common_money::{Money, MoneyError};
use thiserror::Error;
use uuid::Uuid;

use crate::coupon::CouponError;
use crate::store::StoreError;

/// Every failure an order operation can report. Transport mapping lives in the
/// `From<OrderError> for ApiError` impl below.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("product {0} is no longer available")]
    ProductUnavailable(Uuid),
    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: Uuid, quantity: i32 },
    #[error("shipping address is missing {0}")]
    InvalidAddress(&'static str),
    #[error("postal code '{0}' is not serviceable")]
    Unserviceable(String),
    #[error("coupon is invalid or expired")]
    InvalidCoupon,
    #[error("order total is below the coupon minimum of {minimum}")]
    BelowMinimum { minimum: Money },
    #[error("order {0} not found")]
    OrderNotFound(String),
    #[error("return {0} not found")]
    ReturnNotFound(String),
    #[error("no payment is waiting on gateway order {0}")]
    OrphanedCallback(String),
    #[error("payment signature mismatch")]
    SignatureMismatch,
    #[error("cannot move {entity} from '{current}' to '{requested}'")]
    InvalidTransition { entity: &'static str, current: String, requested: String },
    #[error("order cannot be cancelled while tracking is '{current}'")]
    NotCancellable { current: String },
    #[error("order cannot ship while its gateway payment is '{current}'")]
    PaymentOutstanding { current: String },
    #[error("order has not been delivered (tracking is '{current}')")]
    NotDelivered { current: String },
    #[error("a return has already been requested for this order")]
    ReturnAlreadyRequested,
    #[error("return window closed at {deadline}")]
    ReturnWindowExpired { deadline: DateTime<Utc> },
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("could not allocate unique identifiers after {0} attempts")]
    IdentifiersExhausted(u32),
    #[error(transparent)]
    Money(#[from] MoneyError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::EmptyCart => "empty_cart",
            OrderError::ProductUnavailable(_) => "product_unavailable",
            OrderError::InvalidQuantity { .. } => "invalid_quantity",
            OrderError::InvalidAddress(_) => "invalid_address",
            OrderError::Unserviceable(_) => "unserviceable_postal_code",
            OrderError::InvalidCoupon => "invalid_coupon",
            OrderError::BelowMinimum { .. } => "below_minimum",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::ReturnNotFound(_) => "return_not_found",
            OrderError::OrphanedCallback(_) => "orphaned_callback",
            OrderError::SignatureMismatch => "sig_mismatch",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::NotCancellable { .. } => "not_cancellable",
            OrderError::PaymentOutstanding { .. } => "payment_outstanding",
            OrderError::NotDelivered { .. } => "not_delivered",
            OrderError::ReturnAlreadyRequested => "return_already_requested",
            OrderError::ReturnWindowExpired { .. } => "return_window_expired",
            OrderError::GatewayUnavailable(_) => "gateway_unavailable",
            OrderError::IdentifiersExhausted(_) => "identifiers_exhausted",
            OrderError::Money(MoneyError::CurrencyMismatch { .. }) => "currency_mismatch",
            OrderError::Money(_) => "invalid_amount",
            OrderError::Store(_) => "internal_error",
        }
    }
}

impl From<CouponError> for OrderError {
    fn from(err: CouponError) -> Self {
        match err {
            CouponError::Invalid => OrderError::InvalidCoupon,
            CouponError::BelowMinimum { minimum } => OrderError::BelowMinimum { minimum },
            CouponError::Money(e) => OrderError::Money(e),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        let code = err.code();
        let message = Some(err.to_string());
        match err {
            OrderError::EmptyCart
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidAddress(_)
            | OrderError::Unserviceable(_) => ApiError::BadRequest { code, trace_id: None, message },
            OrderError::OrderNotFound(_) | OrderError::ReturnNotFound(_) => ApiError::NotFound { code, trace_id: None },
            OrderError::SignatureMismatch => ApiError::Unauthorized { code, trace_id: None },
            OrderError::InvalidCoupon | OrderError::BelowMinimum { .. } | OrderError::Money(_) => {
                ApiError::Unprocessable { code, trace_id: None, message }
            }
            OrderError::ProductUnavailable(_)
            | OrderError::OrphanedCallback(_)
            | OrderError::InvalidTransition { .. }
            | OrderError::NotCancellable { .. }
            | OrderError::PaymentOutstanding { .. }
            | OrderError::NotDelivered { .. }
            | OrderError::ReturnAlreadyRequested
            | OrderError::ReturnWindowExpired { .. } => ApiError::Conflict { code, trace_id: None, message },
            OrderError::GatewayUnavailable(_) => ApiError::BadGateway { code, trace_id: None, message },
            // Storage details stay in the logs.
            OrderError::IdentifiersExhausted(_) | OrderError::Store(_) => ApiError::Internal { trace_id: None, message: None },
        }
    }
}
