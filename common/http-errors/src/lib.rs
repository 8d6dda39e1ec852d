use axum::{http::{StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub missing_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")] pub retryable: bool,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized { code: &'static str, trace_id: Option<Uuid> },
    ForbiddenMissingRole { role: &'static str, trace_id: Option<Uuid> },
    Forbidden { trace_id: Option<Uuid> },
    BadRequest { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    NotFound { code: &'static str, trace_id: Option<Uuid> },
    /// The resource exists but its current state forbids the request.
    Conflict { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    Unprocessable { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    /// An upstream dependency failed; the client may retry.
    BadGateway { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    Internal { trace_id: Option<Uuid>, message: Option<String> },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E, trace_id: Option<Uuid>) -> Self { Self::Internal { trace_id, message: Some(e.to_string()) } }
    pub fn bad_request(code: &'static str, trace_id: Option<Uuid>) -> Self { Self::BadRequest { code, trace_id, message: None } }
    pub fn conflict(code: &'static str, message: impl Into<String>, trace_id: Option<Uuid>) -> Self {
        Self::Conflict { code, trace_id, message: Some(message.into()) }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized { code, .. } => code,
            ApiError::ForbiddenMissingRole { .. } => "missing_role",
            ApiError::Forbidden { .. } => "forbidden",
            ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Conflict { code, .. }
            | ApiError::Unprocessable { code, .. }
            | ApiError::BadGateway { code, .. } => code,
            ApiError::Internal { .. } => "internal_error",
        }
    }

    /// Attach a trace id after the fact (errors built deep in the core carry none).
    pub fn with_trace_id(mut self, id: Option<Uuid>) -> Self {
        match &mut self {
            ApiError::Unauthorized { trace_id, .. }
            | ApiError::ForbiddenMissingRole { trace_id, .. }
            | ApiError::Forbidden { trace_id }
            | ApiError::BadRequest { trace_id, .. }
            | ApiError::NotFound { trace_id, .. }
            | ApiError::Conflict { trace_id, .. }
            | ApiError::Unprocessable { trace_id, .. }
            | ApiError::BadGateway { trace_id, .. }
            | ApiError::Internal { trace_id, .. } => {
                if trace_id.is_none() { *trace_id = id; }
            }
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_code = self.code();
        let body = |code: &str, missing_role: Option<String>, trace_id, message, retryable| ErrorBody {
            code: code.into(), missing_role, trace_id, message, retryable,
        };
        let (status, body) = match self {
            ApiError::Unauthorized { code, trace_id } => (StatusCode::UNAUTHORIZED, body(code, None, trace_id, None, false)),
            ApiError::ForbiddenMissingRole { role, trace_id } => (StatusCode::FORBIDDEN, body("missing_role", Some(role.into()), trace_id, None, false)),
            ApiError::Forbidden { trace_id } => (StatusCode::FORBIDDEN, body("forbidden", None, trace_id, None, false)),
            ApiError::BadRequest { code, trace_id, message } => (StatusCode::BAD_REQUEST, body(code, None, trace_id, message, false)),
            ApiError::NotFound { code, trace_id } => (StatusCode::NOT_FOUND, body(code, None, trace_id, None, false)),
            ApiError::Conflict { code, trace_id, message } => (StatusCode::CONFLICT, body(code, None, trace_id, message, false)),
            ApiError::Unprocessable { code, trace_id, message } => (StatusCode::UNPROCESSABLE_ENTITY, body(code, None, trace_id, message, false)),
            ApiError::BadGateway { code, trace_id, message } => (StatusCode::BAD_GATEWAY, body(code, None, trace_id, message, true)),
            ApiError::Internal { trace_id, message } => (StatusCode::INTERNAL_SERVER_ERROR, body("internal_error", None, trace_id, message, false)),
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
