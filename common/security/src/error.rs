use axum::http::StatusCode;
use common_http_errors::ApiError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("missing or invalid user identity")]    MissingUser,
    #[error("unauthorized - missing required role")]    Forbidden,
    #[error("resource belongs to another user")]    NotOwner,
}

impl From<SecurityError> for (StatusCode, String) {
    fn from(e: SecurityError) -> Self {
        match e {
            SecurityError::MissingUser => (StatusCode::UNAUTHORIZED, e.to_string()),
            SecurityError::Forbidden | SecurityError::NotOwner => (StatusCode::FORBIDDEN, e.to_string()),
        }
    }
}

impl SecurityError {
    pub fn into_api_error(self, trace_id: Option<Uuid>) -> ApiError {
        match self {
            SecurityError::MissingUser => ApiError::Unauthorized { code: "missing_user", trace_id },
            SecurityError::Forbidden => ApiError::ForbiddenMissingRole { role: "staff", trace_id },
            SecurityError::NotOwner => ApiError::Forbidden { trace_id },
        }
    }
}
