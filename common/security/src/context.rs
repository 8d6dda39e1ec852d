use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use tracing::Span;
use uuid::Uuid;
use serde::{Serialize, Deserialize};
use common_http_errors::ApiError;
use crate::roles::{Role, STAFF_ROLES};
use crate::SecurityError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub user_id: Uuid,
    pub roles: Vec<Role>,
    pub trace_id: Option<Uuid>,
}

impl SecurityContext {
    pub fn is_staff(&self) -> bool {
        self.roles.iter().any(|r| STAFF_ROLES.contains(r))
    }
}

pub struct SecurityCtxExtractor(pub SecurityContext);

fn user_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers.get("X-User-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

fn roles_from_headers(headers: &HeaderMap) -> Vec<Role> {
    headers
        .get("X-Roles")
        .and_then(|v| v.to_str().ok())
        .map(|csv| {
            csv
                .split([',', ' '])
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(Role::parse)
                .collect()
        })
        .unwrap_or_default()
}

pub fn trace_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers.get("X-Trace-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

// Identity headers are set by the upstream auth proxy after token verification.
#[async_trait]
impl<S> FromRequestParts<S> for SecurityCtxExtractor where S: Send + Sync {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let trace_id = trace_id_from_headers(headers).or_else(|| Some(Uuid::new_v4()));
        let user_id = user_from_headers(headers)
            .ok_or_else(|| SecurityError::MissingUser.into_api_error(trace_id))?;
        let roles = roles_from_headers(headers);

        Span::current().record("user_id", tracing::field::display(user_id));
        if let Some(tid) = trace_id.as_ref() {
            Span::current().record("trace_id", tracing::field::display(tid));
        }

        Ok(SecurityCtxExtractor(SecurityContext { user_id, roles, trace_id }))
    }
}
