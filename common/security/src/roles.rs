use crate::context::SecurityContext;
use crate::SecurityError;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Staff,
    Admin,
    Unknown(String),
}

/// Roles allowed to act on orders they do not own.
pub const STAFF_ROLES: &[Role] = &[Role::Staff, Role::Admin];

impl Role {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Role::Customer,
            "staff" => Role::Staff,
            "admin" => Role::Admin,
            other => Role::Unknown(other.to_string()),
        }
    }
}

pub fn ensure_any_role(ctx: &SecurityContext, required: &[Role]) -> Result<(), SecurityError> {
    if ctx.roles.iter().any(|r| required.iter().any(|x| x == r)) { return Ok(()); }
    warn!(user_id = %ctx.user_id, ?required, roles = ?ctx.roles, "any_role_check_failed");
    Err(SecurityError::Forbidden)
}

pub fn ensure_owner_or_staff(ctx: &SecurityContext, owner: Uuid) -> Result<(), SecurityError> {
    if ctx.user_id == owner || ctx.is_staff() { return Ok(()); }
    warn!(user_id = %ctx.user_id, %owner, "owner_check_failed");
    Err(SecurityError::NotOwner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(roles: Vec<Role>) -> SecurityContext {
        SecurityContext { user_id: Uuid::new_v4(), roles, trace_id: None }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Role::parse("Admin"), Role::Admin);
        assert_eq!(Role::parse(" staff "), Role::Staff);
        assert_eq!(Role::parse("cashier"), Role::Unknown("cashier".into()));
    }

    #[test]
    fn customer_cannot_act_as_staff() {
        assert_eq!(ensure_any_role(&ctx(vec![Role::Customer]), STAFF_ROLES), Err(SecurityError::Forbidden));
        assert!(ensure_any_role(&ctx(vec![Role::Admin]), STAFF_ROLES).is_ok());
        assert!(ensure_any_role(&ctx(vec![Role::Staff]), STAFF_ROLES).is_ok());
    }

    #[test]
    fn owner_or_staff() {
        let c = ctx(vec![Role::Customer]);
        assert!(ensure_owner_or_staff(&c, c.user_id).is_ok());
        assert_eq!(ensure_owner_or_staff(&c, Uuid::new_v4()), Err(SecurityError::NotOwner));
        assert!(ensure_owner_or_staff(&ctx(vec![Role::Staff]), Uuid::new_v4()).is_ok());
    }
}
