pub mod context;
pub mod error;
pub mod roles;
pub mod test_macros;

pub use context::{SecurityContext, SecurityCtxExtractor};
pub use error::SecurityError;
pub use roles::{ensure_any_role, ensure_owner_or_staff, Role, STAFF_ROLES};
