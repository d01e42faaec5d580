pub mod auth;
pub mod csrf;
pub mod maintenance;

pub use auth::{require_admin, require_auth, AuthUser, Claims};
pub use csrf::csrf_guard;
pub use maintenance::maintenance_gate;
