mod extract;
mod health;
mod orders;
mod register;

pub use extract::{ApiJson, ApiPath};
pub use health::{health_check, method_not_allowed, not_found, readiness_check};
pub use orders::{create_order, delete_order, get_order, list_orders, update_order};
pub use register::register;
