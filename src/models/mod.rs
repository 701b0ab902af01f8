mod api;
mod credential;
mod order;

pub use api::{HealthResponse, MessageResponse, OrdersResponse};
pub use credential::{Credential, RegisterRequest};
pub use order::{Order, OrderId, UpdateOrderCommand};
