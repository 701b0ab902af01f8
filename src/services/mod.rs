mod orders;
mod registration;

pub use orders::OrderService;
pub use registration::RegistrationService;
