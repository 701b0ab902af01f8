use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Client-assigned order identifier.
pub type OrderId = i64;

/// A customer order.
///
/// # Monetary Values
///
/// `unit_price` uses `rust_decimal::Decimal` so prices survive storage and
/// serialization without floating-point drift. It is accepted as either a
/// JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub order_id: OrderId,
    pub customer: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub order_date: String,
    pub priority: String,
}

impl Order {
    /// Check the fields every stored order must have.
    ///
    /// Text fields must be non-blank, quantity positive and the unit price
    /// non-negative.
    pub fn validate(&self) -> AppResult<()> {
        for (field, value) in [
            ("customer", &self.customer),
            ("product_name", &self.product_name),
            ("order_date", &self.order_date),
            ("priority", &self.priority),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::bad_request(
                    "invalid order",
                    format!("{field} is required"),
                ));
            }
        }

        if self.quantity <= 0 {
            return Err(AppError::bad_request(
                "invalid order",
                "quantity must be greater than 0",
            ));
        }

        if self.unit_price.is_sign_negative() {
            return Err(AppError::bad_request(
                "invalid order",
                "unit_price cannot be negative",
            ));
        }

        Ok(())
    }
}

/// A validated replacement for an existing order.
///
/// The id arrives twice on `PUT /api/orders/{id}`: in the path and in the
/// body. Only [`UpdateOrderCommand::reconcile`] can build this type, and it
/// refuses to pick one when they disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOrderCommand {
    order: Order,
}

impl UpdateOrderCommand {
    /// Combine the path id and the request body into one command.
    ///
    /// # Errors
    ///
    /// `AppError::BadRequest` if the ids differ or the body is invalid.
    pub fn reconcile(path_id: OrderId, body: Order) -> AppResult<Self> {
        if body.order_id != path_id {
            return Err(AppError::bad_request(
                "trying to update a different order",
                format!(
                    "path order id {path_id} does not match body order id {}",
                    body.order_id
                ),
            ));
        }

        body.validate()?;

        Ok(Self { order: body })
    }

    pub fn order_id(&self) -> OrderId {
        self.order.order_id
    }

    pub fn into_order(self) -> Order {
        self.order
    }
}
