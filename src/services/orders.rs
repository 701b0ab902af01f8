use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{Order, OrderId, UpdateOrderCommand};
use crate::store::{OrderRepository, StoreError};

/// Order operations on top of an [`OrderRepository`].
///
/// Maps repository outcomes onto API errors: a taken id on create is a
/// conflict, a missing id on get/update/delete is not-found.
#[derive(Clone)]
pub struct OrderService {
    repository: Arc<dyn OrderRepository>,
}

impl OrderService {
    pub fn new(repository: Arc<dyn OrderRepository>) -> Self {
        Self { repository }
    }

    /// Create `order` unless its id is taken.
    ///
    /// A duplicate id never overwrites the stored order.
    #[instrument(skip(self, order), fields(order_id = order.order_id))]
    pub async fn create(&self, order: Order) -> AppResult<Order> {
        order.validate()?;

        let order_id = order.order_id;
        let (stored, created) = self
            .repository
            .create_if_absent(order)
            .await
            .map_err(store_error)?;

        if !created {
            metrics::record_order("conflict");
            return Err(AppError::conflict(
                "order already exists",
                format!("order {order_id} already exists"),
            ));
        }

        metrics::record_order("created");
        info!(order_id, "Order created");
        Ok(stored)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, order_id: OrderId) -> AppResult<Order> {
        self.repository
            .get(order_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| missing(order_id))
    }

    pub async fn list(&self) -> AppResult<Vec<Order>> {
        self.repository.list().await.map_err(store_error)
    }

    #[instrument(skip(self, command), fields(order_id = command.order_id()))]
    pub async fn update(&self, command: UpdateOrderCommand) -> AppResult<Order> {
        let order_id = command.order_id();
        let updated = self
            .repository
            .update(command.into_order())
            .await
            .map_err(store_error)?
            .ok_or_else(|| missing(order_id))?;

        metrics::record_order("updated");
        info!(order_id, "Order updated");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, order_id: OrderId) -> AppResult<()> {
        if !self.repository.delete(order_id).await.map_err(store_error)? {
            return Err(missing(order_id));
        }

        metrics::record_order("deleted");
        info!(order_id, "Order deleted");
        Ok(())
    }
}

fn missing(order_id: OrderId) -> AppError {
    AppError::not_found("order not found", format!("no order with id {order_id}"))
}

fn store_error(err: StoreError) -> AppError {
    metrics::record_store_error("order");
    AppError::from(err)
}
