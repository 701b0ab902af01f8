use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use tracing::instrument;

use super::extract::{ApiJson, ApiPath};
use crate::error::AppResult;
use crate::gate::Identity;
use crate::models::{MessageResponse, Order, OrderId, OrdersResponse, UpdateOrderCommand};
use crate::state::AppState;

/// List all orders, ordered by id.
///
/// ```json
/// { "status": 200, "data": [ { "order_id": 1, ... } ] }
/// ```
#[instrument(skip(state))]
pub async fn list_orders(State(state): State<AppState>) -> AppResult<Json<OrdersResponse>> {
    let data = state.orders.list().await?;

    Ok(Json(OrdersResponse {
        status: StatusCode::OK.as_u16(),
        data,
    }))
}

/// Get one order by id.
#[instrument(skip(state))]
pub async fn get_order(
    State(state): State<AppState>,
    ApiPath(order_id): ApiPath<OrderId>,
) -> AppResult<Json<Order>> {
    Ok(Json(state.orders.get(order_id).await?))
}

/// Create an order. A taken id answers 409 and leaves the stored order as is.
#[instrument(
    skip(state, identity, order),
    fields(order_id = order.order_id, username = identity.as_ref().map(|Extension(i)| i.username.as_str()))
)]
pub async fn create_order(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    ApiJson(order): ApiJson<Order>,
) -> AppResult<(StatusCode, Json<Order>)> {
    let created = state.orders.create(order).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Replace an order. The body id must equal the path id.
#[instrument(skip(state, order))]
pub async fn update_order(
    State(state): State<AppState>,
    ApiPath(order_id): ApiPath<OrderId>,
    ApiJson(order): ApiJson<Order>,
) -> AppResult<Json<MessageResponse>> {
    let command = UpdateOrderCommand::reconcile(order_id, order)?;
    state.orders.update(command).await?;

    Ok(Json(MessageResponse::new(format!(
        "order {order_id} updated"
    ))))
}

/// Delete an order by id.
#[instrument(skip(state))]
pub async fn delete_order(
    State(state): State<AppState>,
    ApiPath(order_id): ApiPath<OrderId>,
) -> AppResult<Json<MessageResponse>> {
    state.orders.delete(order_id).await?;

    Ok(Json(MessageResponse::new(format!(
        "order {order_id} deleted"
    ))))
}
