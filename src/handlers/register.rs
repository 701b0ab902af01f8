use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::instrument;

use super::extract::ApiJson;
use crate::error::AppResult;
use crate::models::{MessageResponse, RegisterRequest};
use crate::state::AppState;

/// Register a username and secret.
///
/// Accepts `{"username": "...", "secret": "..."}` (or `password` in place of
/// `secret`). Answers 201, or 400 when the username is taken.
#[instrument(skip(state, request), fields(username = %request.username))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    state.registration.register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("user registered")),
    ))
}
