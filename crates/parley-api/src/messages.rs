use axum::{Json, extract::State, http::StatusCode};
use tracing::error;

use parley_types::models::MessageView;

use crate::AppState;

/// GET /messages: full history, oldest first, same shape as the
/// `load messages` replay.
pub async fn get_messages(
    State(state): State<AppState>,
) -> Result<Json<Vec<MessageView>>, StatusCode> {
    let messages = state.dispatcher.history().await.map_err(|e| {
        error!("GET /messages failed: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok(Json(messages))
}
