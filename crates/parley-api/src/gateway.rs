use axum::{
    Json,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};

use parley_gateway::connection;
use parley_types::api::HealthResponse;

use crate::AppState;

/// GET /gateway: upgrade to the relay WebSocket.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        connections: state.dispatcher.connection_count().await,
    })
}
