pub mod files;
pub mod gateway;
pub mod messages;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use parley_gateway::dispatcher::Dispatcher;

/// Room for multipart boundaries and headers on top of the file itself, so
/// the per-file limit in `files::upload_file` is the one that answers 413.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub dispatcher: Dispatcher,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

/// All HTTP and WebSocket routes. Anything unmatched is looked up in `public_dir`.
pub fn router(state: AppState, public_dir: &Path) -> Router {
    let uploads = ServeDir::new(&state.upload_dir);
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes + MULTIPART_OVERHEAD);

    Router::new()
        .route("/gateway", get(gateway::ws_upgrade))
        .route("/health", get(gateway::health))
        .route("/messages", get(messages::get_messages))
        .route("/upload", post(files::upload_file))
        .route_service("/private", ServeFile::new(public_dir.join("private.html")))
        .nest_service("/uploads", uploads)
        .fallback_service(ServeDir::new(public_dir))
        .layer(body_limit)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
