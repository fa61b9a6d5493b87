mod config;

use std::sync::Arc;

use tracing::info;

use parley_api::AppStateInner;
use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;
use parley_gateway::rooms::RoomTable;
use parley_gateway::sessions::SessionRegistry;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Relay owns the in-memory session and room state for its whole lifetime
    let dispatcher = Dispatcher::new(db, SessionRegistry::new(), RoomTable::new(), config.utc_offset);

    let state = Arc::new(AppStateInner {
        dispatcher,
        upload_dir: config.upload_dir.clone(),
        max_upload_bytes: config.max_upload_bytes,
    });
    let app = parley_api::router(state, &config.public_dir);

    let addr = config.bind_addr()?;
    info!("Parley relay listening on {}", addr);
    info!(
        "Serving {} and uploads from {}",
        config.public_dir.display(),
        config.upload_dir.display()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("No SIGTERM handler ({}), waiting for Ctrl+C", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
