//! Evidence Locker - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use evidence_locker_backend::{
    api::{self, AppState},
    config::Config,
    db,
    error::Result,
    repositories::Repositories,
    storage::filesystem::FilesystemStorage,
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    telemetry::init_tracing(&config.log_level);
    tracing::info!(config = ?config, "Starting Evidence Locker");

    // Connect to database
    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to database");

    // Run migrations
    db::run_migrations(&db_pool).await?;
    tracing::info!("Database migrations complete");

    // Encrypted blob storage
    tokio::fs::create_dir_all(&config.storage_path).await?;
    let storage = Arc::new(FilesystemStorage::new(&config.storage_path));

    let addr: SocketAddr = config.bind_address.parse()?;
    let state = Arc::new(
        AppState::new(config, Repositories::postgres(db_pool.clone()), storage).with_db(db_pool),
    );
    let app = api::routes::create_router(state);

    // Start server
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Evidence Locker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
}
