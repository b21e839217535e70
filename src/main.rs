use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use tally::analytics::{AnalyticsService, BenchmarkService, SnapshotService, ViewTracker};
use tally::api::{create_api_router, AppState};
use tally::config::{Config, DatabaseBackend};
use tally::storage::{CachedStorage, PostgresStorage, SqliteStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(
                SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database.url);
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections)
                    .await?,
            )
        }
    };

    // Initialize database
    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    // Wrap storage with a read-through cache for business lookups
    let storage: Arc<dyn Storage> = Arc::new(CachedStorage::new(Arc::clone(&storage), 10_000));

    // Start the view tracker and its background flush task
    let tracker = ViewTracker::from_config(&config.analytics.tracker);
    let flush_handle = tracker.start_flush_task(
        config.analytics.tracker.flush_interval_secs,
        Arc::clone(&storage),
    );

    let state = Arc::new(AppState {
        storage: Arc::clone(&storage),
        analytics: AnalyticsService::new(
            Arc::clone(&storage),
            config.analytics.limits.clone(),
        ),
        snapshots: SnapshotService::new(
            Arc::clone(&storage),
            config.analytics.snapshot_retention_days,
        ),
        benchmark: BenchmarkService::new(
            Arc::clone(&storage),
            config.analytics.benchmark_min_peers,
            config.analytics.benchmark_window_days,
        ),
        tracker,
        limits: config.analytics.limits.clone(),
    });

    let router = create_api_router(Arc::clone(&state));

    // Start API server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Analytics server listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain buffered view events before exiting
    info!("Shutting down, flushing buffered view events...");
    state.tracker.shutdown().await;
    flush_handle.await?;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
}
