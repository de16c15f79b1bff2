// Main entry point for the provisioning controller

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use controller_core::domains::jobs::JobEngine;
use controller_core::kernel::scheduled_tasks::start_scheduler;
use controller_core::kernel::{
    DeployBatcher, NdfcFabricApi, ServerDeps, ServiceHost, SyncWorker, SyncWorkerConfig,
    ValkeyCache,
};
use controller_core::server::build_app;
use controller_core::Config;
use ndfc::{NdfcClient, NdfcOptions};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so DB_LOG_SQL can shape the default filter
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    let default_filter = if config.database.log_sql {
        "info,controller_core=debug,sqlx=debug"
    } else {
        "info,controller_core=debug,sqlx=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting compute fabric provisioning controller");
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_open_conns)
        .min_connections(config.database.max_idle_conns)
        .max_lifetime(config.database.conn_max_lifetime)
        .connect(&config.database.url())
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Connect to cache
    let cache = Arc::new(
        ValkeyCache::connect(&config.cache.url())
            .await
            .context("Failed to connect to Valkey")?,
    );

    // Build the fabric manager client
    let mut options = NdfcOptions::new(config.fabric.base_url.clone());
    options.username = config.fabric.username.clone();
    options.password = config.fabric.password.clone();
    options.api_key = config.fabric.api_key.clone();
    options.insecure = config.fabric.insecure;
    let fabric_api = Arc::new(NdfcFabricApi::new(Arc::new(
        NdfcClient::new(options).context("Failed to build NDFC client")?,
    )));

    let deps = ServerDeps::new(
        pool,
        cache,
        fabric_api.clone(),
        DeployBatcher::new(fabric_api),
        config.fabric.clone(),
        config.jobs.clone(),
    );

    // Background services
    let mut host = ServiceHost::new();
    if config.fabric.sync_interval_hours > 0 {
        let interval = Duration::from_secs(config.fabric.sync_interval_hours * 3600);
        host = host.with_service(SyncWorker::new(
            deps.clone(),
            SyncWorkerConfig::new(config.fabric.fabric_name.clone(), interval),
        ));
    } else {
        tracing::info!("Inventory sync disabled (ND_SYNC_INTERVAL_HOURS=0)");
    }
    let shutdown = host.cancellation_token();

    let mut scheduler = start_scheduler(JobEngine::new(deps.clone()))
        .await
        .context("Failed to start scheduled tasks")?;

    // Start server
    let app = build_app(deps);
    let addr = format!("0.0.0.0:{}", config.server_port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.server_port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    });

    // Blocks until SIGINT/SIGTERM, then drains services and the server.
    host.run_until_shutdown().await?;
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown failed: {}", e);
    }
    server.await.context("Server task failed")?.context("Server error")?;

    Ok(())
}
