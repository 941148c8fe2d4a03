use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convertino_core::{
    load_config, validate_config, AdapterSet, Classifier, ConversionRegistry, ConversionService,
    DiskStorage, FileStore, JobQueue, RetryPolicy, SqliteFileStore, SqliteJobQueue, WorkerDeps,
    WorkerPool,
};
use convertino_server::api::create_router;
use convertino_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("CONVERTINO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Storage directories
    let storage = DiskStorage::new(&config.storage);
    storage
        .ensure_dirs()
        .await
        .context("Failed to create storage directories")?;
    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }
    }
    info!(
        "Storage: uploads in {:?}, converted files in {:?}",
        storage.uploads_dir(),
        storage.converted_dir()
    );

    // Create SQLite job queue
    let queue: Arc<dyn JobQueue> = Arc::new(
        SqliteJobQueue::new(&config.database.path, RetryPolicy::from(&config.queue))
            .context("Failed to create job queue")?,
    );
    info!("Job queue initialized");

    // Create SQLite file store
    let files: Arc<dyn FileStore> = Arc::new(
        SqliteFileStore::new(&config.database.path).context("Failed to create file store")?,
    );
    info!("File store initialized");

    // Converter adapters; missing tools only disable their conversions
    let adapters = AdapterSet::from_config(&config.converters);
    let unavailable = adapters.validate_all().await;
    if unavailable.is_empty() {
        info!("All converters available");
    } else {
        warn!(
            "{} converter(s) unavailable, jobs routed to them will fail",
            unavailable.len()
        );
    }

    let registry = Arc::new(ConversionRegistry::builtin());
    let classifier = Classifier::new(&config.classifier);

    let service = Arc::new(ConversionService::new(
        Arc::clone(&files),
        Arc::clone(&queue),
        storage.clone(),
        Arc::clone(&registry),
        classifier.clone(),
    ));

    // Start worker pool (recovers jobs left active by a previous run)
    let workers = Arc::new(WorkerPool::new(
        config.worker.clone(),
        WorkerDeps {
            queue,
            files,
            storage,
            registry,
            adapters,
            classifier,
        },
    ));
    workers.start().await;

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        service,
        Arc::clone(&workers),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let jobs in progress finish
    info!("Stopping worker pool...");
    workers.stop().await;

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
