//! Agency registry server
//!
//! Keeps a directory of independently deployed agents. Agents register by
//! address; the registry fetches and stores their descriptor and reports
//! their liveness on every read.

use std::path::PathBuf;
use std::sync::Arc;

use agency_framework::prelude::{
    HealthProber, HttpDescriptorFetcher, RegistryConfig, RegistryService, StorageBackend,
    StorageConfig, SurrealRegistryStore,
};
use anyhow::Result;
use axum::Router;
use clap::Parser;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod api;

/// Command-line arguments for the registry server
#[derive(Parser, Debug)]
#[clap(name = "agency-api", about = "Agent registry service for Agency")]
struct Args {
    /// Host to bind to
    #[clap(long, env = "REGISTRY_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[clap(short, long, env = "REGISTRY_PORT", default_value = "6000")]
    port: u16,

    /// Storage backend: `file` or `memory`
    #[clap(long, env = "REGISTRY_STORAGE", default_value = "file")]
    storage: StorageBackend,

    /// Path of the SurrealDB data file (file backend only)
    #[clap(long, env = "REGISTRY_DB_PATH", default_value = "./data/registry.db")]
    db_path: PathBuf,

    /// SurrealDB namespace
    #[clap(long, default_value = "agency")]
    namespace: String,

    /// SurrealDB database
    #[clap(long, default_value = "registry")]
    database: String,

    /// Timeout for fetching a descriptor during registration, in seconds
    #[clap(long, default_value = "10")]
    fetch_timeout: u64,

    /// Timeout for a health probe, in seconds
    #[clap(long, default_value = "5")]
    probe_timeout: u64,

    /// Log filter used when RUST_LOG is unset
    #[clap(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> RegistryConfig {
        let path = match self.storage {
            StorageBackend::SurrealFile => Some(self.db_path),
            StorageBackend::SurrealMemory => None,
        };
        RegistryConfig {
            host: self.host,
            port: self.port,
            log_level: self.log_level,
            storage: StorageConfig {
                backend: self.storage,
                path,
                namespace: self.namespace,
                database: self.database,
            },
            fetch_timeout_seconds: self.fetch_timeout,
            probe_timeout_seconds: self.probe_timeout,
            ..RegistryConfig::default()
        }
    }
}

/// Wire the registry service and its routes from configuration
async fn build_app(config: &RegistryConfig) -> Result<Router> {
    let store = SurrealRegistryStore::new(&config.storage).await?;

    let client = reqwest::Client::new();
    let fetcher = Arc::new(HttpDescriptorFetcher::with_client(
        client.clone(),
        &config.descriptor_path,
        config.fetch_timeout(),
    ));
    let probe_fetcher = Arc::new(HttpDescriptorFetcher::with_client(
        client,
        &config.descriptor_path,
        config.probe_timeout(),
    ));
    let prober = HealthProber::new(probe_fetcher, config.probe_timeout());
    let service = RegistryService::new(Arc::new(store), fetcher, prober);

    Ok(Router::new()
        .merge(api::agents::registry_routes(api::agents::RegistryApiState {
            service,
        }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let config = Args::parse().into_config();

    // Setup tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Agency registry...");
    info!("Storage: {:?}", config.storage.backend);
    if let Some(path) = &config.storage.path {
        info!("Data file: {:?}", path);
    }

    let app = build_app(&config).await?;

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    info!("Binding to address: {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Registry listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Registry stopped");
    Ok(())
}
