//! Order relay
//!
//! Two-stage pipeline:
//! - Ingest: order queue (Redpanda) → keyed record store, idempotent upserts
//! - Notify: store change feed → notification topic, one message per new order
//! - Operational HTTP endpoints for health and metrics

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use api::{router, AppState};
use record_store::{ClickHouseConfig, ClickHouseStore, MemoryStore};
use redpanda::{RedpandaConfig, RedpandaPublisher, RedpandaQueue};
use relay_core::PipelineConfig;
use telemetry::init_tracing_from_env;
use worker::{Collaborators, SchedulerConfig, WorkerConfig, WorkerScheduler};

/// Where records and the change feed live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StoreBackend {
    #[default]
    Clickhouse,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clickhouse" => Ok(Self::Clickhouse),
            "memory" => Ok(Self::Memory),
            other => bail!("Unknown STORE_BACKEND: {}", other),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    store_backend: StoreBackend,

    /// Seconds between collaborator health probes
    #[serde(default = "default_health_interval_secs")]
    health_interval_secs: u64,

    #[serde(default)]
    pipeline: PipelineConfig,

    #[serde(default)]
    redpanda: RedpandaConfig,

    #[serde(default)]
    clickhouse: ClickHouseConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_health_interval_secs() -> u64 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            store_backend: StoreBackend::default(),
            health_interval_secs: default_health_interval_secs(),
            pipeline: PipelineConfig::default(),
            redpanda: RedpandaConfig::default(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing_from_env();

    if !install_crypto_provider() {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting order relay v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    info!(
        brokers = ?config.redpanda.brokers,
        queue_topic = %config.redpanda.queue.topic,
        topic_id = %config.pipeline.topic_id,
        store_backend = ?config.store_backend,
        store_table = %config.pipeline.store_table,
        id_field = %config.pipeline.id_field,
        "Loaded configuration"
    );

    let missing = redpanda::health::verify_topics(
        &config.redpanda,
        &[
            config.redpanda.queue.topic.as_str(),
            config.redpanda.queue.dead_letter_topic.as_str(),
            config.pipeline.topic_id.as_str(),
        ],
    )
    .await;
    if !missing.is_empty() {
        warn!(topics = ?missing, "Redpanda topics missing or unreachable");
    }

    // Clients are constructed once and shared by every batch.
    let queue = Arc::new(RedpandaQueue::new(config.redpanda.clone()));
    let publisher = Arc::new(RedpandaPublisher::new(
        config.redpanda.clone(),
        config.pipeline.topic_id.clone(),
    ));

    let collaborators = match config.store_backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store; records are lost on restart");
            let store = Arc::new(MemoryStore::new(config.pipeline.store_table.clone()));
            Collaborators {
                queue,
                store: store.clone(),
                feed: store,
                publisher,
            }
        }
        StoreBackend::Clickhouse => {
            let store = Arc::new(
                ClickHouseStore::open(&config.clickhouse, &config.pipeline.store_table)
                    .await
                    .context("Failed to open ClickHouse store")?,
            );
            Collaborators {
                queue,
                store: store.clone(),
                feed: store,
                publisher,
            }
        }
    };

    let scheduler = Arc::new(WorkerScheduler::new(
        SchedulerConfig {
            worker: WorkerConfig::from_pipeline(&config.pipeline),
            id_field: config.pipeline.id_field.clone(),
            health_interval: Duration::from_secs(config.health_interval_secs.max(1)),
        },
        collaborators,
    ));

    // Startup health check
    scheduler.refresh_health().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handles = scheduler.clone().start(shutdown_rx);

    let app = router(AppState::new(&config.pipeline));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    // Workers finish their current batch before stopping.
    let _ = shutdown_tx.send(true);
    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!("Worker task failed: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Selects ring as the rustls provider; rustls 0.23+ needs one before any
/// TLS use. Returns false when a provider was already installed.
fn install_crypto_provider() -> bool {
    rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok()
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("RELAY")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    config
        .pipeline
        .validate()
        .context("Invalid pipeline configuration")?;

    Ok(config)
}

/// Flat environment variables on top of the layered configuration.
///
/// The config crate's nested parsing doesn't work reliably with underscored
/// field names, so the common settings are read explicitly.
fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    config
        .pipeline
        .apply_overrides(&lookup)
        .context("Invalid pipeline configuration")?;

    if let Some(host) = lookup("RELAY_HOST") {
        config.host = host;
    }
    if let Some(port) = lookup("RELAY_PORT") {
        config.port = port.trim().parse().context("RELAY_PORT is not a port number")?;
    }
    if let Some(backend) = lookup("STORE_BACKEND") {
        config.store_backend = backend.parse()?;
    }

    let redpanda = &mut config.redpanda;
    if let Some(brokers) = lookup("RELAY_REDPANDA_BROKERS") {
        redpanda.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(username) = lookup("RELAY_REDPANDA_SASL_USERNAME") {
        redpanda.sasl_username = Some(username);
    }
    if let Some(password) = lookup("RELAY_REDPANDA_SASL_PASSWORD") {
        redpanda.sasl_password = Some(password);
    }
    if let Some(topic) = lookup("RELAY_QUEUE_TOPIC") {
        redpanda.queue.topic = topic;
    }
    if let Some(topic) = lookup("RELAY_DEAD_LETTER_TOPIC") {
        redpanda.queue.dead_letter_topic = topic;
    }
    if let Some(count) = lookup("MAX_RECEIVE_COUNT") {
        redpanda.queue.max_receive_count = count
            .trim()
            .parse()
            .context("MAX_RECEIVE_COUNT is not a number")?;
    }

    config
        .clickhouse
        .apply_overrides(&lookup)
        .context("Invalid ClickHouse configuration")?;

    Ok(())
}

/// Graceful shutdown signal handler.
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
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
