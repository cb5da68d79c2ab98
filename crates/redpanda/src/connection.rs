//! Broker connections shared by the queue and topic adapters.

use crate::config::RedpandaConfig;
use rskafka::client::{
    partition::{Compression, PartitionClient, UnknownTopicHandling},
    Client, ClientBuilder, Credentials, SaslConfig,
};
use std::sync::Arc;
use tracing::info;

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Connects to the cluster, with TLS and SASL when credentials are set.
pub async fn connect(config: &RedpandaConfig) -> Result<Client, String> {
    let mut builder = ClientBuilder::new(vec![config.broker_string()]);

    if let Some((username, password)) = config.credentials() {
        builder = builder
            .tls_config(create_tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                username.to_string(),
                password.to_string(),
            )));
    }

    builder
        .build()
        .await
        .map_err(|e| format!("Failed to connect to Redpanda: {}", e))
}

/// Connects and opens a client for one topic partition.
pub async fn partition_client(
    config: &RedpandaConfig,
    topic: &str,
    partition: i32,
) -> Result<Arc<PartitionClient>, String> {
    let client = connect(config).await?;

    let partition_client = client
        .partition_client(topic.to_string(), partition, UnknownTopicHandling::Error)
        .await
        .map_err(|e| format!("Failed to get partition client for {}: {}", topic, e))?;

    info!(topic = %topic, partition, "Opened Redpanda partition client");
    Ok(Arc::new(partition_client))
}

/// Maps the configured compression name.
pub fn compression(name: &str) -> Compression {
    match name {
        "gzip" => Compression::Gzip,
        "snappy" => Compression::Snappy,
        "lz4" => Compression::Lz4,
        "zstd" => Compression::Zstd,
        _ => Compression::NoCompression,
    }
}
