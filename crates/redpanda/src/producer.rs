//! Shared topic producer used for notifications and dead letters.

use crate::config::RedpandaConfig;
use crate::connection::{compression, partition_client};
use rskafka::client::partition::{Compression, PartitionClient};
use rskafka::record::Record;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Produces to partition 0 of one topic, reconnecting lazily.
pub struct TopicProducer {
    config: RedpandaConfig,
    topic: String,
    compression: Compression,
    client: RwLock<Option<Arc<PartitionClient>>>,
}

impl TopicProducer {
    pub fn new(config: RedpandaConfig, topic: impl Into<String>) -> Self {
        let compression = compression(&config.compression);
        Self {
            config,
            topic: topic.into(),
            compression,
            client: RwLock::new(None),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn get_client(&self) -> Result<Arc<PartitionClient>, String> {
        {
            let client = self.client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let client = partition_client(&self.config, &self.topic, 0).await?;

        {
            let mut guard = self.client.write().await;
            *guard = Some(client.clone());
        }

        Ok(client)
    }

    /// Produces records and returns their offsets.
    ///
    /// A failed produce drops the cached client so the next call reconnects.
    pub async fn send(&self, records: Vec<Record>) -> Result<Vec<i64>, String> {
        let count = records.len();
        let client = self.get_client().await?;

        match client.produce(records, self.compression).await {
            Ok(offsets) => {
                debug!(topic = %self.topic, count, "Produced records");
                Ok(offsets)
            }
            Err(e) => {
                self.reset_connection().await;
                Err(format!("Failed to produce to {}: {}", self.topic, e))
            }
        }
    }

    /// Drops the cached connection.
    pub async fn reset_connection(&self) {
        let mut client = self.client.write().await;
        if client.take().is_some() {
            info!(topic = %self.topic, "Producer connection reset");
        }
    }

    /// Checks the topic is reachable.
    pub async fn health_check(&self) -> bool {
        self.get_client().await.is_ok()
    }
}
