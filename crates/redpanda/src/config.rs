//! Redpanda configuration.

use serde::{Deserialize, Serialize};

/// Where a fresh queue consumer starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    /// Replay everything still retained on the topic
    #[default]
    Earliest,
    /// Only messages produced after startup
    Latest,
}

/// Connection settings shared by the queue and the notification topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    pub brokers: Vec<String>,
    /// SASL username (enables TLS + SCRAM-SHA-256 when set with a password)
    #[serde(default)]
    pub sasl_username: Option<String>,
    /// SASL password
    #[serde(default)]
    pub sasl_password: Option<String>,
    /// Compression type for produced records (none, gzip, snappy, lz4, zstd)
    #[serde(default = "default_compression")]
    pub compression: String,
    /// Inbound order queue
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Inbound queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Topic producers send orders to
    #[serde(default = "default_queue_topic")]
    pub topic: String,
    /// Topic exhausted messages are moved to
    #[serde(default = "default_dead_letter_topic")]
    pub dead_letter_topic: String,
    /// Partition this consumer owns
    #[serde(default)]
    pub partition: i32,
    /// Deliveries allowed before a message is dead-lettered
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,
    /// Longest time a fetch waits for new records, in milliseconds
    #[serde(default = "default_fetch_wait_ms")]
    pub fetch_wait_ms: u64,
    /// Upper bound for a single fetch response, in bytes
    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: i32,
    #[serde(default)]
    pub start_offset: StartOffset,
}

fn default_compression() -> String {
    "lz4".to_string()
}

fn default_queue_topic() -> String {
    "order-events".to_string()
}

fn default_dead_letter_topic() -> String {
    "order-events-dlq".to_string()
}

fn default_max_receive_count() -> u32 {
    5
}

fn default_fetch_wait_ms() -> u64 {
    1000
}

fn default_fetch_max_bytes() -> i32 {
    4 * 1024 * 1024
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            sasl_username: None,
            sasl_password: None,
            compression: default_compression(),
            queue: QueueConfig::default(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topic: default_queue_topic(),
            dead_letter_topic: default_dead_letter_topic(),
            partition: 0,
            max_receive_count: default_max_receive_count(),
            fetch_wait_ms: default_fetch_wait_ms(),
            fetch_max_bytes: default_fetch_max_bytes(),
            start_offset: StartOffset::default(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// SASL credentials, if both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.sasl_username, &self.sasl_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}
