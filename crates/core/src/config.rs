//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Settings shared by both consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Store collection records are written to (`STORE_TABLE`)
    #[serde(default = "default_store_table")]
    pub store_table: String,
    /// Payload field holding the idempotency key (`ID_FIELD`)
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Destination topic for notifications (`TOPIC_ID`, required)
    #[serde(default)]
    pub topic_id: String,
    /// Maximum messages or change events per batch (`BATCH_SIZE`)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Time budget for one batch invocation (`BATCH_TIMEOUT_MS`)
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_store_table() -> String {
    "orders".to_string()
}

fn default_id_field() -> String {
    "orderID".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_timeout_ms() -> u64 {
    30_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_table: default_store_table(),
            id_field: default_id_field(),
            topic_id: String::new(),
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

impl PipelineConfig {
    /// Loads from process environment and validates.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads from an arbitrary variable lookup and validates.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `STORE_TABLE`, `ID_FIELD`, `TOPIC_ID`, `BATCH_SIZE` and
    /// `BATCH_TIMEOUT_MS` from `lookup` on top of the current values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(table) = lookup("STORE_TABLE") {
            self.store_table = table;
        }
        if let Some(field) = lookup("ID_FIELD") {
            self.id_field = field;
        }
        if let Some(topic) = lookup("TOPIC_ID") {
            self.topic_id = topic;
        }
        if let Some(size) = lookup("BATCH_SIZE") {
            self.batch_size = size
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("BATCH_SIZE is not a number: {}", size)))?;
        }
        if let Some(ms) = lookup("BATCH_TIMEOUT_MS") {
            self.batch_timeout_ms = ms.trim().parse().map_err(|_| {
                Error::config(format!("BATCH_TIMEOUT_MS is not a number: {}", ms))
            })?;
        }
        Ok(())
    }

    /// Refuses configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.topic_id.trim().is_empty() {
            return Err(Error::config("TOPIC_ID is required"));
        }
        if self.store_table.trim().is_empty() {
            return Err(Error::config("STORE_TABLE must not be empty"));
        }
        if self.id_field.is_empty() {
            return Err(Error::config("ID_FIELD must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("BATCH_SIZE must be at least 1"));
        }
        if self.batch_timeout_ms == 0 {
            return Err(Error::config("BATCH_TIMEOUT_MS must be at least 1"));
        }
        Ok(())
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}
