//! Application state shared across handlers.

use chrono::{DateTime, Utc};
use relay_core::PipelineConfig;
use std::sync::Arc;

/// Pipeline settings reported by `/health`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PipelineInfo {
    pub store_table: String,
    pub id_field: String,
    pub topic_id: String,
}

impl From<&PipelineConfig> for PipelineInfo {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            store_table: config.store_table.clone(),
            id_field: config.id_field.clone(),
            topic_id: config.topic_id.clone(),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PipelineInfo>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            pipeline: Arc::new(PipelineInfo::from(config)),
            started_at: Utc::now(),
        }
    }

    /// Whole seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
