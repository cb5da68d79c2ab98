//! Response bodies.

use serde::{Deserialize, Serialize};
use telemetry::ComponentHealthReport;

use crate::state::PipelineInfo;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub queue_connected: bool,
    pub store_connected: bool,
    pub topic_connected: bool,
    pub messages_in_flight: u64,
    pub feed_checkpoint: u64,
    pub uptime_secs: u64,
    pub pipeline: PipelineInfo,
    pub components: Vec<ComponentHealthReport>,
}

/// Body for readiness and liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub status: String,
}

impl ProbeResponse {
    pub fn new(ok: bool) -> Self {
        Self {
            status: if ok { "ok" } else { "unavailable" }.to_string(),
        }
    }
}
