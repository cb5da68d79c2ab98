//! Telemetry for the order relay: structured logging setup, in-process
//! metrics, and health of the queue, store and topic collaborators.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
