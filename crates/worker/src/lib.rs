//! Pipeline workers for the order relay.
//!
//! - Ingest (queue → store)
//! - Change feed (store → notification topic)
//! - Health monitor (queue, store and topic probes)

pub mod change_feed;
pub mod ingest;
pub mod runner;
pub mod scheduler;

pub use change_feed::ChangeFeedConsumer;
pub use ingest::IngestConsumer;
pub use runner::*;
pub use scheduler::*;
