//! Redpanda adapters for the order relay: the inbound queue the ingest
//! stage reads from, and the notification topic the change feed stage
//! publishes to.

pub mod config;
pub mod connection;
pub mod delivery;
pub mod health;
pub mod producer;
pub mod publisher;
pub mod queue;

pub use config::*;
pub use delivery::DeliveryTracker;
pub use producer::TopicProducer;
pub use publisher::*;
pub use queue::*;
