//! Unified error types for the relay pipeline.
//!
//! Error codes:
//! - DECODE_001: body is not a structured payload (recovered, never surfaced)
//! - STORE_001: record upsert failed
//! - PUBLISH_001: notification publish failed
//! - CONFIG_001: required configuration missing or invalid
//! - QUEUE_001: queue transport failure
//! - FEED_001: change feed read failure
//! - EVENT_001: change event cannot be turned into a notification
//! - TIMEOUT_001: batch exceeded its time budget

use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the relay pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("[DECODE_001] body is not a structured payload: {0}")]
    Decode(String),

    #[error("[STORE_001] failed to write record {key}: {message}")]
    Write { key: String, message: String },

    #[error("[PUBLISH_001] failed to publish notification for {key}: {message}")]
    Publish { key: String, message: String },

    #[error("[CONFIG_001] {0}")]
    Config(String),

    #[error("[QUEUE_001] {0}")]
    Queue(String),

    #[error("[FEED_001] {0}")]
    Feed(String),

    #[error("[EVENT_001] created event for {0} carries no new image")]
    MissingImage(String),

    #[error("[TIMEOUT_001] batch exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn write(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Write {
            key: key.into(),
            message: msg.into(),
        }
    }

    pub fn publish(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Publish {
            key: key.into(),
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    pub fn feed(msg: impl Into<String>) -> Self {
        Self::Feed(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Decode(_) => Some("DECODE_001"),
            Self::Write { .. } => Some("STORE_001"),
            Self::Publish { .. } => Some("PUBLISH_001"),
            Self::Config(_) => Some("CONFIG_001"),
            Self::Queue(_) => Some("QUEUE_001"),
            Self::Feed(_) => Some("FEED_001"),
            Self::MissingImage(_) => Some("EVENT_001"),
            Self::Timeout(_) => Some("TIMEOUT_001"),
            Self::Serialization(_) | Self::Internal(_) => None,
        }
    }

    /// Whether redelivering the same unit of work may succeed.
    ///
    /// Transport failures are transient; malformed events and bad
    /// configuration fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Write { .. }
                | Self::Publish { .. }
                | Self::Queue(_)
                | Self::Feed(_)
                | Self::Timeout(_)
        )
    }
}
