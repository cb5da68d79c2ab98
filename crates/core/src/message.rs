//! Queue delivery units.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle a queue hands out with each delivery.
///
/// Only the queue that issued a token can interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AckToken(String);

impl AckToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AckToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery metadata attached by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    /// Approximate number of times this message has been handed out,
    /// including the current delivery.
    pub receive_count: u32,
    pub token: AckToken,
}

/// A single message as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub body: Vec<u8>,
    pub delivery: DeliveryInfo,
}

impl RawMessage {
    pub fn new(body: impl Into<Vec<u8>>, token: AckToken, receive_count: u32) -> Self {
        Self {
            body: body.into(),
            delivery: DeliveryInfo {
                receive_count,
                token,
            },
        }
    }

    pub fn token(&self) -> &AckToken {
        &self.delivery.token
    }

    pub fn receive_count(&self) -> u32 {
        self.delivery.receive_count
    }

    /// Whether the queue has handed this message out before.
    pub fn is_redelivery(&self) -> bool {
        self.delivery.receive_count > 1
    }
}
