//! Redelivery bookkeeping for a log-based queue.
//!
//! A Kafka partition only knows offsets, so the queue semantics the
//! pipeline relies on live here: each handed-out message is tracked until
//! it is acknowledged, released messages are handed out again with a higher
//! receive count, and messages past `max_receive_count` are surrendered for
//! dead-lettering. The commit offset never passes a message that is still
//! outstanding.

use relay_core::{AckToken, RawMessage};
use std::collections::BTreeMap;

/// A message the tracker is responsible for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub offset: i64,
    pub body: Vec<u8>,
    pub receive_count: u32,
}

impl Pending {
    fn to_message(&self) -> RawMessage {
        RawMessage::new(self.body.clone(), token_for(self.offset), self.receive_count)
    }
}

/// Encodes an offset as an acknowledgment token.
pub fn token_for(offset: i64) -> AckToken {
    AckToken::new(offset.to_string())
}

/// Decodes a token issued by [`token_for`].
pub fn offset_of(token: &AckToken) -> Option<i64> {
    token.as_str().parse().ok()
}

/// Messages chosen for redelivery, and those that ran out of attempts.
#[derive(Debug, Default)]
pub struct Redeliveries {
    pub messages: Vec<RawMessage>,
    pub exhausted: Vec<Pending>,
}

/// Tracks outstanding deliveries for one partition.
#[derive(Debug)]
pub struct DeliveryTracker {
    max_receive_count: u32,
    next_fetch: i64,
    in_flight: BTreeMap<i64, Pending>,
    released: BTreeMap<i64, Pending>,
}

impl DeliveryTracker {
    pub fn new(start_offset: i64, max_receive_count: u32) -> Self {
        Self {
            max_receive_count: max_receive_count.max(1),
            next_fetch: start_offset,
            in_flight: BTreeMap::new(),
            released: BTreeMap::new(),
        }
    }

    /// Offset the next broker fetch should start at.
    pub fn next_fetch_offset(&self) -> i64 {
        self.next_fetch
    }

    /// Hands out up to `max` released messages, oldest first.
    ///
    /// A message whose next delivery would exceed `max_receive_count` is
    /// removed and returned in `exhausted` instead.
    pub fn take_redeliveries(&mut self, max: usize) -> Redeliveries {
        let mut out = Redeliveries::default();

        while out.messages.len() < max {
            let Some((offset, mut pending)) = self.released.pop_first() else {
                break;
            };

            if pending.receive_count >= self.max_receive_count {
                out.exhausted.push(pending);
                continue;
            }

            pending.receive_count += 1;
            out.messages.push(pending.to_message());
            self.in_flight.insert(offset, pending);
        }

        out
    }

    /// Starts tracking a record fetched from the broker.
    ///
    /// Offsets at or behind the fetch position were already seen and are
    /// ignored.
    pub fn admit(&mut self, offset: i64, body: Vec<u8>) -> Option<RawMessage> {
        if offset < self.next_fetch {
            return None;
        }
        self.next_fetch = offset + 1;

        let pending = Pending {
            offset,
            body,
            receive_count: 1,
        };
        let message = pending.to_message();
        self.in_flight.insert(offset, pending);
        Some(message)
    }

    /// Moves the fetch position past a record that carries no message.
    pub fn skip(&mut self, offset: i64) {
        self.next_fetch = self.next_fetch.max(offset + 1);
    }

    /// Forgets a delivered message. Returns false for unknown tokens.
    pub fn acknowledge(&mut self, token: &AckToken) -> bool {
        offset_of(token)
            .and_then(|offset| self.in_flight.remove(&offset))
            .is_some()
    }

    /// Makes a delivered message available for redelivery.
    pub fn release(&mut self, token: &AckToken) -> bool {
        let Some(offset) = offset_of(token) else {
            return false;
        };
        match self.in_flight.remove(&offset) {
            Some(pending) => {
                self.released.insert(offset, pending);
                true
            }
            None => false,
        }
    }

    /// Puts an exhausted message back, e.g. after dead-lettering failed.
    pub fn restore(&mut self, pending: Pending) {
        self.released.insert(pending.offset, pending);
    }

    /// Lowest offset that is safe to commit: everything before it is done.
    pub fn commit_offset(&self) -> i64 {
        let oldest_in_flight = self.in_flight.keys().next().copied();
        let oldest_released = self.released.keys().next().copied();

        [oldest_in_flight, oldest_released]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(self.next_fetch)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn awaiting_redelivery(&self) -> usize {
        self.released.len()
    }
}
