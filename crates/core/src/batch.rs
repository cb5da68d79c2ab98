//! Per-item batch outcomes.
//!
//! A batch never fails as a whole because one item failed: every item gets
//! its own outcome and the caller decides what to acknowledge.

use crate::error::Error;

/// Outcome of a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    /// Item was handled and may be acknowledged.
    Processed,
    /// Item needed no work (e.g. a non-creation change event) and may be
    /// acknowledged.
    Ignored,
    /// Item failed and must be left for redelivery.
    Failed {
        code: Option<&'static str>,
        message: String,
        retryable: bool,
    },
}

impl ItemStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Outcome of one item, tagged with the identifier the caller acknowledges by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome<I> {
    pub id: I,
    pub status: ItemStatus,
}

/// Collected outcomes of a batch, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult<I> {
    items: Vec<ItemOutcome<I>>,
}

impl<I> Default for BatchResult<I> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<I> BatchResult<I> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn processed(&mut self, id: I) {
        self.items.push(ItemOutcome {
            id,
            status: ItemStatus::Processed,
        });
    }

    pub fn ignored(&mut self, id: I) {
        self.items.push(ItemOutcome {
            id,
            status: ItemStatus::Ignored,
        });
    }

    pub fn failed(&mut self, id: I, error: &Error) {
        self.items.push(ItemOutcome {
            id,
            status: ItemStatus::Failed {
                code: error.error_code(),
                message: error.to_string(),
                retryable: error.is_retryable(),
            },
        });
    }

    pub fn items(&self) -> &[ItemOutcome<I>] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.items.iter().filter(|i| i.status.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.items.iter().all(|i| i.status.is_success())
    }

    /// Identifiers of items that may be acknowledged.
    pub fn succeeded(&self) -> impl Iterator<Item = &I> {
        self.items
            .iter()
            .filter(|i| i.status.is_success())
            .map(|i| &i.id)
    }

    /// Identifiers of items that must be redelivered.
    pub fn failed_ids(&self) -> impl Iterator<Item = &I> {
        self.items
            .iter()
            .filter(|i| !i.status.is_success())
            .map(|i| &i.id)
    }

    /// Identifier of the last item before the first failure.
    ///
    /// For ordered sources this is how far a checkpoint may advance.
    /// `None` when the first item failed or the batch is empty.
    pub fn last_contiguous_success(&self) -> Option<&I> {
        self.items
            .iter()
            .take_while(|i| i.status.is_success())
            .last()
            .map(|i| &i.id)
    }
}
