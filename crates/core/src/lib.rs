//! Core types for the order relay pipeline.
//!
//! Messages arrive from the queue as [`RawMessage`]s, are decoded into a
//! [`Payload`], stored as a [`Record`], observed again as a [`ChangeEvent`]
//! on the store's change feed, and finally relayed as a [`Notification`].

pub mod batch;
pub mod config;
pub mod error;
pub mod message;
pub mod payload;
pub mod record;

pub use batch::*;
pub use config::*;
pub use error::{Error, Result};
pub use message::*;
pub use payload::*;
pub use record::*;
