//! Shared harness for the order relay integration tests.
//!
//! - `mocks`: in-memory queue, failure-injecting store, recording publisher
//! - `fixtures`: order bodies
//! - `setup`: wired-up pipeline and HTTP router
//! - `containers`: ClickHouse testcontainer (requires Docker)

pub mod containers;
pub mod fixtures;
pub mod mocks;
