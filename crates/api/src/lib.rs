//! Health, readiness, liveness and metrics endpoints for the order relay.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
