//! HTTP API surface.

pub mod routes;

pub use routes::{AppState, task_routes};
