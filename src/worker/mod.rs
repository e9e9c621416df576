//! Worker system.
//!
//! - `dispatcher`: queue ownership, worker fan-out, idempotent shutdown
//! - `execute`: what a worker does with one task
//! - `recovery`: requeueing unfinished work at startup

pub mod dispatcher;
mod execute;
pub mod recovery;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherState, DispatcherStats};
pub use recovery::requeue_unfinished;
