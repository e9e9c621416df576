//! Error types for the task scheduler.

use std::path::PathBuf;

use uuid::Uuid;

use crate::tasks::TaskStatus;

/// Top-level error type for the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Task store errors.
///
/// `Corrupt` only surfaces from [`TaskStore::open`](crate::tasks::TaskStore::open);
/// the others can be returned by any mutation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task file {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Task {id} is {from}, cannot move back to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Dispatcher submission errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatcher is shutting down, task {id} was not accepted")]
    ShuttingDown { id: Uuid },

    #[error("Work queue closed before task {id} could be enqueued")]
    QueueClosed { id: Uuid },
}

/// Result type alias for the scheduler.
pub type Result<T> = std::result::Result<T, Error>;
