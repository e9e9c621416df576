//! Execution of a single task by a worker.

use std::sync::atomic::Ordering;

use tracing::{error, info, warn};

use super::dispatcher::Counters;
use crate::error::StoreError;
use crate::tasks::{Task, TaskStore};

/// Outcome of writing a worker's copy back through the store.
#[derive(Debug, PartialEq, Eq)]
enum Persisted {
    Stored,
    /// No task with that ID in the store.
    Missing,
    /// The store already holds a later status.
    Superseded,
    Failed,
}

/// Run one task to completion: record the start, simulate the work, record the result.
///
/// Persistence failures are logged and counted but never retried; the next
/// successful write of the store carries the in-memory state to disk. A task
/// the store already has past `in-progress` is skipped.
pub(crate) async fn run(worker: usize, mut task: Task, store: &TaskStore, counters: &Counters) {
    task.mark_in_progress();
    if persist(worker, &task, store, counters).await == Persisted::Superseded {
        info!(worker, task_id = %task.id, "Task already finished, skipping");
        return;
    }
    counters.started.fetch_add(1, Ordering::Relaxed);

    info!(
        worker,
        task_id = %task.id,
        delay_ms = task.delay_ms(),
        "Task started"
    );

    tokio::time::sleep(task.delay).await;

    task.mark_completed();
    if persist(worker, &task, store, counters).await == Persisted::Stored {
        info!(worker, task_id = %task.id, "Task completed");
    }
    counters.completed.fetch_add(1, Ordering::Relaxed);
}

async fn persist(worker: usize, task: &Task, store: &TaskStore, counters: &Counters) -> Persisted {
    match store.update(task.clone()).await {
        Ok(Some(_)) => Persisted::Stored,
        Ok(None) => {
            warn!(worker, task_id = %task.id, status = %task.status, "Task no longer in store");
            Persisted::Missing
        }
        Err(StoreError::InvalidTransition { from, .. }) => {
            warn!(
                worker,
                task_id = %task.id,
                stored = %from,
                status = %task.status,
                "Stale task state refused"
            );
            Persisted::Superseded
        }
        Err(e) => {
            counters.persist_failures.fetch_add(1, Ordering::Relaxed);
            error!(
                worker,
                task_id = %task.id,
                status = %task.status,
                error = %e,
                "Failed to persist task state"
            );
            Persisted::Failed
        }
    }
}
