//! Startup recovery.

use tracing::info;

use super::Dispatcher;
use crate::error::Result;
use crate::tasks::TaskStore;

/// Resubmit every task a previous run left `pending` or `in-progress`.
///
/// Returns how many were queued. Stops at the first submission the
/// dispatcher refuses; tasks not yet queued stay unfinished on disk and are
/// picked up on the next start.
pub async fn requeue_unfinished(store: &TaskStore, dispatcher: &Dispatcher) -> Result<usize> {
    let unfinished = store.unfinished().await;
    let total = unfinished.len();
    if total == 0 {
        return Ok(0);
    }

    info!(count = total, "Requeueing unfinished tasks");
    for task in unfinished {
        dispatcher.submit(task).await?;
    }
    info!(count = total, "Unfinished tasks requeued");
    Ok(total)
}
