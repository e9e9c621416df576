//! Dispatcher — bounded work queue fanned out to a fixed pool of workers.
//!
//! Lifecycle is `Running → Draining → Stopped`. Closing the queue is the
//! shutdown signal: every worker keeps pulling until the queue is both closed
//! and empty, then exits. A supervisor task joins all workers and publishes
//! `Stopped` on a watch channel that every `stop()` caller waits on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::execute;
use crate::error::DispatchError;
use crate::tasks::{Task, TaskStore};

/// Lifecycle state of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    /// Workers are draining the queue and new submissions are accepted.
    Running,
    /// Queue closed; workers finish what was already queued.
    Draining,
    /// Every worker has exited.
    Stopped,
}

/// Pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Number of workers; fixed for the dispatcher's lifetime.
    pub workers: usize,
    /// Bounded queue capacity. `submit` waits when it is full.
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 100,
        }
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStats {
    pub state: DispatcherState,
    pub workers: usize,
    pub queue_capacity: usize,
    pub submitted: u64,
    pub started: u64,
    pub completed: u64,
    pub persist_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) submitted: AtomicU64,
    pub(crate) started: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) persist_failures: AtomicU64,
}

/// Accepts tasks and hands them to a fixed set of worker tasks.
pub struct Dispatcher {
    config: DispatcherConfig,
    /// `None` once `stop()` has begun. Guarding the sender here makes
    /// stop idempotent and keeps submit from racing a closed queue.
    queue: Mutex<Option<mpsc::Sender<Task>>>,
    state: Arc<watch::Sender<DispatcherState>>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Spawn `config.workers` workers reading from a queue of `config.queue_capacity`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(store: Arc<TaskStore>, config: DispatcherConfig) -> Self {
        let config = DispatcherConfig {
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
        };

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let (state, _) = watch::channel(DispatcherState::Running);
        let state = Arc::new(state);
        let counters = Arc::new(Counters::default());

        let handles: Vec<JoinHandle<()>> = (0..config.workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&rx),
                    Arc::clone(&store),
                    Arc::clone(&counters),
                ))
            })
            .collect();

        tokio::spawn(supervise(handles, Arc::clone(&state)));

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Dispatcher started"
        );

        Self {
            config,
            queue: Mutex::new(Some(tx)),
            state,
            counters,
        }
    }

    /// Enqueue a task for execution.
    ///
    /// Waits while the queue is full. Fails with `ShuttingDown` once `stop()`
    /// has begun; the task is never silently dropped.
    pub async fn submit(&self, task: Task) -> Result<(), DispatchError> {
        let id = task.id;
        let sender = match self.queue.lock().await.as_ref() {
            Some(tx) => tx.clone(),
            None => return Err(DispatchError::ShuttingDown { id }),
        };

        // Reserving first keeps a cancelled submit from being counted.
        let permit = sender
            .reserve()
            .await
            .map_err(|_| DispatchError::QueueClosed { id })?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        permit.send(task);

        debug!(task_id = %id, "Task queued");
        Ok(())
    }

    /// Close the queue and wait until every worker has exited.
    ///
    /// Safe to call any number of times, concurrently or in sequence; every
    /// call returns once the dispatcher is `Stopped`.
    pub async fn stop(&self) {
        let sender = {
            let mut queue = self.queue.lock().await;
            let sender = queue.take();
            if sender.is_some() {
                self.state.send_replace(DispatcherState::Draining);
            }
            sender
        };

        if let Some(sender) = sender {
            info!("Dispatcher draining");
            drop(sender);
        }

        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so this only errs if the supervisor
        // vanished, in which case there is nothing left to wait for.
        let _ = rx.wait_for(|s| *s == DispatcherState::Stopped).await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    /// Snapshot of the dispatcher counters.
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            state: self.state(),
            workers: self.config.workers,
            queue_capacity: self.config.queue_capacity,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            started: self.counters.started.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            persist_failures: self.counters.persist_failures.load(Ordering::Relaxed),
        }
    }
}

/// One worker: pull, execute, repeat until the queue is closed and empty.
async fn worker_loop(
    worker: usize,
    queue: Arc<Mutex<mpsc::Receiver<Task>>>,
    store: Arc<TaskStore>,
    counters: Arc<Counters>,
) {
    debug!(worker, "Worker started");

    loop {
        // Only idle workers wait on this lock, so holding it across recv
        // just lines them up for the next item.
        let next = queue.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };
        execute::run(worker, task, &store, &counters).await;
    }

    debug!(worker, "Worker exited");
}

/// Join every worker, then publish `Stopped`.
async fn supervise(handles: Vec<JoinHandle<()>>, state: Arc<watch::Sender<DispatcherState>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker terminated abnormally");
        }
    }

    state.send_replace(DispatcherState::Stopped);
    info!("Dispatcher stopped");
}
