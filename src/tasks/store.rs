//! Task store — the authoritative, file-backed collection of task records.
//!
//! The whole set lives in memory behind one reader/writer lock and is written
//! through to a single JSON file on every mutation. Each write replaces the
//! entire file, so a mutation costs O(total tasks) in I/O.
//!
//! Every mutation bumps a revision number. File writes run outside the data
//! lock, one at a time, and always serialize the newest in-memory state; a
//! writer whose revision is already covered by the file skips its write.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{Task, TaskStatus};
use crate::config::DelayPolicy;
use crate::error::StoreError;

/// In-memory task set plus the revision of its latest mutation.
#[derive(Debug, Default)]
struct TaskSet {
    tasks: Vec<Task>,
    revision: u64,
}

impl TaskSet {
    fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

/// Concurrency-safe, durably backed task collection.
pub struct TaskStore {
    path: PathBuf,
    delay: DelayPolicy,
    set: RwLock<TaskSet>,
    /// Serializes file writes; holds the revision last written to disk.
    /// Taken before `set`, never while holding it.
    persist: Mutex<u64>,
}

impl TaskStore {
    /// Load every task from `path`, creating an empty store file if none exists.
    ///
    /// A file that cannot be created or parsed is reported as an error; callers
    /// treat that as fatal at startup.
    pub async fn open(path: impl AsRef<Path>, delay: DelayPolicy) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tasks = match fs::read(&path).await {
            Ok(bytes) => parse_tasks(&path, &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::write(&path, b"[]").await?;
                info!(path = %path.display(), "Created empty task store");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), count = tasks.len(), "Task store loaded");

        Ok(Self {
            path,
            delay,
            set: RwLock::new(TaskSet { tasks, revision: 0 }),
            persist: Mutex::new(0),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of every task, in creation order.
    pub async fn list(&self) -> Vec<Task> {
        self.set.read().await.tasks.clone()
    }

    /// Look up a task by ID. Returns an owned copy.
    pub async fn get(&self, id: Uuid) -> Option<Task> {
        self.set
            .read()
            .await
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    /// Tasks that have not reached a terminal status.
    pub async fn unfinished(&self) -> Vec<Task> {
        self.set
            .read()
            .await
            .tasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Create a pending task with a fresh ID and a delay drawn from the store's policy.
    ///
    /// If the file write fails the task is removed again, so a failed create
    /// leaves neither memory nor disk holding it.
    pub async fn create(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Task, StoreError> {
        let task = Task::new(title, description, self.delay.sample());

        let revision = {
            let mut set = self.set.write().await;
            set.tasks.push(task.clone());
            set.bump()
        };

        let mut written = self.persist.lock().await;
        if let Err(e) = self.flush(&mut written, revision).await {
            // Still holding `persist`: no later write can pick the task up
            // before it is gone.
            let mut set = self.set.write().await;
            set.tasks.retain(|t| t.id != task.id);
            set.bump();
            warn!(task_id = %task.id, error = %e, "Task creation rolled back");
            return Err(e);
        }
        drop(written);

        debug!(task_id = %task.id, delay_ms = task.delay_ms(), "Task created");
        Ok(task)
    }

    /// Replace the stored record for `task.id`.
    ///
    /// Only status and the start/completion timestamps are taken from `task`;
    /// identity, text, delay and creation time stay as stored. Returns the
    /// previous record, or `None` if no task has that ID (nothing is written).
    /// A failed write leaves the change in memory for the next write to carry.
    pub async fn update(&self, task: Task) -> Result<Option<Task>, StoreError> {
        let (previous, revision) = {
            let mut set = self.set.write().await;

            let Some(slot) = set.tasks.iter_mut().find(|t| t.id == task.id) else {
                warn!(task_id = %task.id, "Update for unknown task ignored");
                return Ok(None);
            };

            if !slot.status.can_transition_to(task.status) {
                return Err(StoreError::InvalidTransition {
                    id: task.id,
                    from: slot.status,
                    to: task.status,
                });
            }

            let previous = slot.clone();
            slot.status = task.status;
            slot.started_at = task.started_at;
            slot.completed_at = task.completed_at;

            (previous, set.bump())
        };

        let mut written = self.persist.lock().await;
        self.flush(&mut written, revision).await?;
        drop(written);

        debug!(task_id = %task.id, from = %previous.status, to = %task.status, "Task updated");
        Ok(Some(previous))
    }

    /// Count tasks per status.
    pub async fn count_by_status(&self, status: TaskStatus) -> usize {
        self.set
            .read()
            .await
            .tasks
            .iter()
            .filter(|t| t.status == status)
            .count()
    }

    /// Bring the file up to at least `revision`. `written` is the guarded
    /// revision from `persist`.
    async fn flush(&self, written: &mut u64, revision: u64) -> Result<(), StoreError> {
        if *written >= revision {
            return Ok(());
        }

        let (bytes, snapshot) = {
            let set = self.set.read().await;
            (serde_json::to_vec_pretty(&set.tasks)?, set.revision)
        };
        self.write_file(&bytes).await?;
        *written = snapshot;
        Ok(())
    }

    /// Write a full snapshot next to the store file, then swap it in.
    async fn write_file(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn parse_tasks(path: &Path, bytes: &[u8]) -> Result<Vec<Task>, StoreError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let tasks: Vec<Task> = serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut seen = std::collections::HashSet::with_capacity(tasks.len());
    if let Some(dup) = tasks.iter().find(|t| !seen.insert(t.id)) {
        return Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("duplicate task id {}", dup.id),
        });
    }

    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn zero_delay() -> DelayPolicy {
        DelayPolicy::Fixed(Duration::ZERO)
    }

    async fn open_in(dir: &tempfile::TempDir) -> TaskStore {
        TaskStore::open(dir.path().join("tasks.json"), zero_delay())
            .await
            .unwrap()
    }

    async fn on_disk(store: &TaskStore) -> Vec<Task> {
        let bytes = fs::read(store.path()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tasks.json");

        let store = TaskStore::open(&path, zero_delay()).await.unwrap();
        assert!(path.exists());
        assert!(store.list().await.is_empty());
        assert!(on_disk(&store).await.is_empty());
    }

    #[tokio::test]
    async fn open_accepts_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "").unwrap();

        let store = TaskStore::open(&path, zero_delay()).await.unwrap();
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = TaskStore::open(&path, zero_delay()).await.err().unwrap();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn open_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let task = Task::new("A", "d", Duration::ZERO);
        std::fs::write(&path, serde_json::to_vec(&vec![task.clone(), task]).unwrap()).unwrap();

        let err = TaskStore::open(&path, zero_delay()).await.err().unwrap();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn create_persists_pending_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;

        let task = store.create("A", "d").await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.delay, Duration::ZERO);

        assert_eq!(store.list().await, vec![task.clone()]);
        assert_eq!(on_disk(&store).await, vec![task]);
    }

    #[tokio::test]
    async fn create_draws_delay_from_policy() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path().join("tasks.json"), DelayPolicy::default())
            .await
            .unwrap();

        for _ in 0..20 {
            let task = store.create("t", "").await.unwrap();
            assert!((10..=19).contains(&task.delay.as_secs()));
        }
    }

    #[tokio::test]
    async fn concurrent_creates_yield_unique_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_in(&dir).await);

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.create(format!("task {i}"), "").await.unwrap().id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(ids.len(), 50);

        // Last writer wins with the full set, so disk and memory agree.
        assert_eq!(on_disk(&store).await, store.list().await);
    }

    #[tokio::test]
    async fn get_returns_copy_or_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        let task = store.create("A", "d").await.unwrap();

        assert_eq!(store.get(task.id).await, Some(task));
        assert_eq!(store.get(Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn update_replaces_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        let task = store.create("A", "d").await.unwrap();

        let mut done = task.clone();
        done.mark_completed();
        let previous = store.update(done.clone()).await.unwrap();
        assert_eq!(previous, Some(task));

        let stored = store.get(done.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert!(stored.completed_at.is_some());
        assert_eq!(on_disk(&store).await, vec![stored]);
    }

    #[tokio::test]
    async fn update_keeps_immutable_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        let task = store.create("A", "d").await.unwrap();

        let mut edited = task.clone();
        edited.title = "B".to_string();
        edited.description = "other".to_string();
        edited.mark_in_progress();
        store.update(edited).await.unwrap();

        let stored = store.get(task.id).await.unwrap();
        assert_eq!(stored.title, "A");
        assert_eq!(stored.description, "d");
        assert_eq!(stored.created_at, task.created_at);
        assert_eq!(stored.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn update_unknown_is_absent_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        store.create("A", "d").await.unwrap();
        let before = on_disk(&store).await;

        let stranger = Task::new("ghost", "", Duration::ZERO);
        assert!(store.update(stranger).await.unwrap().is_none());
        assert_eq!(store.list().await.len(), 1);
        assert_eq!(on_disk(&store).await, before);
    }

    #[tokio::test]
    async fn update_rejects_regression() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        let task = store.create("A", "d").await.unwrap();

        let mut done = task.clone();
        done.mark_completed();
        store.update(done).await.unwrap();

        let err = store.update(task.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: TaskStatus::Completed,
                to: TaskStatus::Pending,
                ..
            }
        ));
        assert_eq!(
            store.get(task.id).await.unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test]
    async fn reload_round_trips_field_for_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");

        let before = {
            let store = TaskStore::open(&path, DelayPolicy::default()).await.unwrap();
            let a = store.create("A", "first").await.unwrap();
            store.create("B", "second").await.unwrap();
            let mut started = a.clone();
            started.mark_in_progress();
            store.update(started.clone()).await.unwrap();
            started.mark_completed();
            store.update(started).await.unwrap();
            store.list().await
        };

        let reopened = TaskStore::open(&path, DelayPolicy::default()).await.unwrap();
        assert_eq!(reopened.list().await, before);
    }

    #[tokio::test]
    async fn failed_create_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        let tmp = store.path().with_extension("json.tmp");
        std::fs::create_dir(&tmp).unwrap();

        assert!(store.create("A", "d").await.is_err());
        assert!(store.list().await.is_empty());
        assert!(on_disk(&store).await.is_empty());

        std::fs::remove_dir(&tmp).unwrap();
        let b = store.create("B", "d").await.unwrap();
        assert_eq!(store.list().await, vec![b.clone()]);
        assert_eq!(on_disk(&store).await, vec![b]);
    }

    #[tokio::test]
    async fn failed_update_is_carried_by_next_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        let a = store.create("A", "").await.unwrap();
        let tmp = store.path().with_extension("json.tmp");
        std::fs::create_dir(&tmp).unwrap();

        let mut done = a.clone();
        done.mark_completed();
        assert!(matches!(
            store.update(done).await,
            Err(StoreError::Io(_))
        ));
        assert_eq!(on_disk(&store).await[0].status, TaskStatus::Pending);

        std::fs::remove_dir(&tmp).unwrap();
        store.create("B", "").await.unwrap();
        let disk = on_disk(&store).await;
        assert_eq!(disk, store.list().await);
        assert_eq!(disk[0].status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn readers_do_not_wait_on_file_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_in(&dir).await);

        // Hold the writer slot so the create below parks before its write.
        let held = store.persist.lock().await;
        let creating = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create("A", "d").await })
        };

        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let tasks = store.list().await;
                if !tasks.is_empty() {
                    return tasks;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(seen.len(), 1);
        assert!(on_disk(&store).await.is_empty());

        drop(held);
        let task = creating.await.unwrap().unwrap();
        assert_eq!(on_disk(&store).await, vec![task]);
    }

    #[tokio::test]
    async fn unfinished_skips_completed() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;
        let a = store.create("A", "").await.unwrap();
        let b = store.create("B", "").await.unwrap();

        let mut done = a.clone();
        done.mark_completed();
        store.update(done).await.unwrap();

        let unfinished = store.unfinished().await;
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, b.id);
        assert_eq!(store.count_by_status(TaskStatus::Completed).await, 1);
        assert_eq!(store.count_by_status(TaskStatus::Pending).await, 1);
    }
}
