//! Task records and their lifecycle status.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a task. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Created and waiting for a worker.
    Pending,
    /// A worker has picked it up.
    InProgress,
    /// Work finished.
    Completed,
}

impl TaskStatus {
    /// Check if this status may be replaced by `target`.
    ///
    /// Rewriting the same status is allowed so a recovered task can be
    /// picked up again after a restart.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Pending, Pending)
                | (Pending, InProgress)
                | (Pending, Completed)
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (Completed, Completed)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// A unit of work and its persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique ID, assigned once at creation.
    pub id: Uuid,
    /// Short title.
    pub title: String,
    /// Longer free-form description.
    pub description: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// How long the simulated work takes.
    #[serde(rename = "delay_ms", with = "duration_millis")]
    pub delay: Duration,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When a worker picked the task up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When a worker finished the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task with a fresh ID.
    pub fn new(title: impl Into<String>, description: impl Into<String>, delay: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            delay,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Mark as picked up by a worker.
    pub fn mark_in_progress(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    /// Mark as finished.
    pub fn mark_completed(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Delay in whole milliseconds, saturating at `u64::MAX`.
    pub fn delay_ms(&self) -> u64 {
        duration_millis::saturating(&self.delay)
    }
}

/// Body of a task-creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn saturating(duration: &Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        saturating(duration).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
