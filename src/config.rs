//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

/// How long a task's simulated work takes, chosen at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPolicy {
    /// Whole seconds drawn uniformly from `min..=max`.
    Uniform { min_secs: u64, max_secs: u64 },
    /// Every task gets the same delay.
    Fixed(Duration),
}

impl DelayPolicy {
    /// Draw the delay for a new task.
    pub fn sample(&self) -> Duration {
        match *self {
            Self::Uniform { min_secs, max_secs } => {
                Duration::from_secs(rand::thread_rng().gen_range(min_secs..=max_secs))
            }
            Self::Fixed(delay) => delay,
        }
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::Uniform {
            min_secs: 10,
            max_secs: 19,
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// File holding the full task set.
    pub data_path: PathBuf,
    /// Host the HTTP API binds to.
    pub host: String,
    /// Port the HTTP API binds to.
    pub port: u16,
    /// Number of worker units; fixed for the process lifetime.
    pub workers: usize,
    /// Capacity of the bounded work queue.
    pub queue_capacity: usize,
    /// Simulated work duration policy.
    pub delay: DelayPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./data/tasks.json"),
            host: "0.0.0.0".to_string(),
            port: 8000,
            workers: 5,
            queue_capacity: 100,
            delay: DelayPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Build from `TASK_SCHEDULER_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` is the production entry point.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let data_path = lookup("TASK_SCHEDULER_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_path);
        let host = lookup("TASK_SCHEDULER_HOST").unwrap_or(defaults.host);
        let port = parse_var(&lookup, "TASK_SCHEDULER_PORT", defaults.port)?;
        let workers = parse_var(&lookup, "TASK_SCHEDULER_WORKERS", defaults.workers)?;
        let queue_capacity =
            parse_var(&lookup, "TASK_SCHEDULER_QUEUE_CAPACITY", defaults.queue_capacity)?;

        if workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TASK_SCHEDULER_WORKERS".to_string(),
                message: "worker pool needs at least one worker".to_string(),
            });
        }
        if queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TASK_SCHEDULER_QUEUE_CAPACITY".to_string(),
                message: "queue capacity must be at least 1".to_string(),
            });
        }

        let min_secs = parse_var(&lookup, "TASK_SCHEDULER_DELAY_MIN_SECS", 10u64)?;
        let max_secs = parse_var(&lookup, "TASK_SCHEDULER_DELAY_MAX_SECS", 19u64)?;
        if min_secs > max_secs {
            return Err(ConfigError::InvalidValue {
                key: "TASK_SCHEDULER_DELAY_MIN_SECS".to_string(),
                message: format!("minimum delay {min_secs}s exceeds maximum {max_secs}s"),
            });
        }

        Ok(Self {
            data_path,
            host,
            port,
            workers,
            queue_capacity,
            delay: DelayPolicy::Uniform { min_secs, max_secs },
        })
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}
