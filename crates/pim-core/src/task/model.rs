use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

use crate::constants;

/// What a task does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskAction {
    Install,
    Uninstall,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAction::Install => write!(f, "install"),
            TaskAction::Uninstall => write!(f, "uninstall"),
        }
    }
}

/// Task lifecycle state; transitions are monotonic
/// (`Running` -> `Completed` | `Failed`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Snapshot of one install/uninstall task.
///
/// Timestamps serialize as epoch seconds for the polling frontend.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub plugin_id: String,
    pub action: TaskAction,
    pub status: TaskStatus,
    pub progress: f64,
    /// Most recent message
    pub message: String,
    /// Every distinct message in emission order (consecutive duplicates
    /// collapse to one entry)
    pub all_messages: Vec<String>,
    /// Subset of `all_messages` that matched the error keyword set
    pub error_messages: Vec<String>,
    #[serde(serialize_with = "epoch_seconds")]
    pub start_time: SystemTime,
    #[serde(serialize_with = "opt_epoch_seconds")]
    pub end_time: Option<SystemTime>,
    #[serde(serialize_with = "epoch_seconds")]
    pub access_time: SystemTime,
    pub version: Option<String>,
    pub repo_url: Option<String>,
}

/// Partial update merged into a task by [`TaskStore::update`](crate::task::TaskStore::update)
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub message: Option<String>,
}

impl TaskUpdate {
    /// Update carrying only a progress message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A message counts as an error/warning entry iff it contains one of the
/// fixed keywords (case-insensitive)
pub fn is_error_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    constants::ERROR_MESSAGE_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn epoch_seconds<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let seconds = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    serializer.serialize_f64(seconds)
}

fn opt_epoch_seconds<S: Serializer>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error> {
    match time {
        Some(t) => epoch_seconds(t, serializer),
        None => serializer.serialize_none(),
    }
}
