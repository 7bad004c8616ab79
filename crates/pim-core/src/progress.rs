//! Progress reporting seam. The task manager, the in-game command bridge,
//! and the HTTP poller are all just sinks; workers emit through this trait
//! and never know who is listening.

use std::fmt::Debug;
use std::sync::Arc;

use crate::task::{TaskStore, TaskUpdate};

/// Receives human-readable progress messages from a running operation
pub trait ProgressSink: Send + Sync + Debug {
    fn emit(&self, message: &str);
}

/// Sink that records messages on a task via the [`TaskStore`]
#[derive(Debug, Clone)]
pub struct TaskSink {
    store: Arc<TaskStore>,
    task_id: String,
}

impl TaskSink {
    pub fn new(store: Arc<TaskStore>, task_id: impl Into<String>) -> Self {
        Self {
            store,
            task_id: task_id.into(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl ProgressSink for TaskSink {
    fn emit(&self, message: &str) {
        self.store.update(&self.task_id, TaskUpdate::message(message));
    }
}

/// Sink that forwards messages to the logging facade; useful for callers
/// that run engine operations without a task
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, message: &str) {
        log::info!("{message}");
    }
}
