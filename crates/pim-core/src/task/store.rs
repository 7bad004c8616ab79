use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use crate::constants;
use crate::task::model::{is_error_message, Task, TaskAction, TaskStatus, TaskUpdate};

#[derive(Debug, Default)]
struct StoreState {
    counter: u64,
    tasks: HashMap<String, Task>,
}

/// Process-wide task map behind one mutex. The critical sections are pure
/// bookkeeping; no I/O happens under the lock, so workers can call
/// [`update`](Self::update) freely between their own blocking steps.
#[derive(Debug)]
pub struct TaskStore {
    state: Mutex<StoreState>,
    retention: Duration,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::with_retention(constants::TASK_RETENTION)
    }

    /// Store sweeping terminal tasks once unread for `retention`
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            retention,
        }
    }

    /// Allocate a new running task and return its id
    /// (`{action}_{monotonic counter}`)
    pub fn create(
        &self,
        action: TaskAction,
        plugin_id: &str,
        version: Option<String>,
        repo_url: Option<String>,
    ) -> String {
        let mut state = self.lock();
        state.counter += 1;
        let id = format!("{action}_{}", state.counter);
        let now = SystemTime::now();
        state.tasks.insert(
            id.clone(),
            Task {
                id: id.clone(),
                plugin_id: plugin_id.to_string(),
                action,
                status: TaskStatus::Running,
                progress: 0.0,
                message: format!("Initializing {action} for {plugin_id}"),
                all_messages: Vec::new(),
                error_messages: Vec::new(),
                start_time: now,
                end_time: None,
                access_time: now,
                version,
                repo_url,
            },
        );
        id
    }

    /// Merge `update` into the task. Messages append to `all_messages`
    /// unless they repeat the previous entry, and error-classified messages
    /// also land in `error_messages`. Status only ever moves forward; a
    /// transition into a terminal state stamps `end_time` exactly once.
    pub fn update(&self, task_id: &str, update: TaskUpdate) {
        let mut state = self.lock();
        let Some(task) = state.tasks.get_mut(task_id) else {
            log::warn!("Update for unknown task '{task_id}' dropped");
            return;
        };

        if let Some(message) = update.message {
            if task.all_messages.last() != Some(&message) {
                task.all_messages.push(message.clone());
                if is_error_message(&message) {
                    task.error_messages.push(message.clone());
                }
            }
            task.message = message;
        }
        if let Some(progress) = update.progress {
            task.progress = progress.clamp(0.0, 1.0);
        }
        if let Some(status) = update.status {
            if !task.status.is_terminal() {
                task.status = status;
                if status.is_terminal() {
                    task.end_time = Some(SystemTime::now());
                }
            }
        }
    }

    /// Snapshot of one task; refreshes its access time
    pub fn get(&self, task_id: &str) -> Option<Task> {
        let mut state = self.lock();
        self.sweep(&mut state);
        let task = state.tasks.get_mut(task_id)?;
        task.access_time = SystemTime::now();
        Some(task.clone())
    }

    /// Snapshot of every retained task, keyed by id
    pub fn all(&self) -> HashMap<String, Task> {
        let mut state = self.lock();
        self.sweep(&mut state);
        let now = SystemTime::now();
        state
            .tasks
            .iter_mut()
            .map(|(id, task)| {
                task.access_time = now;
                (id.clone(), task.clone())
            })
            .collect()
    }

    fn sweep(&self, state: &mut StoreState) {
        let retention = self.retention;
        state.tasks.retain(|_, task| {
            if !task.status.is_terminal() {
                return true;
            }
            task.access_time
                .elapsed()
                .map(|unread| unread < retention)
                .unwrap_or(true)
        });
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
