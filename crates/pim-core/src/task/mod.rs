//! # Task Manager
//!
//! Lifecycle and progress bookkeeping for install/uninstall tasks. Workers
//! hold task ids and mutate exclusively through the [`TaskStore`]; callers
//! poll and receive defensive snapshots. Terminal tasks are garbage
//! collected once unread for the retention window.
pub mod model;
pub mod store;

pub use model::{is_error_message, Task, TaskAction, TaskStatus, TaskUpdate};
pub use store::TaskStore;

// Test module declaration
#[cfg(test)]
mod tests;
