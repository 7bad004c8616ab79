//! # PIM Core
//!
//! Plugin Installation & Management engine for the WebUI backend of a
//! Minecraft server management host. The engine resolves plugin releases
//! from remote catalogues, computes transitive plugin dependencies and
//! environment constraints, downloads and atomically installs releases,
//! and reports everything as asynchronous tasks with progressive status.
//!
//! The surrounding runtime ("host") is reached exclusively through the
//! [`host::HostBridge`] capability trait; the engine never loads plugin
//! code itself.

pub mod catalogue;
pub mod constants;
pub mod download;
pub mod engine;
pub mod error;
pub mod host;
pub mod installer;
pub mod progress;
pub mod registry;
pub mod resolver;
pub mod task;

// Re-export key public types for the binary and the HTTP layer
pub use catalogue::{MetaRegistry, PluginData, PluginDependency, PluginVersion, ReleaseData, VersionRequirement};
pub use engine::{EngineConfig, PluginEngine};
pub use error::{Error, Result};
pub use host::{HostBridge, LoadedPluginMeta};
pub use task::{Task, TaskAction, TaskStatus};

#[cfg(test)]
mod tests;
