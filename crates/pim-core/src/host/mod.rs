//! # Host Capability
//!
//! The engine never loads plugin code itself; everything that touches the
//! surrounding runtime goes through the [`HostBridge`] trait. The production
//! implementation adapts the live server process; tests and the standalone
//! CLI provide their own.

use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::catalogue::PluginDependency;

/// Metadata the host reports for one loaded plugin
#[derive(Debug, Clone)]
pub struct LoadedPluginMeta {
    /// Version string as the host reports it
    pub version: String,
    /// Declared dependencies of the loaded plugin, in declared order
    pub dependencies: Vec<PluginDependency>,
}

/// Narrow capability the engine consumes from the surrounding runtime.
///
/// `load_plugin`/`unload_plugin` report success as a bool, mirroring the
/// host's own API; the engine turns refusals into task outcomes rather
/// than errors.
#[async_trait]
pub trait HostBridge: Send + Sync + Debug {
    /// Ids of all currently loaded plugins
    async fn loaded_plugin_ids(&self) -> Vec<String>;

    /// Metadata of a loaded plugin, `None` when it is not loaded
    async fn plugin_metadata(&self, plugin_id: &str) -> Option<LoadedPluginMeta>;

    /// On-disk file backing a loaded plugin
    async fn plugin_file_path(&self, plugin_id: &str) -> Option<PathBuf>;

    /// Plugin files present in the plugin directory but not loaded
    async fn unloaded_plugin_files(&self) -> Vec<PathBuf>;

    /// Ask the host to load a plugin by id or by file path
    async fn load_plugin(&self, id_or_path: &str) -> bool;

    /// Ask the host to unload a plugin by id
    async fn unload_plugin(&self, plugin_id: &str) -> bool;

    /// Directory new plugin files are installed into
    fn plugin_directory(&self) -> PathBuf;

    /// Directory for catalogue caches and download staging
    fn cache_directory(&self) -> PathBuf;

    /// Version of the host runtime, for environment checks
    fn runtime_version(&self) -> String;

    /// Version of the interpreter the host runs on
    fn interpreter_version(&self) -> String;

    /// Command used to invoke the interpreter (for `pip install -r ...`)
    fn interpreter_command(&self) -> String;
}
