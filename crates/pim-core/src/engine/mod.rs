//! # PIM Façade
//!
//! [`PluginEngine`] is the single entry point the HTTP layer and the
//! command bridge talk to. It owns the registry manager and the installer
//! and keeps no state of its own beyond them.
pub mod error;

pub use error::EngineError;


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::catalogue::{normalize_id, MetaRegistry, PluginData, ReleaseData};
use crate::constants;
use crate::error::Result;
use crate::host::HostBridge;
use crate::installer::{InstallerConfig, PluginInstaller};
use crate::registry::{RegistryConfig, RegistryManager};
use crate::task::{Task, TaskAction, TaskStore};

/// Engine-wide configuration with production defaults
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Catalogue consulted when callers pass no repository override
    pub catalogue_url: String,
    /// Plugin id of the WebUI backend itself; install/uninstall requests
    /// for this id are rejected
    pub self_plugin_id: String,
    pub worker_count: usize,
    pub download_timeout: Duration,
    pub registry: RegistryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalogue_url: constants::OFFICIAL_CATALOGUE_URL.to_string(),
            self_plugin_id: constants::SELF_PLUGIN_ID.to_string(),
            worker_count: constants::DEFAULT_WORKER_COUNT,
            download_timeout: constants::DOWNLOAD_TIMEOUT,
            registry: RegistryConfig::default(),
        }
    }
}

/// Thin aggregate over the registry manager and the installer
#[derive(Debug)]
pub struct PluginEngine {
    host: Arc<dyn HostBridge>,
    registry: Arc<RegistryManager>,
    installer: Arc<PluginInstaller>,
    config: EngineConfig,
}

impl PluginEngine {
    /// Build the engine against a host. Must run inside a tokio runtime:
    /// the installer spawns its worker pool here.
    pub fn new(host: Arc<dyn HostBridge>, config: EngineConfig) -> Result<Self> {
        let registry = Arc::new(RegistryManager::with_config(
            host.cache_directory(),
            config.registry.clone(),
        )?);
        let tasks = Arc::new(TaskStore::new());
        let installer = PluginInstaller::new(
            Arc::clone(&host),
            Arc::clone(&registry),
            tasks,
            InstallerConfig {
                catalogue_url: config.catalogue_url.clone(),
                download_timeout: config.download_timeout,
                worker_count: config.worker_count,
            },
        )?;
        Ok(Self {
            host,
            registry,
            installer,
            config,
        })
    }

    pub fn with_defaults(host: Arc<dyn HostBridge>) -> Result<Self> {
        Self::new(host, EngineConfig::default())
    }

    /// Start an install task; returns the task id to poll
    pub fn install(
        &self,
        plugin_id: &str,
        version: Option<String>,
        repo_url: Option<String>,
    ) -> Result<String> {
        self.guard_self(TaskAction::Install, plugin_id)?;
        Ok(self.installer.install(plugin_id, version, repo_url)?)
    }

    /// Start an uninstall task; returns the task id to poll
    pub fn uninstall(&self, plugin_id: &str) -> Result<String> {
        self.guard_self(TaskAction::Uninstall, plugin_id)?;
        Ok(self.installer.uninstall(plugin_id)?)
    }

    /// Catalogue snapshot, from the default catalogue or an override
    pub async fn catalogue_meta(&self, ignore_ttl: bool, repo_url: Option<&str>) -> MetaRegistry {
        let url = repo_url.unwrap_or(&self.config.catalogue_url);
        self.registry.get_meta(url, ignore_ttl).await
    }

    /// Catalogue plugins matching a keyword (id, name, or description)
    pub async fn list_plugins(&self, keyword: Option<&str>, repo_url: Option<&str>) -> Vec<PluginData> {
        let meta = self.catalogue_meta(false, repo_url).await;
        meta.filter(keyword).into_iter().cloned().collect()
    }

    /// Ordered release history of one plugin; empty when the catalogue does
    /// not know it
    pub async fn plugin_versions(&self, plugin_id: &str, repo_url: Option<&str>) -> Vec<ReleaseData> {
        let meta = self.catalogue_meta(false, repo_url).await;
        meta.plugin(plugin_id)
            .map(|p| p.releases.clone())
            .unwrap_or_default()
    }

    /// Snapshot of one task
    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.installer.tasks().get(task_id)
    }

    /// Snapshot of all retained tasks
    pub fn tasks(&self) -> HashMap<String, Task> {
        self.installer.tasks().all()
    }

    pub fn host(&self) -> &Arc<dyn HostBridge> {
        &self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop the worker pool and wait for it to drain
    pub async fn shutdown(&self) {
        self.installer.shutdown().await;
    }

    fn guard_self(&self, action: TaskAction, plugin_id: &str) -> Result<()> {
        if normalize_id(plugin_id) == normalize_id(&self.config.self_plugin_id) {
            return Err(EngineError::SelfManagement {
                action,
                plugin_id: plugin_id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
