//! # Plugin Installer
//!
//! Orchestrates install and uninstall flows as background tasks: resolve
//! the target release, stop dependents, swap files, recurse into missing
//! dependencies, ask the host to reload, and restore dependents. A fixed
//! pool of workers consumes a queue of orders; each order is exactly one
//! task, driven to a terminal state regardless of its caller.
pub mod error;
pub mod pending;
pub mod python;

pub use error::InstallError;
pub use pending::PendingDeletes;

// Test module declaration
#[cfg(test)]
mod tests;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::catalogue::{normalize_id, PluginData, PluginVersion, ReleaseData};
use crate::constants;
use crate::download::ReleaseDownloader;
use crate::host::HostBridge;
use crate::progress::{ProgressSink, TaskSink};
use crate::registry::RegistryManager;
use crate::resolver::{archive, DependencyResolver};
use crate::task::{TaskAction, TaskStatus, TaskStore, TaskUpdate};

/// Tunables for the installer
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Catalogue consulted when a task carries no repository override
    pub catalogue_url: String,
    pub download_timeout: Duration,
    pub worker_count: usize,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            catalogue_url: constants::OFFICIAL_CATALOGUE_URL.to_string(),
            download_timeout: constants::DOWNLOAD_TIMEOUT,
            worker_count: constants::DEFAULT_WORKER_COUNT,
        }
    }
}

#[derive(Debug)]
struct WorkOrder {
    task_id: String,
    action: TaskAction,
    plugin_id: String,
    version: Option<String>,
    repo_url: Option<String>,
}

/// Background install/uninstall engine. Owns the task store, the resolver,
/// the downloader, and the worker pool.
#[derive(Debug)]
pub struct PluginInstaller {
    host: Arc<dyn HostBridge>,
    registry: Arc<RegistryManager>,
    tasks: Arc<TaskStore>,
    resolver: DependencyResolver,
    downloader: ReleaseDownloader,
    pending: Arc<PendingDeletes>,
    config: InstallerConfig,
    queue: mpsc::UnboundedSender<WorkOrder>,
    shutdown: watch::Sender<bool>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
}

impl PluginInstaller {
    pub fn new(
        host: Arc<dyn HostBridge>,
        registry: Arc<RegistryManager>,
        tasks: Arc<TaskStore>,
        config: InstallerConfig,
    ) -> crate::error::Result<Arc<Self>> {
        let downloader = ReleaseDownloader::new(host.cache_directory())?;
        let resolver = DependencyResolver::new(host.clone());
        let (queue, orders) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let installer = Arc::new(Self {
            host,
            registry,
            tasks,
            resolver,
            downloader,
            pending: Arc::new(PendingDeletes::new()),
            config,
            queue,
            shutdown,
            workers: StdMutex::new(Vec::new()),
        });

        let orders = Arc::new(Mutex::new(orders));
        let mut handles = Vec::new();
        for index in 0..installer.config.worker_count.max(1) {
            let worker = Arc::clone(&installer);
            let orders = Arc::clone(&orders);
            let shutdown_rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                worker.run_worker(index, orders, shutdown_rx).await;
            }));
        }
        *installer.workers.lock().unwrap_or_else(PoisonError::into_inner) = handles;

        Ok(installer)
    }

    /// Queue an install task and return its id
    pub fn install(
        &self,
        plugin_id: &str,
        version: Option<String>,
        repo_url: Option<String>,
    ) -> Result<String, InstallError> {
        self.submit(TaskAction::Install, plugin_id, version, repo_url)
    }

    /// Queue an uninstall task and return its id
    pub fn uninstall(&self, plugin_id: &str) -> Result<String, InstallError> {
        self.submit(TaskAction::Uninstall, plugin_id, None, None)
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.tasks
    }

    pub fn pending_deletes(&self) -> &Arc<PendingDeletes> {
        &self.pending
    }

    /// Stop accepting work and wait for the workers to drain. Running
    /// orders notice the flag between I/O steps and abort.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handles = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn submit(
        &self,
        action: TaskAction,
        plugin_id: &str,
        version: Option<String>,
        repo_url: Option<String>,
    ) -> Result<String, InstallError> {
        let task_id = self
            .tasks
            .create(action, plugin_id, version.clone(), repo_url.clone());
        let order = WorkOrder {
            task_id: task_id.clone(),
            action,
            plugin_id: plugin_id.to_string(),
            version,
            repo_url,
        };
        if self.queue.send(order).is_err() {
            self.tasks.update(
                &task_id,
                TaskUpdate::default()
                    .with_status(TaskStatus::Failed)
                    .with_message("Error: the installer is shut down"),
            );
            return Err(InstallError::QueueClosed);
        }
        Ok(task_id)
    }

    async fn run_worker(
        &self,
        index: usize,
        orders: Arc<Mutex<mpsc::UnboundedReceiver<WorkOrder>>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        log::debug!("Install worker {index} started");
        loop {
            let order = {
                let mut orders = orders.lock().await;
                tokio::select! {
                    order = orders.recv() => order,
                    _ = shutdown.changed() => None,
                }
            };
            let Some(order) = order else {
                break;
            };
            self.run_order(order).await;
        }
        log::debug!("Install worker {index} stopped");
    }

    async fn run_order(&self, order: WorkOrder) {
        let sink = TaskSink::new(Arc::clone(&self.tasks), &order.task_id);
        let result = match order.action {
            TaskAction::Install => {
                self.install_flow(
                    &sink,
                    &order.plugin_id,
                    order.version.as_deref(),
                    order.repo_url.as_deref(),
                    false,
                )
                .await
            }
            TaskAction::Uninstall => self.uninstall_flow(&sink, &order.plugin_id, false).await,
        };
        match result {
            Ok(()) => self.tasks.update(
                &order.task_id,
                TaskUpdate::default()
                    .with_status(TaskStatus::Completed)
                    .with_progress(1.0)
                    .with_message("Task finished"),
            ),
            Err(e) => {
                log::error!("Task {} failed: {e}", order.task_id);
                self.tasks.update(
                    &order.task_id,
                    TaskUpdate::default()
                        .with_status(TaskStatus::Failed)
                        .with_message(format!("Error: {e}")),
                );
            }
        }
    }

    /// Core install logic; recurses into missing dependencies with
    /// `is_dependency` set
    fn install_flow<'a>(
        &'a self,
        sink: &'a TaskSink,
        plugin_id: &'a str,
        version: Option<&'a str>,
        repo_url: Option<&'a str>,
        is_dependency: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), InstallError>> + Send + 'a>> {
        Box::pin(async move {
            let prefix = if is_dependency { "[dependency] " } else { "" };
            sink.emit(&format!("{prefix}Processing plugin: {plugin_id}"));
            self.ensure_running()?;

            let url = repo_url.unwrap_or(&self.config.catalogue_url);
            let meta = self.registry.get_meta(url, false).await;
            let Some(plugin_data) = meta.plugin(plugin_id) else {
                return Err(InstallError::PluginNotFound(plugin_id.to_string()));
            };
            let Some(release) = find_release(plugin_data, version) else {
                return Err(InstallError::VersionNotFound {
                    plugin_id: plugin_id.to_string(),
                    version: version.unwrap_or("latest").to_string(),
                });
            };
            sink.emit(&format!("{prefix}Resolved target version: {}", release.version()));

            let installed = self.host.plugin_metadata(plugin_id).await;
            let mut affected: Vec<String> = Vec::new();

            if let Some(installed) = &installed {
                if PluginVersion::new(&installed.version) == PluginVersion::new(release.version()) {
                    sink.emit(&format!(
                        "{prefix}Plugin {plugin_id} is already at version {}",
                        installed.version
                    ));
                    return Ok(());
                }
                sink.emit(&format!(
                    "{prefix}Found installed version {} -> target {}",
                    installed.version,
                    release.version()
                ));

                // Dependents must be stopped before the files change and
                // restored afterwards
                for pid in self.host.loaded_plugin_ids().await {
                    if normalize_id(&pid) == normalize_id(plugin_id) {
                        continue;
                    }
                    let Some(dep_meta) = self.host.plugin_metadata(&pid).await else {
                        continue;
                    };
                    if dep_meta.dependencies.iter().any(|d| d.matches_id(plugin_id)) {
                        affected.push(pid);
                    }
                }
                if !affected.is_empty() {
                    sink.emit(&format!(
                        "{prefix}Affected dependent plugins: {}, stopping them first",
                        affected.join(", ")
                    ));
                    for pid in &affected {
                        if self.host.unload_plugin(pid).await {
                            sink.emit(&format!("{prefix}Stopped dependent plugin: {pid}"));
                        }
                    }
                }

                // Record the old files before the host forgets about them
                self.mark_for_deletion(plugin_id).await;
                sink.emit(&format!("{prefix}Unloading old version of {plugin_id}..."));
                if self.host.unload_plugin(plugin_id).await {
                    sink.emit(&format!("{prefix}Old version unloaded"));
                }
            }

            self.ensure_running()?;
            let file_name = if release.file_name.is_empty() {
                format!("{plugin_id}.mcdr")
            } else {
                release.file_name.clone()
            };
            let target_path = self.host.plugin_directory().join(&file_name);
            sink.emit(&format!("{prefix}Downloading from {}...", release.download_url));
            self.downloader
                .download(&release.download_url, &target_path, self.config.download_timeout)
                .await
                .map_err(|source| InstallError::DownloadFailed {
                    plugin_id: plugin_id.to_string(),
                    source,
                })?;
            sink.emit(&format!("{prefix}Download complete: {file_name}"));

            sink.emit(&format!("{prefix}Resolving dependencies of {plugin_id}..."));
            let resolution = self.resolver.resolve(plugin_id, &meta, Some(&target_path)).await;

            for issue in &resolution.environment_issues {
                sink.emit(&format!("⚠ {prefix}Environment warning: {issue}"));
            }

            let missing = resolution.missing_installable();
            if !missing.is_empty() {
                sink.emit(&format!(
                    "{prefix}Missing required plugins: {}",
                    missing.join(", ")
                ));
                for dep_id in missing {
                    self.ensure_running()?;
                    // A failed transitive install is reported, not fatal:
                    // the requesting plugin still gets its own chance to load
                    if let Err(e) = self.install_flow(sink, dep_id, None, None, true).await {
                        sink.emit(&format!("⚠ {prefix}Failed to install dependency {dep_id}: {e}"));
                    }
                }
            }

            if !resolution.outdated_plugins.is_empty() {
                let listing = resolution
                    .outdated_plugins
                    .iter()
                    .map(|(id, req)| format!("{id} (requires {req})"))
                    .collect::<Vec<_>>()
                    .join(", ");
                sink.emit(&format!(
                    "{prefix}Note: these installed dependencies are below the required version: {listing}"
                ));
            }

            python::install_requirements(&self.host, sink, &target_path, prefix).await;

            self.ensure_running()?;
            sink.emit(&format!("{prefix}Loading plugin file: {file_name}"));
            let loaded = self
                .host
                .load_plugin(&target_path.to_string_lossy())
                .await;
            if !loaded {
                if is_dependency {
                    sink.emit(&format!(
                        "⚠ {prefix}Plugin {plugin_id} failed to load and may affect the requesting plugin"
                    ));
                    return Ok(());
                }
                return Err(InstallError::HostLoadRefused {
                    plugin_id: plugin_id.to_string(),
                    path: target_path,
                });
            }

            self.delete_pending(sink, plugin_id, Some(&target_path), prefix).await;
            sink.emit(&format!("✓ {prefix}Plugin {plugin_id} loaded"));

            if !affected.is_empty() {
                sink.emit(&format!("{prefix}Restoring dependent plugins..."));
                for pid in &affected {
                    if self.host.load_plugin(pid).await {
                        sink.emit(&format!("{prefix}Restored dependent plugin: {pid}"));
                    } else {
                        sink.emit(&format!(
                            "⚠ {prefix}Could not restore dependent plugin {pid}, load it manually"
                        ));
                    }
                }
            }
            Ok(())
        })
    }

    /// Core uninstall logic; cascades through loaded plugins that depend on
    /// the target before touching it
    fn uninstall_flow<'a>(
        &'a self,
        sink: &'a TaskSink,
        plugin_id: &'a str,
        is_dependency: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), InstallError>> + Send + 'a>> {
        Box::pin(async move {
            let prefix = if is_dependency { "[cascade] " } else { "" };
            self.ensure_running()?;

            for pid in self.host.loaded_plugin_ids().await {
                if normalize_id(&pid) == normalize_id(plugin_id) {
                    continue;
                }
                let Some(dep_meta) = self.host.plugin_metadata(&pid).await else {
                    continue;
                };
                if dep_meta.dependencies.iter().any(|d| d.matches_id(plugin_id)) {
                    sink.emit(&format!(
                        "{prefix}Plugin {pid} depends on {plugin_id}, uninstalling it first"
                    ));
                    self.uninstall_flow(sink, &pid, true).await?;
                }
            }

            sink.emit(&format!("{prefix}Uninstalling plugin: {plugin_id}"));

            // Files go first: deleting before the unload keeps the host's
            // post-unload directory scan from rediscovering the plugin
            self.mark_for_deletion(plugin_id).await;
            self.delete_pending(sink, plugin_id, None, prefix).await;
            sink.emit(&format!("{prefix}Removed local files"));

            let still_loaded = self
                .host
                .loaded_plugin_ids()
                .await
                .iter()
                .any(|id| normalize_id(id) == normalize_id(plugin_id));
            if still_loaded && self.host.unload_plugin(plugin_id).await {
                sink.emit(&format!("✓ {prefix}Plugin {plugin_id} unloaded from memory"));
            }

            sink.emit(&format!("✓ {prefix}Plugin {plugin_id} uninstalled"));
            Ok(())
        })
    }

    /// Record every file the host attributes to `plugin_id`: the loaded
    /// file, plus unloaded plugin files whose detected id matches
    async fn mark_for_deletion(&self, plugin_id: &str) {
        let mut paths = Vec::new();
        if let Some(path) = self.host.plugin_file_path(plugin_id).await {
            paths.push(path);
        }
        for path in self.host.unloaded_plugin_files().await {
            let detected = archive::detect_plugin_id(&path).await;
            if detected.map(|id| normalize_id(&id)) == Some(normalize_id(plugin_id)) {
                paths.push(path);
            }
        }
        if !paths.is_empty() {
            self.pending.mark(plugin_id, paths);
        }
    }

    /// Delete everything marked for `plugin_id`, except `keep` (the freshly
    /// installed file may reuse the old file name). Files that survive the
    /// fallback are re-marked for a later attempt.
    async fn delete_pending(
        &self,
        sink: &TaskSink,
        plugin_id: &str,
        keep: Option<&Path>,
        prefix: &str,
    ) {
        let mut survivors: Vec<PathBuf> = Vec::new();
        for path in self.pending.take(plugin_id) {
            if keep == Some(path.as_path()) {
                continue;
            }
            if !pending::remove_file_with_fallback(&path).await {
                survivors.push(path);
            }
        }
        if !survivors.is_empty() {
            let listing = survivors
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            sink.emit(&format!(
                "⚠ {prefix}Some files are still locked and will be removed later: {listing}"
            ));
            self.pending.mark(plugin_id, survivors);
        }
    }

    fn ensure_running(&self) -> Result<(), InstallError> {
        if *self.shutdown.borrow() {
            Err(InstallError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Select the release matching `version` (by exact version or tag), or the
/// latest release when no version is pinned
fn find_release<'r>(plugin: &'r PluginData, version: Option<&str>) -> Option<&'r ReleaseData> {
    match version {
        None => plugin.latest_release(),
        Some(requested) => {
            let clean = requested.strip_prefix(['v', 'V']).unwrap_or(requested);
            plugin
                .releases
                .iter()
                .find(|r| r.version() == clean || r.tag_name == requested)
        }
    }
}
