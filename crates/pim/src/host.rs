use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use pim_core::host::{HostBridge, LoadedPluginMeta};
use pim_core::resolver::archive;

/// File-backed [`HostBridge`] for running the engine without a live server.
///
/// There is no runtime to hand plugins to, so every detectable plugin file
/// in the plugin directory counts as loaded, "loading" a file validates it,
/// and unloading always succeeds. Install/uninstall tasks still exercise
/// the full download/resolve/swap pipeline against the real filesystem.
pub struct StandaloneHost {
    plugin_dir: PathBuf,
    cache_dir: PathBuf,
    runtime_version: String,
    interpreter_version: String,
    interpreter_command: String,
}

impl StandaloneHost {
    pub fn new(
        plugin_dir: PathBuf,
        cache_dir: PathBuf,
        runtime_version: String,
        interpreter_version: String,
        interpreter_command: String,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(&plugin_dir)?;
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            plugin_dir,
            cache_dir,
            runtime_version,
            interpreter_version,
            interpreter_command,
        })
    }

    fn plugin_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.plugin_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| is_plugin_file(p))
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    }

    async fn file_of(&self, plugin_id: &str) -> Option<PathBuf> {
        for path in self.plugin_files() {
            if archive::detect_plugin_id(&path).await.as_deref() == Some(plugin_id) {
                return Some(path);
            }
        }
        None
    }
}

fn is_plugin_file(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    pim_core::constants::PLUGIN_FILE_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

impl fmt::Debug for StandaloneHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandaloneHost")
            .field("plugin_dir", &self.plugin_dir)
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

#[async_trait]
impl HostBridge for StandaloneHost {
    async fn loaded_plugin_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for path in self.plugin_files() {
            if let Some(id) = archive::detect_plugin_id(&path).await {
                ids.push(id);
            }
        }
        ids
    }

    async fn plugin_metadata(&self, plugin_id: &str) -> Option<LoadedPluginMeta> {
        let path = self.file_of(plugin_id).await?;
        let manifest = archive::read_manifest(&path).await.ok().flatten()?;
        Some(LoadedPluginMeta {
            version: manifest.version.unwrap_or_default(),
            dependencies: manifest.dependencies,
        })
    }

    async fn plugin_file_path(&self, plugin_id: &str) -> Option<PathBuf> {
        self.file_of(plugin_id).await
    }

    async fn unloaded_plugin_files(&self) -> Vec<PathBuf> {
        // Every plugin file counts as loaded here
        Vec::new()
    }

    async fn load_plugin(&self, id_or_path: &str) -> bool {
        let path = Path::new(id_or_path);
        if path.exists() {
            let ok = archive::detect_plugin_id(path).await.is_some();
            if ok {
                log::info!("Validated plugin file {}", path.display());
            }
            return ok;
        }
        self.file_of(id_or_path).await.is_some()
    }

    async fn unload_plugin(&self, plugin_id: &str) -> bool {
        log::debug!("Releasing plugin {plugin_id} (no live runtime)");
        true
    }

    fn plugin_directory(&self) -> PathBuf {
        self.plugin_dir.clone()
    }

    fn cache_directory(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    fn runtime_version(&self) -> String {
        self.runtime_version.clone()
    }

    fn interpreter_version(&self) -> String {
        self.interpreter_version.clone()
    }

    fn interpreter_command(&self) -> String {
        self.interpreter_command.clone()
    }
}
