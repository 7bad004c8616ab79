use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Process-wide set of files marked for removal once the host no longer
/// holds them, keyed per plugin id. The last worker to mark a plugin wins
/// its cleanup.
#[derive(Debug, Default)]
pub struct PendingDeletes {
    paths: Mutex<HashMap<String, Vec<PathBuf>>>,
}

impl PendingDeletes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark files of `plugin_id` for deletion; duplicates collapse
    pub fn mark(&self, plugin_id: &str, paths: impl IntoIterator<Item = PathBuf>) {
        let mut map = self.lock();
        let entry = map.entry(plugin_id.to_string()).or_default();
        for path in paths {
            if !entry.contains(&path) {
                entry.push(path);
            }
        }
    }

    /// Remove and return everything marked for `plugin_id`
    pub fn take(&self, plugin_id: &str) -> Vec<PathBuf> {
        self.lock().remove(plugin_id).unwrap_or_default()
    }

    /// Currently marked files for `plugin_id`
    pub fn marked(&self, plugin_id: &str) -> Vec<PathBuf> {
        self.lock().get(plugin_id).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<PathBuf>>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Delete a file, escalating to a platform-specific fallback when the
/// plain unlink fails (e.g. the host still maps the file). Returns whether
/// the file is gone.
pub async fn remove_file_with_fallback(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            log::warn!("Could not remove '{}': {e}, trying fallback", path.display());
            force_remove(path).await
        }
    }
}

#[cfg(windows)]
async fn force_remove(path: &Path) -> bool {
    // On Windows the file may be mapped by the host process; `del /f` can
    // succeed where unlink fails, and a reboot-scheduled delete is the last
    // resort the caller handles by re-marking the file.
    let _ = tokio::process::Command::new("cmd")
        .args(["/c", "del", "/f", "/q"])
        .arg(path)
        .output()
        .await;
    !path.exists()
}

#[cfg(not(windows))]
async fn force_remove(path: &Path) -> bool {
    // One delayed retry; POSIX unlink rarely needs more
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let _ = tokio::fs::remove_file(path).await;
    !path.exists()
}
