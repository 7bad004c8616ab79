//! Terminal failure kinds of install/uninstall tasks. Non-terminal
//! conditions (environment mismatches, dependent restore failures,
//! interpreter package problems, locked files) surface as warning messages
//! on the task instead of error values.
use std::path::PathBuf;

use thiserror::Error;

use crate::download::DownloadError;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Plugin not found in the catalogue: {0}")]
    PluginNotFound(String),

    #[error("Version '{version}' of '{plugin_id}' not found")]
    VersionNotFound { plugin_id: String, version: String },

    #[error("Download of '{plugin_id}' failed: {source}")]
    DownloadFailed {
        plugin_id: String,
        #[source]
        source: DownloadError,
    },

    #[error("Host refused to load '{plugin_id}' from '{}'", path.display())]
    HostLoadRefused { plugin_id: String, path: PathBuf },

    #[error("Operation interrupted by shutdown")]
    Interrupted,

    #[error("Task queue is closed")]
    QueueClosed,
}
