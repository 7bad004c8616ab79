//! # PIM Core Errors
//!
//! Crate-level error type aggregating the per-subsystem failure taxonomies.
//!
//! Each subsystem defines its own `thiserror` enum ([`CatalogueError`],
//! [`RegistryError`], [`DownloadError`], [`ArchiveError`], [`InstallError`],
//! [`EngineError`]); this module folds them into one [`Error`] so callers at
//! the façade boundary handle a single type.
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::catalogue::error::CatalogueError;
use crate::download::error::DownloadError;
use crate::engine::error::EngineError;
use crate::installer::error::InstallError;
use crate::registry::error::RegistryError;
use crate::resolver::archive::ArchiveError;

/// Custom error type for the PIM engine
#[derive(Debug, ThisError)]
pub enum Error {
    /// Catalogue payload could not be understood
    #[error("Catalogue error: {0}")]
    Catalogue(#[from] CatalogueError),

    /// Registry fetch/cache error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Release download error
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Plugin archive error
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Install/uninstall task error
    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    /// Façade-level error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// I/O error with operation context
    #[error("I/O error during '{operation}' on '{}': {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
        operation: String,
    },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl Error {
    /// Helper to create an I/O error with path and operation context
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::Io {
            source,
            operation: operation.into(),
            path,
        }
    }
}
