use std::path::PathBuf;

use thiserror::Error;

use crate::catalogue::error::CatalogueError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to build the HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Catalogue fetch failed for '{url}': {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Catalogue fetch for '{url}' returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Catalogue cache I/O failed on '{}': {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] CatalogueError),
}
