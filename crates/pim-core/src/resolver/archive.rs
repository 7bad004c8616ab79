//! Plugin archive inspection: bundled manifest, requirements file, id
//! detection for files the host has not loaded.
//!
//! Zip opening and inflation are synchronous CPU/disk work; the public
//! functions run them on the blocking pool so a slow archive never stalls
//! an async worker thread.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::catalogue::parser::de_dependencies;
use crate::catalogue::PluginDependency;
use crate::constants;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to open plugin archive '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read plugin archive '{}': {source}", path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Plugin manifest in '{}' is invalid: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The manifest bundled inside a plugin archive
/// (`mcdreforged.plugin.json` / `mcdr_plugin.json`)
#[derive(Debug, Default, Deserialize)]
pub struct ArchiveManifest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "de_dependencies")]
    pub dependencies: Vec<PluginDependency>,
    #[serde(default, alias = "requirements")]
    pub python_requirements: Vec<String>,
}

/// Read the bundled plugin manifest, `None` when the archive carries none
pub async fn read_manifest(path: &Path) -> Result<Option<ArchiveManifest>, ArchiveError> {
    let owned = path.to_path_buf();
    run_blocking(path, move || read_manifest_sync(&owned)).await
}

/// Contents of the first `requirements.txt` found anywhere in the archive
pub async fn read_requirements(path: &Path) -> Result<Option<Vec<u8>>, ArchiveError> {
    let owned = path.to_path_buf();
    run_blocking(path, move || {
        read_entry_matching(&owned, |name| name.ends_with("requirements.txt"))
    })
    .await
}

/// Detect the plugin id of an on-disk plugin file: `.py` files use the file
/// stem, zip archives the bundled manifest. `None` when detection fails.
pub async fn detect_plugin_id(path: &Path) -> Option<String> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || detect_plugin_id_sync(&owned))
        .await
        .ok()
        .flatten()
}

/// Hop onto the blocking pool for zip work; a lost worker (panic) surfaces
/// as an archive error rather than tearing down the caller
async fn run_blocking<T: Send + 'static>(
    path: &Path,
    work: impl FnOnce() -> Result<T, ArchiveError> + Send + 'static,
) -> Result<T, ArchiveError> {
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => Err(ArchiveError::Open {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        }),
    }
}

fn read_manifest_sync(path: &Path) -> Result<Option<ArchiveManifest>, ArchiveError> {
    let entry = read_entry_matching(path, |name| {
        constants::PLUGIN_MANIFEST_NAMES.iter().any(|m| name.ends_with(m))
    })?;
    match entry {
        Some(bytes) => {
            let manifest = serde_json::from_slice(&bytes)
                .map_err(|source| ArchiveError::Manifest { path: path.to_path_buf(), source })?;
            Ok(Some(manifest))
        }
        None => Ok(None),
    }
}

fn detect_plugin_id_sync(path: &Path) -> Option<String> {
    if path.extension().is_some_and(|ext| ext == "py") {
        return path.file_stem().map(|s| s.to_string_lossy().into_owned());
    }
    match read_manifest_sync(path) {
        Ok(Some(manifest)) => manifest.id,
        Ok(None) => None,
        Err(e) => {
            log::debug!("Could not detect plugin id of '{}': {e}", path.display());
            None
        }
    }
}

fn read_entry_matching(
    path: &Path,
    matches: impl Fn(&str) -> bool,
) -> Result<Option<Vec<u8>>, ArchiveError> {
    let file = std::fs::File::open(path)
        .map_err(|source| ArchiveError::Open { path: path.to_path_buf(), source })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|source| ArchiveError::Zip { path: path.to_path_buf(), source })?;

    let name = archive.file_names().find(|n| matches(n)).map(str::to_string);
    let Some(name) = name else {
        return Ok(None);
    };

    let mut entry = archive
        .by_name(&name)
        .map_err(|source| ArchiveError::Zip { path: path.to_path_buf(), source })?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|source| ArchiveError::Open { path: path.to_path_buf(), source })?;
    Ok(Some(bytes))
}
