//! # Release Downloader
//!
//! Streams a release artifact to a unique temp file in a scratch directory
//! and atomically moves it into place. Partial downloads never land on the
//! target path.
pub mod error;

pub use error::DownloadError;

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::constants;

/// Streaming downloader with an atomic move into the plugin directory
#[derive(Debug)]
pub struct ReleaseDownloader {
    http: reqwest::Client,
    scratch_dir: PathBuf,
}

impl ReleaseDownloader {
    /// `scratch_dir` hosts in-flight temp files; it is created on demand
    pub fn new(scratch_dir: PathBuf) -> Result<Self, DownloadError> {
        let http = reqwest::Client::builder()
            .user_agent(constants::DOWNLOADER_USER_AGENT)
            .build()
            .map_err(DownloadError::Client)?;
        Ok(Self { http, scratch_dir })
    }

    /// Download `url` to `target`, replacing any existing file there.
    ///
    /// The body is streamed chunk-wise to a temp file which is renamed onto
    /// the target only after the stream completed; on any failure the temp
    /// file is dropped and the target left untouched.
    pub async fn download(&self, url: &str, target: &Path, timeout: Duration) -> Result<(), DownloadError> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|source| DownloadError::Io { path: self.scratch_dir.clone(), source })?;

        // NamedTempFile removes the temp file on drop, which covers every
        // early-return below
        let temp = tempfile::Builder::new()
            .prefix("download_")
            .suffix(".tmp")
            .tempfile_in(&self.scratch_dir)
            .map_err(|source| DownloadError::Io { path: self.scratch_dir.clone(), source })?;
        let temp_path = temp.path().to_path_buf();

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| DownloadError::Http { url: url.to_string(), source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status { url: url.to_string(), status });
        }

        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|source| DownloadError::Io { path: temp_path.clone(), source })?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| DownloadError::Http { url: url.to_string(), source })?;
            file.write_all(&chunk)
                .await
                .map_err(|source| DownloadError::Io { path: temp_path.clone(), source })?;
        }
        file.flush()
            .await
            .map_err(|source| DownloadError::Io { path: temp_path.clone(), source })?;
        drop(file);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DownloadError::Io { path: parent.to_path_buf(), source })?;
        }
        match tokio::fs::remove_file(target).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(DownloadError::Io { path: target.to_path_buf(), source }),
        }
        // Rename into place; scratch and plugin directories can sit on
        // different filesystems, where a rename fails and a copy must do
        if let Err(e) = temp.persist(target) {
            let temp = e.file;
            tokio::fs::copy(temp.path(), target)
                .await
                .map_err(|source| DownloadError::Io { path: target.to_path_buf(), source })?;
        }
        Ok(())
    }
}

// Test module declaration
#[cfg(test)]
mod tests;
