use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_compression::tokio::bufread::XzDecoder;
use md5::{Digest, Md5};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::catalogue::{parse_catalogue, MetaRegistry};
use crate::constants;
use crate::registry::error::RegistryError;
use crate::registry::retry::RetryTracker;

/// Tunables for the registry manager; the defaults are production values,
/// tests compress the windows.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Cache files younger than this are served without a fetch
    pub cache_ttl: Duration,
    /// How long a repeatedly failing URL is left alone
    pub failure_cooldown: Duration,
    /// Consecutive failures after which the cooldown applies
    pub failure_threshold: u32,
    /// Per-fetch timeout
    pub fetch_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: constants::REGISTRY_CACHE_TTL,
            failure_cooldown: constants::REGISTRY_FAILURE_COOLDOWN,
            failure_threshold: constants::REGISTRY_FAILURE_THRESHOLD,
            fetch_timeout: constants::REGISTRY_FETCH_TIMEOUT,
        }
    }
}

/// Per-URL catalogue cache with TTL, failure backoff, and single-flight
/// fetch deduplication
#[derive(Debug)]
pub struct RegistryManager {
    cache_dir: PathBuf,
    config: RegistryConfig,
    http: reqwest::Client,
    retry: RetryTracker,
    // One gate per URL; holding it marks a fetch in flight
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RegistryManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self, RegistryError> {
        Self::with_config(cache_dir, RegistryConfig::default())
    }

    pub fn with_config(cache_dir: PathBuf, config: RegistryConfig) -> Result<Self, RegistryError> {
        std::fs::create_dir_all(&cache_dir).map_err(|source| RegistryError::Cache {
            path: cache_dir.clone(),
            source,
        })?;
        let http = reqwest::Client::builder()
            .user_agent(constants::REGISTRY_USER_AGENT)
            .timeout(config.fetch_timeout)
            .build()
            .map_err(RegistryError::Client)?;
        Ok(Self {
            cache_dir,
            config,
            http,
            retry: RetryTracker::new(),
            inflight: Mutex::new(HashMap::new()),
        })
    }

    /// Catalogue metadata for `url`.
    ///
    /// Serving order: failure cooldown (stale cache or empty, no network),
    /// then fresh cache unless `ignore_ttl`, then a deduplicated fetch with
    /// stale-cache fallback. This method never fails outward.
    pub async fn get_meta(&self, url: &str, ignore_ttl: bool) -> MetaRegistry {
        let cache_file = self.cache_path(url);

        if self.retry.in_cooldown(url, self.config.failure_threshold, self.config.failure_cooldown) {
            log::debug!("Catalogue '{url}' is cooling down after repeated failures, skipping fetch");
            return self.load_cached(&cache_file, url).await.unwrap_or_else(MetaRegistry::empty);
        }

        if !ignore_ttl && self.cache_is_fresh(&cache_file).await {
            if let Some(meta) = self.load_cached(&cache_file, url).await {
                return meta;
            }
        }

        let gate = self.flight_gate(url).await;
        let _fetching = gate.lock().await;

        // Another caller may have refreshed the cache while we waited
        if !ignore_ttl && self.cache_is_fresh(&cache_file).await {
            if let Some(meta) = self.load_cached(&cache_file, url).await {
                return meta;
            }
        }

        match self.fetch_to_cache(url, &cache_file).await {
            Ok(()) => {
                self.retry.clear(url);
                self.load_cached(&cache_file, url).await.unwrap_or_else(MetaRegistry::empty)
            }
            Err(e) => {
                let attempts = self.retry.record_failure(url);
                log::error!("Catalogue fetch failed (attempt {attempts}): {e}");
                self.load_cached(&cache_file, url).await.unwrap_or_else(MetaRegistry::empty)
            }
        }
    }

    /// Deterministic cache path for a catalogue URL: the official catalogue
    /// uses a fixed name, everything else a hash of the URL
    pub(crate) fn cache_path(&self, url: &str) -> PathBuf {
        if url == constants::OFFICIAL_CATALOGUE_URL {
            self.cache_dir.join(constants::OFFICIAL_CACHE_FILE)
        } else {
            let mut hasher = Md5::new();
            hasher.update(url.as_bytes());
            let digest = hex::encode(hasher.finalize());
            self.cache_dir.join(format!("repo_{digest}.json"))
        }
    }

    async fn cache_is_fresh(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => SystemTime::now()
                .duration_since(modified)
                .map(|age| age < self.config.cache_ttl)
                .unwrap_or(true),
            Err(_) => false,
        }
    }

    async fn load_cached(&self, path: &Path, url: &str) -> Option<MetaRegistry> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::error!("Failed to read catalogue cache '{}': {e}", path.display());
                return None;
            }
        };
        match parse_catalogue(&raw, Some(url)) {
            Ok(meta) => {
                log::debug!("Loaded {} plugins from '{url}'", meta.len());
                Some(meta)
            }
            Err(e) => {
                log::error!("Failed to parse catalogue cache '{}': {e}", path.display());
                None
            }
        }
    }

    async fn fetch_to_cache(&self, url: &str, cache_file: &Path) -> Result<(), RegistryError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| RegistryError::Fetch { url: url.to_string(), source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status { url: url.to_string(), status });
        }
        let body = response
            .bytes()
            .await
            .map_err(|source| RegistryError::Fetch { url: url.to_string(), source })?;

        if url.ends_with(".xz") {
            // Keep the compressed payload next to the cache file while
            // decompressing, then drop it
            let xz_file = append_extension(cache_file, "xz");
            tokio::fs::write(&xz_file, &body)
                .await
                .map_err(|source| RegistryError::Cache { path: xz_file.clone(), source })?;
            self.decompress_xz(&xz_file, cache_file).await?;
            if let Err(e) = tokio::fs::remove_file(&xz_file).await {
                log::warn!("Could not remove transient '{}': {e}", xz_file.display());
            }
        } else {
            tokio::fs::write(cache_file, &body)
                .await
                .map_err(|source| RegistryError::Cache { path: cache_file.to_path_buf(), source })?;
        }
        Ok(())
    }

    async fn decompress_xz(&self, xz_file: &Path, json_file: &Path) -> Result<(), RegistryError> {
        let input = tokio::fs::File::open(xz_file)
            .await
            .map_err(|source| RegistryError::Cache { path: xz_file.to_path_buf(), source })?;
        let mut decoder = XzDecoder::new(BufReader::new(input));
        let mut output = tokio::fs::File::create(json_file)
            .await
            .map_err(|source| RegistryError::Cache { path: json_file.to_path_buf(), source })?;
        tokio::io::copy(&mut decoder, &mut output)
            .await
            .map_err(|source| RegistryError::Cache { path: json_file.to_path_buf(), source })?;
        output
            .flush()
            .await
            .map_err(|source| RegistryError::Cache { path: json_file.to_path_buf(), source })?;
        Ok(())
    }

    async fn flight_gate(&self, url: &str) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().await;
        inflight.entry(url.to_string()).or_default().clone()
    }
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
