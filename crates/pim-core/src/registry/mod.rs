//! # Catalogue Registry
//!
//! Fetches and caches catalogue metadata per URL. Responsibilities:
//!
//! - deterministic on-disk cache paths (official catalogue gets a fixed
//!   name, other URLs a hash-derived one),
//! - cache TTL and LZMA (`.xz`) transport decompression,
//! - failure backoff so a broken repository is not hammered,
//! - per-URL single-flight so concurrent callers share one fetch.
//!
//! [`RegistryManager::get_meta`] never fails outward: broken fetches fall
//! back to stale cache when present and to an empty registry otherwise.
pub mod error;
pub mod manager;
pub mod retry;

pub use manager::{RegistryConfig, RegistryManager};
pub use retry::RetryTracker;

// Test module declaration
#[cfg(test)]
mod tests;
