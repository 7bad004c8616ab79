//! # Plugin Catalogue
//!
//! Typed representation of remote plugin catalogues and the version grammar
//! used by plugin dependencies.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`version`]**: Parses catalogue versions and version requirement
//!   predicates (`>=`, `<=`, `>`, `<`, `=`, wildcards, comma conjunction).
//! - **[`model`]**: The normalized data model ([`PluginData`],
//!   [`ReleaseData`], [`MetaRegistry`]) shared by both catalogue shapes.
//! - **[`parser`]**: Normalizes the two accepted repository JSON shapes
//!   (flat summary array, structured `plugins` object) into the model.
//! - **[`error`]**: Catalogue-specific error types.
//!
//! A [`MetaRegistry`] is immutable after parse; the registry manager hands
//! instances to callers by value.
pub mod error;
pub mod model;
pub mod parser;
pub mod version;

pub use model::{MetaRegistry, PluginData, PluginDependency, ReleaseData};
pub use parser::parse_catalogue;
pub use version::{PluginVersion, VersionRequirement};

/// Canonical form used whenever plugin identifiers are matched against each
/// other. Identifiers stay case-sensitive as map keys; only comparisons go
/// through here.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

// Test module declaration
#[cfg(test)]
mod tests;
