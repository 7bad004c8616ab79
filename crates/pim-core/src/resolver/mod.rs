//! # Dependency Resolver
//!
//! Decides what an install needs: missing plugins, outdated plugins,
//! interpreter package requirements, and environment issues. The resolver
//! never installs anything.
pub mod archive;

pub use archive::{detect_plugin_id, ArchiveError, ArchiveManifest};

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::catalogue::{normalize_id, MetaRegistry, PluginDependency, PluginVersion};
use crate::constants;
use crate::host::HostBridge;

/// Outcome of a resolution pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resolution {
    /// Dependencies that are not currently loaded, in declared order
    pub missing_plugins: Vec<String>,
    /// Loaded dependencies whose version fails the requirement,
    /// keyed by plugin id with the violated requirement string
    pub outdated_plugins: BTreeMap<String, String>,
    /// Interpreter package requirements declared by the archive manifest
    pub python_requirements: Vec<String>,
    /// Host runtime / interpreter version mismatches
    pub environment_issues: Vec<String>,
}

impl Resolution {
    /// Missing plugins that are actual plugins, with the host runtime and
    /// interpreter identifiers filtered out
    pub fn missing_installable(&self) -> Vec<&str> {
        self.missing_plugins
            .iter()
            .map(String::as_str)
            .filter(|id| {
                let norm = normalize_id(id);
                norm != constants::HOST_RUNTIME_ID && norm != constants::INTERPRETER_ID
            })
            .collect()
    }
}

/// Computes a [`Resolution`] for one plugin against a catalogue snapshot
/// and, optionally, its freshly downloaded archive
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    host: Arc<dyn HostBridge>,
}

impl DependencyResolver {
    pub fn new(host: Arc<dyn HostBridge>) -> Self {
        Self { host }
    }

    /// Resolve `plugin_id`'s dependencies.
    ///
    /// Declared dependencies come from the catalogue entry; when `archive`
    /// points at a downloaded file whose bundled manifest declares more, the
    /// two sets merge. An unreadable archive is treated as declaring nothing
    /// extra.
    pub async fn resolve(
        &self,
        plugin_id: &str,
        meta: &MetaRegistry,
        archive_path: Option<&Path>,
    ) -> Resolution {
        let mut resolution = Resolution::default();

        // Loaded plugin ids, keyed by normalized id for case-insensitive matching
        let loaded: HashMap<String, String> = self
            .host
            .loaded_plugin_ids()
            .await
            .into_iter()
            .map(|id| (normalize_id(&id), id))
            .collect();

        if let Some(plugin) = meta.plugin(plugin_id) {
            for dep in &plugin.dependencies {
                self.check_dependency(dep, &loaded, &mut resolution).await;
            }
        }

        if let Some(path) = archive_path {
            match archive::read_manifest(path).await {
                Ok(Some(manifest)) => {
                    for dep in &manifest.dependencies {
                        self.check_dependency(dep, &loaded, &mut resolution).await;
                    }
                    for requirement in manifest.python_requirements {
                        if !resolution.python_requirements.contains(&requirement) {
                            resolution.python_requirements.push(requirement);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    // Not fatal: the archive simply contributes no extra dependencies
                    log::error!("Failed to read archive dependencies: {e}");
                }
            }
        }

        resolution
    }

    async fn check_dependency(
        &self,
        dep: &PluginDependency,
        loaded: &HashMap<String, String>,
        resolution: &mut Resolution,
    ) {
        let norm = normalize_id(&dep.plugin_id);
        if norm == constants::HOST_RUNTIME_ID {
            check_environment("MCDReforged", &self.host.runtime_version(), dep, &mut resolution.environment_issues);
            return;
        }
        if norm == constants::INTERPRETER_ID {
            check_environment("Python", &self.host.interpreter_version(), dep, &mut resolution.environment_issues);
            return;
        }

        match loaded.get(&norm) {
            None => {
                if !resolution.missing_plugins.iter().any(|m| normalize_id(m) == norm) {
                    resolution.missing_plugins.push(dep.plugin_id.clone());
                }
            }
            Some(loaded_id) => {
                let Some(installed) = self.host.plugin_metadata(loaded_id).await else {
                    return;
                };
                let version = PluginVersion::new(&installed.version);
                // An installed version that does not evaluate to a version
                // tuple cannot be judged; it is left alone
                if version.semver().is_some() && !dep.requirement.accepts(&version) {
                    resolution
                        .outdated_plugins
                        .insert(dep.plugin_id.clone(), dep.requirement.constraint_string().to_string());
                }
            }
        }
    }
}

fn check_environment(label: &str, current: &str, dep: &PluginDependency, issues: &mut Vec<String>) {
    let version = PluginVersion::new(current);
    if !dep.requirement.accepts(&version) {
        issues.push(format!(
            "{label} version mismatch: requires {}, found {current}",
            dep.requirement
        ));
    }
}

// Test module declaration
#[cfg(test)]
mod tests;
