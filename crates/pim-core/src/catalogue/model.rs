use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::catalogue::normalize_id;
use crate::catalogue::version::VersionRequirement;

/// Represents a dependency of one plugin on another
#[derive(Debug, Clone, Serialize)]
pub struct PluginDependency {
    /// The id of the required plugin
    pub plugin_id: String,

    /// The version requirement the installed plugin must satisfy
    pub requirement: VersionRequirement,
}

impl PluginDependency {
    /// Create a dependency with a parsed requirement string
    pub fn new(plugin_id: &str, requirement: &str) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            requirement: VersionRequirement::parse(requirement),
        }
    }

    /// Create a dependency satisfied by any version
    pub fn any(plugin_id: &str) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            requirement: VersionRequirement::any(),
        }
    }

    /// Whether this dependency addresses the given plugin id.
    /// Dependency names match case-insensitively.
    pub fn matches_id(&self, plugin_id: &str) -> bool {
        normalize_id(&self.plugin_id) == normalize_id(plugin_id)
    }
}

impl fmt::Display for PluginDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.plugin_id, self.requirement)
    }
}

/// One versioned artifact of a plugin, downloadable by URL
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseData {
    pub name: String,
    pub tag_name: String,
    pub created_at: String,
    pub description: String,
    pub prerelease: bool,
    pub url: String,
    pub download_url: String,
    pub download_count: u64,
    pub size: u64,
    pub file_name: String,
}

impl ReleaseData {
    /// Version of this release: the tag with a leading `v` stripped
    pub fn version(&self) -> &str {
        self.tag_name
            .strip_prefix(['v', 'V'])
            .unwrap_or(&self.tag_name)
    }
}

/// One catalogue entry: plugin metadata plus its ordered release history
/// (index 0 is the latest release)
#[derive(Debug, Clone, Serialize)]
pub struct PluginData {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Description texts keyed by language (`en_us`, `zh_cn`, ...)
    pub description: BTreeMap<String, String>,
    pub authors: Vec<String>,
    pub link: String,
    pub dependencies: Vec<PluginDependency>,
    pub python_requirements: Vec<String>,
    pub releases: Vec<ReleaseData>,
    pub repo_owner: String,
    pub repo_name: String,
}

impl PluginData {
    /// Latest release, when the plugin has any
    pub fn latest_release(&self) -> Option<&ReleaseData> {
        self.releases.first()
    }

    /// Latest release version, falling back to the metadata version
    pub fn latest_version(&self) -> &str {
        self.latest_release()
            .map(|r| r.version())
            .unwrap_or(&self.version)
    }

    /// Declared dependency on `plugin_id`, if any
    pub fn dependency(&self, plugin_id: &str) -> Option<&PluginDependency> {
        self.dependencies.iter().find(|d| d.matches_id(plugin_id))
    }

    /// Description text with a language preference (`zh_cn`, then `en_us`,
    /// then any), empty when the plugin carries none
    pub fn description_text(&self) -> &str {
        for lang in ["zh_cn", "en_us"] {
            if let Some(text) = self.description.get(lang) {
                return text;
            }
        }
        self.description.values().next().map(String::as_str).unwrap_or("")
    }

    /// Fill `repo_owner`/`repo_name` from a known hosting link
    pub(crate) fn derive_repo(&mut self) {
        if let Some(rest) = self.link.split("github.com/").nth(1) {
            let mut parts = rest.split('/');
            if let (Some(owner), Some(name)) = (parts.next(), parts.next()) {
                if !owner.is_empty() && !name.is_empty() {
                    self.repo_owner = owner.to_string();
                    self.repo_name = name.to_string();
                }
            }
        }
    }
}

/// Immutable snapshot of one catalogue: plugin data keyed by id.
/// The map is ordered so enumeration is deterministic.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetaRegistry {
    source_url: Option<String>,
    plugins: BTreeMap<String, PluginData>,
}

impl MetaRegistry {
    /// Registry with no plugins, used when every fetch and cache path failed
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_plugins(
        plugins: impl IntoIterator<Item = PluginData>,
        source_url: Option<&str>,
    ) -> Self {
        let plugins = plugins
            .into_iter()
            .filter(|p| !p.id.is_empty())
            .map(|p| (p.id.clone(), p))
            .collect();
        Self {
            source_url: source_url.map(str::to_string),
            plugins,
        }
    }

    /// URL this registry was parsed from, when known
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn plugin(&self, plugin_id: &str) -> Option<&PluginData> {
        self.plugins.get(plugin_id)
    }

    pub fn has_plugin(&self, plugin_id: &str) -> bool {
        self.plugins.contains_key(plugin_id)
    }

    pub fn plugins(&self) -> impl Iterator<Item = &PluginData> {
        self.plugins.values()
    }

    pub fn plugin_ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugins whose id, name, or any description text contains the keyword
    /// (case-insensitive). No keyword returns everything.
    pub fn filter(&self, keyword: Option<&str>) -> Vec<&PluginData> {
        let keyword = match keyword {
            Some(k) if !k.trim().is_empty() => k.trim().to_lowercase(),
            _ => return self.plugins().collect(),
        };
        self.plugins()
            .filter(|p| {
                p.id.to_lowercase().contains(&keyword)
                    || p.name.to_lowercase().contains(&keyword)
                    || p.description
                        .values()
                        .any(|d| d.to_lowercase().contains(&keyword))
            })
            .collect()
    }
}
