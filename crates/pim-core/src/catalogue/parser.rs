//! Normalizes the two accepted repository JSON shapes into [`MetaRegistry`].
//!
//! Shape 1 ("flat") is a plain array of plugin summary objects; shape 2
//! ("structured") is an object carrying a `plugins` map of
//! `{meta, release: {releases: [...]}}` entries. Malformed entries are
//! skipped, never fatal; list order from the document is preserved.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::catalogue::error::CatalogueError;
use crate::catalogue::model::{MetaRegistry, PluginData, PluginDependency, ReleaseData};

/// The two catalogue wire shapes, classified before any per-entry parsing
enum CatalogueDocument {
    Flat(Vec<Value>),
    Structured(serde_json::Map<String, Value>),
}

/// Parse a raw catalogue payload into a registry.
///
/// Entries without an `id`, and entries that fail per-field validation, are
/// dropped with a debug log; only an unrecognized top-level shape is an error.
pub fn parse_catalogue(raw: &str, source_url: Option<&str>) -> Result<MetaRegistry, CatalogueError> {
    let value: Value = serde_json::from_str(raw)?;
    let document = classify(value)?;

    let plugins = match document {
        CatalogueDocument::Flat(entries) => parse_flat(entries),
        CatalogueDocument::Structured(entries) => parse_structured(entries),
    };
    Ok(MetaRegistry::from_plugins(plugins, source_url))
}

fn classify(value: Value) -> Result<CatalogueDocument, CatalogueError> {
    match value {
        Value::Array(entries) => Ok(CatalogueDocument::Flat(entries)),
        Value::Object(mut object) => match object.remove("plugins") {
            Some(Value::Object(plugins)) => Ok(CatalogueDocument::Structured(plugins)),
            _ => Err(CatalogueError::UnrecognizedShape),
        },
        _ => Err(CatalogueError::UnrecognizedShape),
    }
}

fn parse_flat(entries: Vec<Value>) -> Vec<PluginData> {
    let mut plugins = Vec::new();
    for entry in entries {
        let entry: FlatEntry = match serde_json::from_value(entry) {
            Ok(e) => e,
            Err(e) => {
                log::debug!("Skipping malformed catalogue entry: {e}");
                continue;
            }
        };
        if entry.id.is_empty() {
            continue;
        }

        // A flat repository only advertises its latest version; synthesize a
        // single release so the install path stays shape-agnostic.
        let releases = match &entry.latest_version {
            Some(latest) if !latest.is_empty() => vec![ReleaseData {
                name: format!("v{latest}"),
                tag_name: format!("v{latest}"),
                created_at: entry.last_update_time.clone(),
                description: String::new(),
                prerelease: false,
                url: String::new(),
                download_url: String::new(),
                download_count: entry.downloads,
                size: 0,
                file_name: format!("{}.mcdr", entry.id),
            }],
            _ => Vec::new(),
        };

        let mut plugin = PluginData {
            id: entry.id.clone(),
            name: entry.name.unwrap_or_else(|| entry.id.clone()),
            version: entry.version,
            description: entry.description,
            authors: entry.authors,
            link: entry.repository_url,
            dependencies: entry.dependencies,
            python_requirements: entry.requirements,
            releases,
            repo_owner: String::new(),
            repo_name: String::new(),
        };
        plugin.derive_repo();
        plugins.push(plugin);
    }
    plugins
}

fn parse_structured(entries: serde_json::Map<String, Value>) -> Vec<PluginData> {
    let mut plugins = Vec::new();
    for (plugin_id, entry) in entries {
        let entry: StructuredEntry = match serde_json::from_value(entry) {
            Ok(e) => e,
            Err(e) => {
                log::debug!("Skipping malformed catalogue entry '{plugin_id}': {e}");
                continue;
            }
        };
        let meta = entry.meta.unwrap_or_default();

        let releases = entry
            .release
            .map(|info| parse_releases(info.releases))
            .unwrap_or_default();

        let mut plugin = PluginData {
            id: meta.id.filter(|id| !id.is_empty()).unwrap_or(plugin_id),
            name: String::new(),
            version: meta.version,
            description: meta.description,
            authors: meta.authors,
            link: meta.link,
            dependencies: meta.dependencies,
            python_requirements: meta.requirements,
            releases,
            repo_owner: String::new(),
            repo_name: String::new(),
        };
        plugin.name = meta.name.unwrap_or_else(|| plugin.id.clone());
        plugin.derive_repo();
        plugins.push(plugin);
    }
    plugins
}

fn parse_releases(entries: Vec<Value>) -> Vec<ReleaseData> {
    let mut releases = Vec::new();
    for entry in entries {
        let raw: RawRelease = match serde_json::from_value(entry) {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Skipping malformed release entry: {e}");
                continue;
            }
        };
        let asset = raw.asset.unwrap_or_default();
        releases.push(ReleaseData {
            name: raw.name,
            tag_name: raw.tag_name,
            created_at: raw.created_at,
            description: raw.description,
            prerelease: raw.prerelease,
            url: raw.url,
            download_url: asset.browser_download_url,
            download_count: asset.download_count,
            size: asset.size,
            file_name: asset.name,
        });
    }
    releases
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: String,
    #[serde(default, deserialize_with = "de_description")]
    description: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "de_authors")]
    authors: Vec<String>,
    #[serde(default)]
    repository_url: String,
    #[serde(default)]
    latest_version: Option<String>,
    #[serde(default)]
    last_update_time: String,
    #[serde(default)]
    downloads: u64,
    #[serde(default, deserialize_with = "de_dependencies")]
    dependencies: Vec<PluginDependency>,
    #[serde(default)]
    requirements: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StructuredEntry {
    #[serde(default)]
    meta: Option<StructuredMeta>,
    #[serde(default)]
    release: Option<StructuredReleaseInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct StructuredMeta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: String,
    #[serde(default, deserialize_with = "de_description")]
    description: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "de_authors")]
    authors: Vec<String>,
    #[serde(default)]
    link: String,
    #[serde(default, deserialize_with = "de_dependencies")]
    dependencies: Vec<PluginDependency>,
    #[serde(default)]
    requirements: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StructuredReleaseInfo {
    #[serde(default)]
    releases: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    #[serde(default)]
    name: String,
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    url: String,
    #[serde(default)]
    asset: Option<RawAsset>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAsset {
    #[serde(default)]
    browser_download_url: String,
    #[serde(default)]
    download_count: u64,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    name: String,
}

/// Dependency maps must keep their declared order, so they deserialize
/// through a map visitor into a `Vec` instead of a keyed container.
/// Also used for the manifest bundled inside plugin archives.
pub(crate) fn de_dependencies<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<PluginDependency>, D::Error> {
    struct DependencyVisitor;

    impl<'de> Visitor<'de> for DependencyVisitor {
        type Value = Vec<PluginDependency>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of plugin id to version requirement")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut deps = Vec::new();
            while let Some((plugin_id, requirement)) = map.next_entry::<String, String>()? {
                if deps.iter().any(|d: &PluginDependency| d.matches_id(&plugin_id)) {
                    continue;
                }
                deps.push(PluginDependency::new(&plugin_id, &requirement));
            }
            Ok(deps)
        }
    }

    de.deserialize_any(DependencyVisitor)
}

/// Descriptions appear either as a language map or as a bare string; a bare
/// string is treated as the `en_us` text.
fn de_description<'de, D: Deserializer<'de>>(de: D) -> Result<BTreeMap<String, String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Map(BTreeMap<String, Option<String>>),
        Text(String),
        None,
    }

    Ok(match Raw::deserialize(de)? {
        Raw::Map(map) => map
            .into_iter()
            .filter_map(|(lang, text)| text.map(|t| (lang, t)))
            .collect(),
        Raw::Text(text) => BTreeMap::from([("en_us".to_string(), text)]),
        Raw::None => BTreeMap::new(),
    })
}

/// Author lists appear either as names or as `{name, link}` objects
fn de_authors<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Name(String),
        Object { name: String },
    }

    let entries: Vec<Raw> = Vec::deserialize(de)?;
    Ok(entries
        .into_iter()
        .map(|a| match a {
            Raw::Name(name) => name,
            Raw::Object { name } => name,
        })
        .collect())
}
