//! YAML-backed catalog store
//!
//! The catalog file (`plugin_inventory.yaml`) lists plugins with their
//! per-version artifacts, and plugin groups. The metadata overlay
//! (`plugin_inventory_metadata.yaml`) lists the plugin versions and groups an
//! air-gapped mirror actually carries; merging it drops everything else.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::{
    CatalogStore, PluginGroup, PluginGroupFilter, PluginInventoryEntry, PluginInventoryFilter,
    Target,
};
use crate::version;

/// Version keyword resolving to the recommended (plugins) or newest (groups) version
const VERSION_LATEST: &str = "latest";

/// A catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    /// API version
    pub api_version: String,

    /// Kind (PluginInventory)
    pub kind: String,

    #[serde(default)]
    pub plugins: Vec<PluginInventoryEntry>,

    #[serde(default)]
    pub groups: Vec<PluginGroup>,
}

impl Default for CatalogDocument {
    fn default() -> Self {
        Self {
            api_version: "plugdex.dev/v1".to_string(),
            kind: "PluginInventory".to_string(),
            plugins: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl CatalogDocument {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("Failed to parse plugin inventory YAML")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).context("Failed to serialize plugin inventory")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plugin inventory: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to load plugin inventory: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_yaml()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write plugin inventory: {}", path.display()))
    }

    /// Plugins matching the filter, each restricted to matching artifacts
    ///
    /// A version or platform filter narrows the artifact map of each entry;
    /// entries left without artifacts are not returned.
    pub fn filter_plugins(&self, filter: &PluginInventoryFilter) -> Vec<PluginInventoryEntry> {
        let mut matches: Vec<PluginInventoryEntry> = self
            .plugins
            .iter()
            .filter(|p| filter.include_hidden || !p.hidden)
            .filter(|p| filter.name.as_ref().map_or(true, |n| &p.name == n))
            .filter(|p| filter.target.map_or(true, |t| p.target == t))
            .filter_map(|p| {
                let mut entry = p.clone();

                if let Some(wanted) = &filter.version {
                    let wanted = if wanted == VERSION_LATEST {
                        &p.recommended_version
                    } else {
                        wanted
                    };
                    entry.artifacts.retain(|v, _| v == wanted);
                }

                for artifacts in entry.artifacts.values_mut() {
                    artifacts.retain(|a| {
                        filter.os.as_ref().map_or(true, |os| &a.os == os)
                            && filter.arch.as_ref().map_or(true, |arch| &a.arch == arch)
                    });
                }
                entry.artifacts.retain(|_, artifacts| !artifacts.is_empty());

                if entry.artifacts.is_empty() {
                    None
                } else {
                    Some(entry)
                }
            })
            .collect();

        matches.sort_by(|a, b| (&a.name, a.target).cmp(&(&b.name, b.target)));
        matches
    }

    /// Plugin groups matching the filter
    pub fn filter_groups(&self, filter: &PluginGroupFilter) -> Vec<PluginGroup> {
        let mut matches: Vec<PluginGroup> = self
            .groups
            .iter()
            .filter(|g| filter.include_hidden || !g.hidden)
            .filter(|g| filter.vendor.as_ref().map_or(true, |v| &g.vendor == v))
            .filter(|g| filter.publisher.as_ref().map_or(true, |p| &g.publisher == p))
            .filter(|g| filter.name.as_ref().map_or(true, |n| &g.name == n))
            .cloned()
            .collect();

        match filter.version.as_deref() {
            None => {}
            Some(VERSION_LATEST) => matches = newest_group_versions(matches),
            Some(wanted) => matches.retain(|g| g.version == wanted),
        }

        matches.sort_by(|a, b| a.id().cmp(&b.id()));
        matches
    }

    /// Keep only the plugin versions and groups listed in the overlay
    ///
    /// A plugin whose recommended version is dropped falls back to its newest
    /// remaining version; a plugin left without versions is removed.
    pub fn apply_metadata(&mut self, metadata: &CatalogMetadataDocument) {
        let plugin_keys: HashSet<(&str, Target, &str)> = metadata
            .plugins
            .iter()
            .map(|p| (p.name.as_str(), p.target, p.version.as_str()))
            .collect();
        let group_keys: HashSet<(&str, &str, &str, &str)> = metadata
            .groups
            .iter()
            .map(|g| {
                (
                    g.vendor.as_str(),
                    g.publisher.as_str(),
                    g.name.as_str(),
                    g.version.as_str(),
                )
            })
            .collect();

        for plugin in &mut self.plugins {
            let (name, target) = (plugin.name.clone(), plugin.target);
            plugin
                .artifacts
                .retain(|v, _| plugin_keys.contains(&(name.as_str(), target, v.as_str())));

            if !plugin.artifacts.contains_key(&plugin.recommended_version) {
                let mut versions: Vec<String> = plugin.artifacts.keys().cloned().collect();
                // Unparseable versions sort last; the newest parseable one still wins
                let _ = version::sort_versions(&mut versions);
                plugin.recommended_version = versions
                    .iter()
                    .rev()
                    .find(|v| version::parse_version(v).is_some())
                    .or(versions.last())
                    .cloned()
                    .unwrap_or_default();
            }
        }
        self.plugins.retain(|p| !p.artifacts.is_empty());

        self.groups.retain(|g| {
            group_keys.contains(&(
                g.vendor.as_str(),
                g.publisher.as_str(),
                g.name.as_str(),
                g.version.as_str(),
            ))
        });
    }
}

/// For each group identity keep only its newest version
fn newest_group_versions(groups: Vec<PluginGroup>) -> Vec<PluginGroup> {
    let mut newest: BTreeMap<(String, String, String), PluginGroup> = BTreeMap::new();
    for group in groups {
        let key = (
            group.vendor.clone(),
            group.publisher.clone(),
            group.name.clone(),
        );
        let replace = match newest.get(&key) {
            None => true,
            Some(current) => {
                match (
                    version::parse_version(&group.version),
                    version::parse_version(&current.version),
                ) {
                    (Some(candidate), Some(existing)) => candidate > existing,
                    (Some(_), None) => true,
                    (None, Some(_)) => false,
                    (None, None) => group.version > current.version,
                }
            }
        };
        if replace {
            newest.insert(key, group);
        }
    }
    newest.into_values().collect()
}

/// A plugin version carried by an air-gapped mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPluginEntry {
    pub name: String,
    #[serde(default)]
    pub target: Target,
    pub version: String,
}

/// A plugin group version carried by an air-gapped mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataGroupEntry {
    pub vendor: String,
    pub publisher: String,
    pub name: String,
    pub version: String,
}

/// The metadata overlay file of an air-gapped mirror
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMetadataDocument {
    pub api_version: String,

    /// Kind (PluginInventoryMetadata)
    pub kind: String,

    #[serde(default)]
    pub plugins: Vec<MetadataPluginEntry>,

    #[serde(default)]
    pub groups: Vec<MetadataGroupEntry>,
}

impl Default for CatalogMetadataDocument {
    fn default() -> Self {
        Self {
            api_version: "plugdex.dev/v1".to_string(),
            kind: "PluginInventoryMetadata".to_string(),
            plugins: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl CatalogMetadataDocument {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("Failed to parse plugin inventory metadata YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read plugin inventory metadata: {}",
                path.display()
            )
        })?;
        Self::from_yaml(&content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)
            .context("Failed to serialize plugin inventory metadata")?;
        std::fs::write(path, content).with_context(|| {
            format!(
                "Failed to write plugin inventory metadata: {}",
                path.display()
            )
        })
    }
}

/// [`CatalogStore`] over YAML catalog files
#[derive(Debug, Clone, Default)]
pub struct YamlCatalogStore;

impl YamlCatalogStore {
    pub fn new() -> Self {
        Self
    }
}

impl CatalogStore for YamlCatalogStore {
    fn get_plugins(
        &self,
        catalog: &Path,
        filter: &PluginInventoryFilter,
    ) -> Result<Vec<PluginInventoryEntry>> {
        Ok(CatalogDocument::load(catalog)?.filter_plugins(filter))
    }

    fn get_plugin_groups(
        &self,
        catalog: &Path,
        filter: &PluginGroupFilter,
    ) -> Result<Vec<PluginGroup>> {
        Ok(CatalogDocument::load(catalog)?.filter_groups(filter))
    }

    fn merge_overlay(&self, overlay: &Path, base: &Path) -> Result<()> {
        let metadata = CatalogMetadataDocument::load(overlay)?;
        let mut document = CatalogDocument::load(base)?;

        let before = document.plugins.len();
        document.apply_metadata(&metadata);
        tracing::debug!(
            "Applied inventory metadata: {} of {} plugins kept, {} groups kept",
            document.plugins.len(),
            before,
            document.groups.len()
        );

        document.save(base)
    }
}
