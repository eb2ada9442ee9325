//! Catalog record and filter types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Platform or category a plugin applies to
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    /// Plugins that are not tied to a target
    #[default]
    #[serde(alias = "")]
    Global,
    #[serde(alias = "k8s")]
    Kubernetes,
    #[serde(alias = "tmc")]
    MissionControl,
    Operations,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Global => "global",
            Target::Kubernetes => "kubernetes",
            Target::MissionControl => "mission-control",
            Target::Operations => "operations",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = anyhow::Error;

    /// Parse a target name; `k8s` and `tmc` are accepted as aliases
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "global" => Ok(Target::Global),
            "kubernetes" | "k8s" => Ok(Target::Kubernetes),
            "mission-control" | "tmc" => Ok(Target::MissionControl),
            "operations" => Ok(Target::Operations),
            other => anyhow::bail!(
                "invalid target '{other}': expected one of kubernetes[k8s], mission-control[tmc], operations, global"
            ),
        }
    }
}

/// A downloadable binary of one plugin version for one platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// OCI image holding the binary
    #[serde(default)]
    pub image: String,

    /// Direct download location, when not distributed as an image
    #[serde(default)]
    pub uri: String,

    /// SHA-256 digest of the binary
    #[serde(default)]
    pub digest: String,

    pub os: String,
    pub arch: String,

    #[serde(default, rename = "type")]
    pub artifact_type: String,
}

/// Artifacts of a single plugin version, one per platform
pub type ArtifactList = Vec<Artifact>;

/// A plugin as stored in the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInventoryEntry {
    pub name: String,

    #[serde(default)]
    pub target: Target,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub publisher: String,

    #[serde(default)]
    pub vendor: String,

    #[serde(default)]
    pub recommended_version: String,

    /// Deactivated plugins stay in the catalog but are not listed by default
    #[serde(default)]
    pub hidden: bool,

    /// Artifacts keyed by version
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactList>,
}

/// A plugin reference inside a plugin group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginGroupMember {
    pub name: String,

    #[serde(default)]
    pub target: Target,

    pub version: String,

    #[serde(default)]
    pub mandatory: bool,
}

/// A named, versioned set of plugins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginGroup {
    pub vendor: String,
    pub publisher: String,
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub hidden: bool,

    #[serde(default)]
    pub plugins: Vec<PluginGroupMember>,
}

impl PluginGroup {
    /// Group identifier in the `vendor-publisher/name:version` form
    pub fn id(&self) -> String {
        format!(
            "{}-{}/{}:{}",
            self.vendor, self.publisher, self.name, self.version
        )
    }
}

/// Filter for plugin queries; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginInventoryFilter {
    pub name: Option<String>,
    pub target: Option<Target>,
    /// A concrete version, or `latest` for the recommended version
    pub version: Option<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
    pub include_hidden: bool,
}

/// Filter for plugin group queries; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginGroupFilter {
    pub vendor: Option<String>,
    pub publisher: Option<String>,
    pub name: Option<String>,
    /// A concrete version, or `latest` for the newest version of each group
    pub version: Option<String>,
    pub include_hidden: bool,
}
