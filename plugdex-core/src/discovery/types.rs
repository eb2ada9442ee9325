use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::inventory::{ArtifactList, PluginGroup, Target};

/// Plugin groups are returned exactly as the catalog stores them
pub type DiscoveredGroup = PluginGroup;

/// How a plugin is installed relative to CLI contexts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PluginScope {
    #[default]
    Standalone,
    Context,
}

/// Installation status of a discovered plugin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginStatus {
    #[default]
    NotInstalled,
    Installed,
    UpdateAvailable,
}

/// Kind of discovery a plugin came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryType {
    #[default]
    #[serde(rename = "OCI")]
    Oci,
}

impl DiscoveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryType::Oci => "OCI",
        }
    }
}

impl fmt::Display for DiscoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin offered by a discovery source
///
/// `installed_version`, `context_name` and `status` describe the local
/// installation and are left unset by discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPlugin {
    pub name: String,
    pub target: Target,
    pub description: String,
    pub recommended_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,

    /// Available versions, ascending
    pub supported_versions: Vec<String>,

    /// Artifacts keyed by version
    pub distribution: BTreeMap<String, ArtifactList>,

    pub optional: bool,
    pub scope: PluginScope,

    /// Name of the discovery source
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_name: Option<String>,

    pub discovery_type: DiscoveryType,
    pub status: PluginStatus,
}
