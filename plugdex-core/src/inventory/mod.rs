//! Plugin inventory (catalog) storage
//!
//! The catalog image of a discovery source carries a single catalog file
//! describing every plugin and plugin group it offers. An air-gapped mirror
//! additionally publishes a metadata image whose file lists what was actually
//! mirrored; that overlay is merged onto the catalog before it is cached.
//!
//! The storage engine is pluggable through [`CatalogStore`]. The bundled
//! [`YamlCatalogStore`] keeps the catalog as a YAML document.

mod types;
mod yaml;

use std::path::Path;

pub use types::{
    Artifact, ArtifactList, PluginGroup, PluginGroupFilter, PluginGroupMember,
    PluginInventoryEntry, PluginInventoryFilter, Target,
};
pub use yaml::{
    CatalogDocument, CatalogMetadataDocument, MetadataGroupEntry, MetadataPluginEntry,
    YamlCatalogStore,
};

/// Name of the catalog file inside a catalog image and inside the cache
pub const CATALOG_FILE_NAME: &str = "plugin_inventory.yaml";

/// Name of the overlay file inside a metadata image
pub const CATALOG_METADATA_FILE_NAME: &str = "plugin_inventory_metadata.yaml";

/// Query and overlay operations over a catalog file
pub trait CatalogStore: Send + Sync {
    /// Plugins of the catalog at `catalog` matching `filter`
    fn get_plugins(
        &self,
        catalog: &Path,
        filter: &PluginInventoryFilter,
    ) -> anyhow::Result<Vec<PluginInventoryEntry>>;

    /// Plugin groups of the catalog at `catalog` matching `filter`
    fn get_plugin_groups(
        &self,
        catalog: &Path,
        filter: &PluginGroupFilter,
    ) -> anyhow::Result<Vec<PluginGroup>>;

    /// Apply the overlay file onto the catalog file at `base`, in place
    fn merge_overlay(&self, overlay: &Path, base: &Path) -> anyhow::Result<()>;
}
