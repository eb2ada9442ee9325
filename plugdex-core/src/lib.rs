//! plugdex core library
//!
//! Discovery and caching engine for a CLI plugin manager. A discovery source
//! points at a remote catalog image (plus an optional metadata overlay image
//! for air-gapped mirrors); this crate keeps a digest-validated local copy of
//! that catalog and answers plugin and plugin-group queries against it.
//!
//! # Architecture
//!
//! ```text
//! DiscoverySource ──► CacheValidator ──► DigestProbe
//!        │                  │
//!        │                  └─ digest markers in the source cache dir
//!        │
//!        ├──────────► CatalogRefresher ──► SignatureVerifier
//!        │                  │           └► ArtifactFetcher (base + overlay)
//!        │                  └─ CatalogStore::merge_overlay, promote, mark
//!        │
//!        └──────────► CatalogStore::get_plugins / get_plugin_groups
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod image;
pub mod inventory;
pub mod registry;
pub mod version;

pub use config::{DiscoveryConfig, FetchConfig, SourceConfig, SourceRegistry};
pub use discovery::{
    list_groups_from_sources, list_plugins_from_sources, CacheStatus, CacheValidator,
    CatalogRefresher, DiscoveredGroup, DiscoveredPlugin, DiscoveryBackend, DiscoveryOptions,
    DiscoveryReport, DiscoverySource, DiscoveryType, GroupDiscoveryCriteria, ImageDigest,
    MarkerKind, MarkerState, PluginDiscoveryCriteria, PluginScope, PluginStatus,
};
pub use error::{DiscoveryError, ListKind, Result};
pub use image::ImageRef;
pub use inventory::{
    Artifact, CatalogStore, PluginGroup, PluginGroupFilter, PluginGroupMember,
    PluginInventoryEntry, PluginInventoryFilter, Target, YamlCatalogStore,
};
pub use registry::{
    ArtifactFetcher, DigestProbe, FetchLimits, LocalImageRegistry, SignatureVerifier,
    SkipListVerifier, TrustedDigestVerifier,
};
