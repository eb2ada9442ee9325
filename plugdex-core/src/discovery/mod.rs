//! Plugin discovery over cached catalog images
//!
//! A [`DiscoverySource`] answers plugin and plugin-group queries for one
//! configured catalog image. Before each query it asks the [`CacheValidator`]
//! whether the cached catalog still matches the remote digests and, if not,
//! has the [`CatalogRefresher`] rebuild it:
//!
//! 1. verify the catalog image
//! 2. download it, and the metadata overlay image if there is one
//! 3. merge the overlay onto the catalog
//! 4. promote the result into the cache directory
//! 5. record the new digest markers
//!
//! A failure in steps 1-4 leaves the cache directory untouched.

mod aggregate;
mod cache;
mod digest;
mod refresh;
mod source;
mod types;

use std::sync::Arc;

use crate::inventory::{CatalogStore, YamlCatalogStore};
use crate::registry::{ArtifactFetcher, DigestProbe, SignatureVerifier};

pub use aggregate::{list_groups_from_sources, list_plugins_from_sources, DiscoveryReport};
pub use cache::{CacheStatus, CacheValidator, MarkerState};
pub use digest::{ImageDigest, MarkerKind, ABSENT_DIGEST_MARKER};
pub use refresh::CatalogRefresher;
pub use source::{
    DiscoveryOptions, DiscoverySource, GroupDiscoveryCriteria, PluginDiscoveryCriteria,
};
pub use types::{DiscoveredGroup, DiscoveredPlugin, DiscoveryType, PluginScope, PluginStatus};

/// External collaborators shared by the discovery components
#[derive(Clone)]
pub struct DiscoveryBackend {
    pub probe: Arc<dyn DigestProbe>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub store: Arc<dyn CatalogStore>,
}

impl DiscoveryBackend {
    pub fn new(
        probe: Arc<dyn DigestProbe>,
        verifier: Arc<dyn SignatureVerifier>,
        fetcher: Arc<dyn ArtifactFetcher>,
        store: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            probe,
            verifier,
            fetcher,
            store,
        }
    }

    /// Backend whose registry serves both digests and content, with the YAML store
    pub fn with_registry<R>(registry: Arc<R>, verifier: Arc<dyn SignatureVerifier>) -> Self
    where
        R: DigestProbe + ArtifactFetcher + 'static,
    {
        Self {
            probe: registry.clone(),
            verifier,
            fetcher: registry,
            store: Arc::new(YamlCatalogStore::new()),
        }
    }
}

impl std::fmt::Debug for DiscoveryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryBackend").finish_non_exhaustive()
    }
}
