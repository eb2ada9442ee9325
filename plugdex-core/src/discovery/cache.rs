//! Digest-based cache validation
//!
//! Each cache directory must hold at most one marker per [`MarkerKind`].
//! [`CacheValidator::check`] compares the markers on disk with freshly probed
//! digests and works out how to reconcile them, without touching any file.
//! The reconciliation is carried out by [`CacheStatus::commit`] once a
//! refresh has promoted a new catalog, so a failed refresh leaves the
//! directory exactly as it was.

use std::io;
use std::path::{Path, PathBuf};

use super::digest::{ImageDigest, MarkerKind};
use super::DiscoveryBackend;
use crate::error::{DiscoveryError, Result};
use crate::image::ImageRef;
use crate::inventory::CATALOG_FILE_NAME;

/// Reconciliation needed for one marker kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerState {
    /// Exactly one marker exists and it records the current digest
    Current,
    /// The cache is out of date for this component
    Stale {
        /// Marker file name to create after a successful refresh
        expected: String,
        /// Marker files to delete after a successful refresh
        obsolete: Vec<PathBuf>,
    },
}

impl MarkerState {
    pub fn is_current(&self) -> bool {
        matches!(self, MarkerState::Current)
    }
}

/// Outcome of a cache check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    cache_dir: PathBuf,
    inventory_digest: ImageDigest,
    metadata_digest: ImageDigest,
    inventory: MarkerState,
    metadata: MarkerState,
}

impl CacheStatus {
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn digest(&self, kind: MarkerKind) -> &ImageDigest {
        match kind {
            MarkerKind::Inventory => &self.inventory_digest,
            MarkerKind::Metadata => &self.metadata_digest,
        }
    }

    pub fn state(&self, kind: MarkerKind) -> &MarkerState {
        match kind {
            MarkerKind::Inventory => &self.inventory,
            MarkerKind::Metadata => &self.metadata,
        }
    }

    /// True when at least one component is out of date
    pub fn needs_refresh(&self) -> bool {
        !(self.inventory.is_current() && self.metadata.is_current())
    }

    /// The same status, but recording the overlay as absent
    ///
    /// Used when an overlay image exists but was not applied, so the next
    /// check sees its digest differ from `none` and refreshes again.
    pub fn without_overlay(&self) -> CacheStatus {
        let expected = MarkerKind::Metadata.marker_file_name(&ImageDigest::Absent);
        let obsolete = match &self.metadata {
            MarkerState::Stale { obsolete, .. } => obsolete.clone(),
            MarkerState::Current => vec![self
                .cache_dir
                .join(MarkerKind::Metadata.marker_file_name(&self.metadata_digest))],
        };

        CacheStatus {
            metadata_digest: ImageDigest::Absent,
            metadata: MarkerState::Stale { expected, obsolete },
            ..self.clone()
        }
    }

    /// Delete obsolete markers and create the expected ones
    ///
    /// Best effort: a marker that cannot be written only means the next
    /// check refreshes again.
    pub fn commit(&self) {
        for kind in MarkerKind::ALL {
            let MarkerState::Stale { expected, obsolete } = self.state(kind) else {
                continue;
            };

            for marker in obsolete {
                match std::fs::remove_file(marker) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!("Failed to remove digest marker {}: {}", marker.display(), e)
                    }
                }
            }

            let path = self.cache_dir.join(expected);
            if let Err(e) = std::fs::File::create(&path) {
                tracing::warn!("Failed to create digest marker {}: {}", path.display(), e);
            }
        }
    }
}

/// Compares cached digest markers with the current remote digests
#[derive(Debug, Clone)]
pub struct CacheValidator {
    cache_dir: PathBuf,
    backend: DiscoveryBackend,
}

impl CacheValidator {
    pub fn new(cache_dir: impl Into<PathBuf>, backend: DiscoveryBackend) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            backend,
        }
    }

    /// Probe `image` and its metadata overlay and inspect the cache markers
    ///
    /// Fails only if the cache directory is unusable or the catalog image
    /// digest cannot be resolved. An unresolvable overlay means there is none.
    pub fn check(&self, image: &ImageRef) -> Result<CacheStatus> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|source| DiscoveryError::CacheDir {
            path: self.cache_dir.clone(),
            source,
        })?;

        let reference = image.to_string();
        let inventory_digest = self
            .backend
            .probe
            .digest(&reference)
            .map(|digest| ImageDigest::from_probe(&digest))
            .map_err(|source| DiscoveryError::ImageResolution {
                image: reference.clone(),
                source,
            })?;

        let metadata_image = image.metadata_image().to_string();
        let metadata_digest = match self.backend.probe.digest(&metadata_image) {
            Ok(digest) => ImageDigest::from_probe(&digest),
            Err(e) => {
                tracing::debug!("No plugin inventory metadata image {}: {:#}", metadata_image, e);
                ImageDigest::Absent
            }
        };

        let mut inventory = self.reconcile(MarkerKind::Inventory, &inventory_digest)?;
        let metadata = self.reconcile(MarkerKind::Metadata, &metadata_digest)?;

        if inventory.is_current() && !self.cache_dir.join(CATALOG_FILE_NAME).is_file() {
            tracing::debug!(
                "Plugin inventory missing from {}, refreshing",
                self.cache_dir.display()
            );
            inventory = MarkerState::Stale {
                expected: MarkerKind::Inventory.marker_file_name(&inventory_digest),
                obsolete: Vec::new(),
            };
        }

        Ok(CacheStatus {
            cache_dir: self.cache_dir.clone(),
            inventory_digest,
            metadata_digest,
            inventory,
            metadata,
        })
    }

    fn reconcile(&self, kind: MarkerKind, digest: &ImageDigest) -> Result<MarkerState> {
        let expected = kind.marker_file_name(digest);
        let markers = self.find_markers(kind)?;

        let current = markers.len() == 1
            && markers[0]
                .file_name()
                .is_some_and(|name| name == expected.as_str());
        if current {
            return Ok(MarkerState::Current);
        }

        if markers.len() > 1 {
            tracing::warn!(
                "Found {} {} digest markers in {}, discarding all of them",
                markers.len(),
                kind,
                self.cache_dir.display()
            );
        }
        Ok(MarkerState::Stale {
            expected,
            obsolete: markers,
        })
    }

    fn find_markers(&self, kind: MarkerKind) -> Result<Vec<PathBuf>> {
        let cache_error = |source: io::Error| DiscoveryError::CacheDir {
            path: self.cache_dir.clone(),
            source,
        };

        let pattern = kind.marker_pattern(&self.cache_dir);
        let entries = glob::glob(&pattern)
            .map_err(|e| cache_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        let mut markers = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| cache_error(io::Error::from(e)))?;
            if path.is_file() {
                markers.push(path);
            }
        }
        Ok(markers)
    }
}
