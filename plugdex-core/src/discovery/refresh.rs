//! Catalog refresh
//!
//! Downloads happen in temporary directories that are dropped on every exit
//! path. The cache directory is only written once the catalog is complete:
//! first the catalog file (temp file + rename), then the digest markers.

use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};

use super::cache::CacheStatus;
use super::digest::MarkerKind;
use super::DiscoveryBackend;
use crate::config::FetchConfig;
use crate::error::{DiscoveryError, Result};
use crate::image::ImageRef;
use crate::inventory::{CATALOG_FILE_NAME, CATALOG_METADATA_FILE_NAME};

/// Rebuilds the cached catalog of one discovery source
#[derive(Debug, Clone)]
pub struct CatalogRefresher {
    discovery: String,
    cache_dir: PathBuf,
    backend: DiscoveryBackend,
    fetch: FetchConfig,
}

impl CatalogRefresher {
    pub fn new(
        discovery: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        backend: DiscoveryBackend,
        fetch: FetchConfig,
    ) -> Self {
        Self {
            discovery: discovery.into(),
            cache_dir: cache_dir.into(),
            backend,
            fetch,
        }
    }

    /// Verify, download, overlay and promote the catalog of `image`, then
    /// record the digests in `status`
    ///
    /// An overlay that was probed but could not be downloaded is recorded as
    /// absent, so the next check retries it.
    pub fn refresh(&self, image: &ImageRef, status: &CacheStatus) -> Result<()> {
        let overlay_applied = match self.refresh_catalog(image) {
            Ok(applied) => applied,
            Err(e) => {
                e.log_if_security_critical();
                return Err(e);
            }
        };

        if status.digest(MarkerKind::Metadata).is_present() && !overlay_applied {
            tracing::warn!(
                "Plugin inventory metadata for {} was not applied, it will be retried",
                image
            );
            status.without_overlay().commit();
        } else {
            status.commit();
        }
        Ok(())
    }

    /// Returns whether a metadata overlay was merged into the catalog
    fn refresh_catalog(&self, image: &ImageRef) -> Result<bool> {
        let reference = image.to_string();

        self.backend
            .verifier
            .verify(&reference)
            .map_err(|source| DiscoveryError::SignatureVerification {
                image: reference.clone(),
                source,
            })?;

        let base_dir = TempDir::new().map_err(|source| DiscoveryError::TempDir { source })?;
        self.backend
            .fetcher
            .fetch(&reference, base_dir.path(), &self.fetch.catalog_limits())
            .map_err(|source| DiscoveryError::Download {
                discovery: self.discovery.clone(),
                image: reference.clone(),
                source,
            })?;

        let catalog = base_dir.path().join(CATALOG_FILE_NAME);
        if !catalog.is_file() {
            return Err(DiscoveryError::MissingCatalogFile {
                image: reference,
                file: CATALOG_FILE_NAME,
            });
        }

        let overlay_dir = TempDir::new().map_err(|source| DiscoveryError::TempDir { source })?;
        let overlay = self.fetch_overlay(image, overlay_dir.path())?;
        if let Some(overlay) = &overlay {
            self.backend
                .store
                .merge_overlay(overlay, &catalog)
                .map_err(|source| DiscoveryError::OverlayMerge { source })?;
        }

        self.promote(&catalog)?;
        Ok(overlay.is_some())
    }

    /// Download the metadata overlay; `None` when there is no usable overlay
    fn fetch_overlay(&self, image: &ImageRef, destination: &Path) -> Result<Option<PathBuf>> {
        let metadata_image = image.metadata_image().to_string();

        if let Err(e) = self.backend.fetcher.fetch(
            &metadata_image,
            destination,
            &self.fetch.catalog_limits(),
        ) {
            tracing::debug!(
                "Plugin inventory metadata image {} not available: {:#}",
                metadata_image,
                e
            );
            return Ok(None);
        }

        let overlay = destination.join(CATALOG_METADATA_FILE_NAME);
        let size = match std::fs::metadata(&overlay) {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => {
                tracing::debug!(
                    "Metadata image {} has no {}, ignoring it",
                    metadata_image,
                    CATALOG_METADATA_FILE_NAME
                );
                return Ok(None);
            }
        };

        if let Some(limit) = self.fetch.max_overlay_size_bytes {
            if size > limit {
                return Err(DiscoveryError::OverlayTooLarge {
                    image: metadata_image,
                    size,
                    limit,
                });
            }
        }

        tracing::debug!("Applying plugin inventory metadata from {}", metadata_image);
        Ok(Some(overlay))
    }

    /// Replace the cached catalog file with `catalog`
    fn promote(&self, catalog: &Path) -> Result<()> {
        let target = self.cache_dir.join(CATALOG_FILE_NAME);
        let promotion_error = |source: std::io::Error| DiscoveryError::Promotion {
            path: target.clone(),
            source,
        };

        std::fs::create_dir_all(&self.cache_dir).map_err(promotion_error)?;
        let mut staged = NamedTempFile::new_in(&self.cache_dir).map_err(promotion_error)?;
        let mut source = std::fs::File::open(catalog).map_err(promotion_error)?;
        std::io::copy(&mut source, staged.as_file_mut()).map_err(promotion_error)?;
        staged.as_file().sync_all().map_err(promotion_error)?;
        staged
            .persist(&target)
            .map_err(|e| promotion_error(e.error))?;

        tracing::debug!("Promoted plugin inventory to {}", target.display());
        Ok(())
    }
}
