//! Discovery sources

use std::io;
use std::path::{Path, PathBuf};

use super::cache::CacheValidator;
use super::digest::MarkerKind;
use super::refresh::CatalogRefresher;
use super::types::{DiscoveredGroup, DiscoveredPlugin, DiscoveryType, PluginScope, PluginStatus};
use super::DiscoveryBackend;
use crate::config::{env_flag, FetchConfig, INCLUDE_HIDDEN_ENV_VAR};
use crate::error::{DiscoveryError, ListKind, Result};
use crate::image::ImageRef;
use crate::inventory::{
    PluginGroupFilter, PluginInventoryEntry, PluginInventoryFilter, Target, CATALOG_FILE_NAME,
};
use crate::version;

/// Restricts the plugins a source lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginDiscoveryCriteria {
    pub name: Option<String>,
    pub target: Option<Target>,
    pub version: Option<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
}

/// Restricts the plugin groups a source lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDiscoveryCriteria {
    pub vendor: Option<String>,
    pub publisher: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Per-source query behaviour
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Answer from the cached catalog without contacting the registry
    pub use_local_cache_only: bool,
    /// Also list hidden (deactivated) plugins and groups
    pub include_hidden: bool,
    pub plugin_criteria: Option<PluginDiscoveryCriteria>,
    pub group_criteria: Option<GroupDiscoveryCriteria>,
}

impl DiscoveryOptions {
    /// Default options, with `include_hidden` taken from the environment
    pub fn from_env() -> Self {
        Self {
            include_hidden: env_flag(INCLUDE_HIDDEN_ENV_VAR).unwrap_or(false),
            ..Self::default()
        }
    }

    pub fn plugin_filter(&self) -> PluginInventoryFilter {
        let criteria = self.plugin_criteria.clone().unwrap_or_default();
        PluginInventoryFilter {
            name: criteria.name,
            target: criteria.target,
            version: criteria.version,
            os: criteria.os,
            arch: criteria.arch,
            include_hidden: self.include_hidden,
        }
    }

    pub fn group_filter(&self) -> PluginGroupFilter {
        let criteria = self.group_criteria.clone().unwrap_or_default();
        PluginGroupFilter {
            vendor: criteria.vendor,
            publisher: criteria.publisher,
            name: criteria.name,
            version: criteria.version,
            include_hidden: self.include_hidden,
        }
    }
}

/// One configured catalog image and its cache directory
#[derive(Debug, Clone)]
pub struct DiscoverySource {
    name: String,
    image: ImageRef,
    cache_dir: PathBuf,
    backend: DiscoveryBackend,
    options: DiscoveryOptions,
    fetch: FetchConfig,
}

impl DiscoverySource {
    /// Create a source; `cache_dir` must not be shared with any other source
    pub fn new(
        name: impl Into<String>,
        image: ImageRef,
        cache_dir: impl Into<PathBuf>,
        backend: DiscoveryBackend,
    ) -> Self {
        Self {
            name: name.into(),
            image,
            cache_dir: cache_dir.into(),
            backend,
            options: DiscoveryOptions::default(),
            fetch: FetchConfig::default(),
        }
    }

    pub fn with_options(mut self, options: DiscoveryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_fetch_config(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    pub fn kind(&self) -> DiscoveryType {
        DiscoveryType::Oci
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Plugins of this source, refreshing the cached catalog first if needed
    pub fn list_plugins(&self) -> Result<Vec<DiscoveredPlugin>> {
        self.ensure_fresh(ListKind::Plugins)?;

        let entries = self
            .backend
            .store
            .get_plugins(&self.catalog_path(), &self.options.plugin_filter())
            .map_err(|source| self.inventory_error(source))?;

        Ok(entries
            .into_iter()
            .map(|entry| self.discovered_plugin(entry))
            .collect())
    }

    /// Plugin groups of this source, refreshing the cached catalog first if needed
    pub fn list_groups(&self) -> Result<Vec<DiscoveredGroup>> {
        self.ensure_fresh(ListKind::Groups)?;

        self.backend
            .store
            .get_plugin_groups(&self.catalog_path(), &self.options.group_filter())
            .map_err(|source| self.inventory_error(source))
    }

    /// Remove the cached catalog and every digest marker
    ///
    /// The next listing refreshes from the registry.
    pub fn clean_cache(&self) -> Result<()> {
        let cache_error = |source: io::Error| DiscoveryError::CacheDir {
            path: self.cache_dir.clone(),
            source,
        };

        let mut files = vec![self.catalog_path()];
        for kind in MarkerKind::ALL {
            let entries = glob::glob(&kind.marker_pattern(&self.cache_dir))
                .map_err(|e| cache_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
            for entry in entries {
                files.push(entry.map_err(|e| cache_error(io::Error::from(e)))?);
            }
        }

        for file in files {
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(cache_error(e)),
            }
        }

        tracing::debug!("Cleaned plugin inventory cache of discovery '{}'", self.name);
        Ok(())
    }

    fn catalog_path(&self) -> PathBuf {
        self.cache_dir.join(CATALOG_FILE_NAME)
    }

    fn ensure_fresh(&self, kind: ListKind) -> Result<()> {
        if self.options.use_local_cache_only {
            tracing::debug!(
                "Using the local plugin inventory cache of discovery '{}' only",
                self.name
            );
            return Ok(());
        }

        self.refresh_if_stale()
            .map_err(|source| DiscoveryError::Source {
                discovery: self.name.clone(),
                kind,
                source: Box::new(source),
            })
    }

    fn refresh_if_stale(&self) -> Result<()> {
        let validator = CacheValidator::new(&self.cache_dir, self.backend.clone());
        let status = validator.check(&self.image)?;

        if !status.needs_refresh() {
            tracing::debug!(
                "Plugin inventory of discovery '{}' is up to date",
                self.name
            );
            return Ok(());
        }

        tracing::info!(
            "Reading plugin inventory for {:?}, this will take a few seconds.",
            self.image.to_string()
        );
        CatalogRefresher::new(
            &self.name,
            &self.cache_dir,
            self.backend.clone(),
            self.fetch.clone(),
        )
        .refresh(&self.image, &status)
    }

    fn inventory_error(&self, source: anyhow::Error) -> DiscoveryError {
        DiscoveryError::Inventory {
            discovery: self.name.clone(),
            source,
        }
    }

    fn discovered_plugin(&self, entry: PluginInventoryEntry) -> DiscoveredPlugin {
        let mut versions: Vec<String> = entry.artifacts.keys().cloned().collect();
        if let Err(e) = version::sort_versions(&mut versions) {
            tracing::warn!("error parsing versions for plugin {}: {}", entry.name, e);
        }

        DiscoveredPlugin {
            name: entry.name,
            target: entry.target,
            description: entry.description,
            recommended_version: entry.recommended_version,
            installed_version: None,
            supported_versions: versions,
            distribution: entry.artifacts,
            optional: false,
            scope: PluginScope::Standalone,
            source: self.name.clone(),
            context_name: None,
            discovery_type: self.kind(),
            status: PluginStatus::NotInstalled,
        }
    }
}
