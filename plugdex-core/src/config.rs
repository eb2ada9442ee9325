//! Discovery configuration
//!
//! The configured discovery sources, fetch bounds and query switches live in
//! a YAML file (`discovery.yaml` in the user config directory by default).
//! Environment overrides are read here and nowhere else; the rest of the
//! crate receives plain values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::discovery::{DiscoveryBackend, DiscoveryOptions, DiscoverySource};
use crate::image::ImageRef;
use crate::registry::{FetchLimits, SignatureVerifier, SkipListVerifier, DEFAULT_FETCH_TIMEOUT};

/// Lists hidden (deactivated) plugins and groups when set to a true value
pub const INCLUDE_HIDDEN_ENV_VAR: &str = "PLUGDEX_INCLUDE_DEACTIVATED_PLUGINS_FOR_TESTING";

/// Comma-separated catalog images whose signature verification is skipped
pub const SKIP_LIST_ENV_VAR: &str = "PLUGDEX_SIGNATURE_VERIFICATION_SKIP_LIST";

/// Default bound on the size of a catalog image (256 MiB)
pub const DEFAULT_MAX_CATALOG_SIZE_BYTES: u64 = 256 * 1024 * 1024;

/// Default bound on the size of a metadata overlay (64 MiB)
pub const DEFAULT_MAX_OVERLAY_SIZE_BYTES: u64 = 64 * 1024 * 1024;

const CONFIG_FILE_NAME: &str = "discovery.yaml";

/// A configured discovery source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source name, unique within the configuration
    pub name: String,

    /// Catalog image reference
    pub image: String,
}

/// Bounds applied to catalog downloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// `null` disables the bound
    #[serde(default = "default_max_catalog_size")]
    pub max_catalog_size_bytes: Option<u64>,

    /// `null` disables the bound
    #[serde(default = "default_max_overlay_size")]
    pub max_overlay_size_bytes: Option<u64>,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

fn default_max_catalog_size() -> Option<u64> {
    Some(DEFAULT_MAX_CATALOG_SIZE_BYTES)
}

fn default_max_overlay_size() -> Option<u64> {
    Some(DEFAULT_MAX_OVERLAY_SIZE_BYTES)
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            max_catalog_size_bytes: default_max_catalog_size(),
            max_overlay_size_bytes: default_max_overlay_size(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Transport bounds for catalog and overlay downloads
    ///
    /// The overlay size bound is checked on the downloaded overlay file
    /// instead, so an oversized overlay fails the refresh rather than being
    /// mistaken for a missing one.
    pub fn catalog_limits(&self) -> FetchLimits {
        FetchLimits {
            timeout: self.timeout(),
            max_bytes: self.max_catalog_size_bytes,
        }
    }
}

/// Discovery configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    /// Root of the per-source cache directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub include_hidden: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature_verification_skip_list: Vec<String>,
}

impl DiscoveryConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml_ng::from_str(content).context("Failed to parse discovery config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check names are unique and usable as directories and images parse
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut dirs = HashSet::new();

        for source in &self.sources {
            if source.name.trim().is_empty() {
                anyhow::bail!("Discovery source name must not be empty");
            }
            if !names.insert(source.name.as_str()) {
                anyhow::bail!("Discovery source '{}' is configured twice", source.name);
            }
            if !dirs.insert(sanitize_source_name(&source.name)) {
                anyhow::bail!(
                    "Discovery source '{}' would share a cache directory with another source",
                    source.name
                );
            }
            ImageRef::parse(&source.image)
                .with_context(|| format!("Invalid image for discovery source '{}'", source.name))?;
        }

        Ok(())
    }

    /// Apply the environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Some(include_hidden) = env_flag(INCLUDE_HIDDEN_ENV_VAR) {
            self.include_hidden = include_hidden;
        }

        if let Ok(skip_list) = std::env::var(SKIP_LIST_ENV_VAR) {
            for image in skip_list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if !self.signature_verification_skip_list.iter().any(|s| s == image) {
                    self.signature_verification_skip_list.push(image.to_string());
                }
            }
        }
    }

    /// Root of the per-source cache directories
    pub fn cache_root(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => directories::ProjectDirs::from("dev", "plugdex", "plugdex")
                .map(|dirs| dirs.cache_dir().join("discovery"))
                .context("Could not determine cache directory"),
        }
    }

    /// Cache directory dedicated to the source called `name`
    pub fn source_cache_dir(&self, name: &str) -> Result<PathBuf> {
        Ok(self.cache_root()?.join(sanitize_source_name(name)))
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            include_hidden: self.include_hidden,
            ..DiscoveryOptions::default()
        }
    }

    /// Discovery sources for every configured source, in configuration order
    ///
    /// Images on the skip list bypass `backend.verifier`.
    pub fn build_sources(&self, backend: &DiscoveryBackend) -> Result<Vec<DiscoverySource>> {
        self.validate()?;

        let mut backend = backend.clone();
        if !self.signature_verification_skip_list.is_empty() {
            let verifier: Arc<dyn SignatureVerifier> = Arc::new(SkipListVerifier::new(
                backend.verifier.clone(),
                self.signature_verification_skip_list.iter().cloned(),
            ));
            backend.verifier = verifier;
        }

        let options = self.discovery_options();
        self.sources
            .iter()
            .map(|source| -> Result<DiscoverySource> {
                let image = ImageRef::parse(&source.image)?;
                Ok(DiscoverySource::new(
                    &source.name,
                    image,
                    self.source_cache_dir(&source.name)?,
                    backend.clone(),
                )
                .with_options(options.clone())
                .with_fetch_config(self.fetch.clone()))
            })
            .collect()
    }
}

/// Manages the discovery configuration file
pub struct SourceRegistry {
    config: DiscoveryConfig,
    config_path: PathBuf,
}

impl SourceRegistry {
    /// Load the configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::default_config_path()?)
    }

    /// Load the configuration from `config_path`, or start empty if it does not exist
    pub fn load_from_path(config_path: PathBuf) -> Result<Self> {
        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read discovery config: {}", config_path.display())
            })?;
            DiscoveryConfig::from_yaml(&content).with_context(|| {
                format!("Failed to load discovery config: {}", config_path.display())
            })?
        } else {
            DiscoveryConfig::default()
        };

        Ok(Self {
            config,
            config_path,
        })
    }

    fn default_config_path() -> Result<PathBuf> {
        let config_dir = directories::ProjectDirs::from("dev", "plugdex", "plugdex")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .context("Could not determine config directory")?;
        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    pub fn config_path(&self) -> &std::path::Path {
        &self.config_path
    }

    /// The configuration as stored, without environment overrides
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// The configuration with environment overrides applied
    pub fn effective_config(&self) -> DiscoveryConfig {
        let mut config = self.config.clone();
        config.apply_env_overrides();
        config
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(&self.config)
            .context("Failed to serialize discovery config")?;

        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write discovery config: {}",
                self.config_path.display()
            )
        })
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.config.sources
    }

    pub fn get_source(&self, name: &str) -> Option<&SourceConfig> {
        self.config.sources.iter().find(|s| s.name == name)
    }

    /// Add a new source
    pub fn add_source(&mut self, name: &str, image: &str) -> Result<()> {
        if self.get_source(name).is_some() {
            anyhow::bail!("Discovery source '{}' already exists", name);
        }

        let mut config = self.config.clone();
        config.sources.push(SourceConfig {
            name: name.to_string(),
            image: image.to_string(),
        });
        config.validate()?;

        self.config = config;
        Ok(())
    }

    /// Point an existing source at a different image
    pub fn update_source(&mut self, name: &str, image: &str) -> Result<()> {
        ImageRef::parse(image)
            .with_context(|| format!("Invalid image for discovery source '{name}'"))?;

        let source = self
            .config
            .sources
            .iter_mut()
            .find(|s| s.name == name)
            .with_context(|| format!("Discovery source '{name}' not found"))?;
        source.image = image.to_string();
        Ok(())
    }

    /// Remove a source by name
    pub fn remove_source(&mut self, name: &str) -> Result<()> {
        let initial_len = self.config.sources.len();
        self.config.sources.retain(|s| s.name != name);

        if self.config.sources.len() == initial_len {
            anyhow::bail!("Discovery source '{}' not found", name);
        }

        Ok(())
    }

    /// Discovery sources for the effective configuration
    pub fn build_sources(&self, backend: &DiscoveryBackend) -> Result<Vec<DiscoverySource>> {
        self.effective_config().build_sources(backend)
    }
}

/// Directory name for a source; characters other than ASCII alphanumerics,
/// `-` and `_` become `_`
pub fn sanitize_source_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Parse a boolean the way command-line flags are usually written
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Boolean environment variable; unset or unparseable values are `None`
pub fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|value| parse_bool(&value))
}
