//! Shared fixtures for the discovery integration tests
//!
//! Catalog images are published into a [`LocalImageRegistry`] under a temp
//! directory. The registry, verifier and store are wrapped so tests can count
//! collaborator calls and inject failures.

#![allow(dead_code)]

use plugdex_core::{
    ArtifactFetcher, CatalogStore, DigestProbe, DiscoveryBackend, DiscoveryOptions,
    DiscoverySource, FetchConfig, FetchLimits, ImageRef, LocalImageRegistry, PluginGroup,
    PluginGroupFilter, PluginInventoryEntry, PluginInventoryFilter, SignatureVerifier,
    YamlCatalogStore,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tempfile::TempDir;

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

pub const IMAGE: &str = "registry.example.com/plugins/plugin-inventory:latest";
pub const METADATA_IMAGE: &str = "registry.example.com/plugins/plugin-inventory-metadata:latest";
pub const CATALOG_FILE: &str = "plugin_inventory.yaml";
pub const METADATA_FILE: &str = "plugin_inventory_metadata.yaml";

pub const CATALOG_YAML: &str = r#"
apiVersion: plugdex.dev/v1
kind: PluginInventory
plugins:
  - name: cluster
    target: kubernetes
    description: Kubernetes cluster operations
    publisher: tkg
    vendor: vmware
    recommendedVersion: v1.10.0
    artifacts:
      v1.2.0:
        - image: vmware/tkg/linux/amd64/kubernetes/cluster:v1.2.0
          os: linux
          arch: amd64
      v1.10.0:
        - image: vmware/tkg/linux/amd64/kubernetes/cluster:v1.10.0
          os: linux
          arch: amd64
        - image: vmware/tkg/darwin/arm64/kubernetes/cluster:v1.10.0
          os: darwin
          arch: arm64
      bogus:
        - image: vmware/tkg/linux/amd64/kubernetes/cluster:bogus
          os: linux
          arch: amd64
  - name: login
    target: global
    description: Log in to an endpoint
    publisher: tkg
    vendor: vmware
    recommendedVersion: v0.3.0
    artifacts:
      v0.3.0:
        - image: vmware/tkg/linux/amd64/global/login:v0.3.0
          os: linux
          arch: amd64
  - name: secret
    target: global
    description: Deactivated plugin
    publisher: tkg
    vendor: vmware
    recommendedVersion: v0.1.0
    hidden: true
    artifacts:
      v0.1.0:
        - image: vmware/tkg/linux/amd64/global/secret:v0.1.0
          os: linux
          arch: amd64
groups:
  - vendor: vmware
    publisher: tkg
    name: default
    version: v1.0.0
    plugins:
      - name: cluster
        target: kubernetes
        version: v1.2.0
  - vendor: vmware
    publisher: tkg
    name: default
    version: v2.0.0
    plugins:
      - name: cluster
        target: kubernetes
        version: v1.10.0
        mandatory: true
  - vendor: vmware
    publisher: tkg
    name: internal
    version: v0.0.1
    hidden: true
"#;

/// Overlay of a mirror that carries only cluster v1.2.0 and group default v1.0.0
pub const METADATA_YAML: &str = r#"
apiVersion: plugdex.dev/v1
kind: PluginInventoryMetadata
plugins:
  - name: cluster
    target: kubernetes
    version: v1.2.0
groups:
  - vendor: vmware
    publisher: tkg
    name: default
    version: v1.0.0
"#;

/// Registry wrapper counting digest and fetch calls
pub struct CountingRegistry {
    pub inner: LocalImageRegistry,
    pub probes: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl DigestProbe for CountingRegistry {
    fn digest(&self, image: &str) -> anyhow::Result<String> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.inner.digest(image)
    }
}

impl ArtifactFetcher for CountingRegistry {
    fn fetch(&self, image: &str, destination: &Path, limits: &FetchLimits) -> anyhow::Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(image, destination, limits)
    }
}

/// Verifier that trusts everything until told otherwise
#[derive(Default)]
pub struct SwitchVerifier {
    pub calls: AtomicUsize,
    pub reject: AtomicBool,
}

impl SignatureVerifier for SwitchVerifier {
    fn verify(&self, image: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            anyhow::bail!("no valid signature found for {image}");
        }
        Ok(())
    }
}

/// YAML store whose overlay merge can be made to fail
#[derive(Default)]
pub struct SwitchStore {
    inner: YamlCatalogStore,
    pub fail_merge: AtomicBool,
}

impl CatalogStore for SwitchStore {
    fn get_plugins(
        &self,
        catalog: &Path,
        filter: &PluginInventoryFilter,
    ) -> anyhow::Result<Vec<PluginInventoryEntry>> {
        self.inner.get_plugins(catalog, filter)
    }

    fn get_plugin_groups(
        &self,
        catalog: &Path,
        filter: &PluginGroupFilter,
    ) -> anyhow::Result<Vec<PluginGroup>> {
        self.inner.get_plugin_groups(catalog, filter)
    }

    fn merge_overlay(&self, overlay: &Path, base: &Path) -> anyhow::Result<()> {
        if self.fail_merge.load(Ordering::SeqCst) {
            anyhow::bail!("inventory metadata database is locked");
        }
        self.inner.merge_overlay(overlay, base)
    }
}

/// A registry, a cache root and instrumented collaborators
pub struct Fixture {
    pub temp_dir: TempDir,
    pub registry: Arc<CountingRegistry>,
    pub verifier: Arc<SwitchVerifier>,
    pub store: Arc<SwitchStore>,
}

impl Fixture {
    pub fn new() -> Self {
        init_test_logging();

        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(CountingRegistry {
            inner: LocalImageRegistry::new(temp_dir.path().join("registry")),
            probes: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        });

        Self {
            temp_dir,
            registry,
            verifier: Arc::new(SwitchVerifier::default()),
            store: Arc::new(SwitchStore::default()),
        }
    }

    pub fn backend(&self) -> DiscoveryBackend {
        DiscoveryBackend::new(
            self.registry.clone(),
            self.verifier.clone(),
            self.registry.clone(),
            self.store.clone(),
        )
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.temp_dir.path().join("cache").join("default")
    }

    /// Source named `default` over [`IMAGE`]
    pub fn source(&self, options: DiscoveryOptions) -> DiscoverySource {
        DiscoverySource::new(
            "default",
            ImageRef::parse(IMAGE).unwrap(),
            self.cache_dir(),
            self.backend(),
        )
        .with_options(options)
        .with_fetch_config(FetchConfig::default())
    }

    pub fn publish(&self, image: &str, file_name: &str, content: &str) {
        let staging = TempDir::new().unwrap();
        std::fs::write(staging.path().join(file_name), content).unwrap();
        self.registry.inner.push(image, staging.path()).unwrap();
    }

    pub fn publish_catalog(&self, content: &str) {
        self.publish(IMAGE, CATALOG_FILE, content);
    }

    pub fn publish_metadata(&self, content: &str) {
        self.publish(METADATA_IMAGE, METADATA_FILE, content);
    }

    pub fn remove_metadata(&self) {
        self.registry.inner.remove(METADATA_IMAGE).unwrap();
    }

    /// Hex digest the registry currently reports for `image`
    pub fn digest_hex(&self, image: &str) -> String {
        let digest = self.registry.inner.digest(image).unwrap();
        digest.trim_start_matches("sha256:").to_string()
    }

    pub fn fetch_count(&self) -> usize {
        self.registry.fetches.load(Ordering::SeqCst)
    }

    pub fn verify_count(&self) -> usize {
        self.verifier.calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.registry.probes.store(0, Ordering::SeqCst);
        self.registry.fetches.store(0, Ordering::SeqCst);
        self.verifier.calls.store(0, Ordering::SeqCst);
    }
}

/// Digest marker file names in `dir`, sorted
pub fn markers(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("digest.") || name.starts_with("metadata.digest."))
        .collect();
    names.sort();
    names
}

/// Every file in `dir` with its content
pub fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (
                entry.file_name().to_string_lossy().into_owned(),
                std::fs::read(entry.path()).unwrap(),
            )
        })
        .collect()
}
