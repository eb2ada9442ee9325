//! Catalog image trust
//!
//! [`TrustedDigestVerifier`] trusts an image when its current digest matches
//! the digest pinned for it in a trust list. [`SkipListVerifier`] wraps any
//! verifier and bypasses it for explicitly listed images, which is how
//! private mirrors without signatures are admitted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use super::{digest_hex, DigestProbe, SignatureVerifier};

/// Pinned digests, keyed by image reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustList {
    #[serde(default)]
    pub images: BTreeMap<String, String>,
}

impl TrustList {
    /// Load a trust list, or an empty one if the file does not exist
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trust list: {}", path.display()))?;
        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse trust list: {}", path.display()))
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml_ng::to_string(self).context("Failed to serialize trust list")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write trust list: {}", path.display()))
    }

    /// Pin `image` to `digest`, replacing any previous pin
    pub fn pin(&mut self, image: &str, digest: &str) {
        self.images
            .insert(image.to_string(), digest_hex(digest).to_string());
    }
}

/// Verifies images against pinned digests
pub struct TrustedDigestVerifier {
    probe: Arc<dyn DigestProbe>,
    trust: TrustList,
}

impl TrustedDigestVerifier {
    pub fn new(probe: Arc<dyn DigestProbe>, trust: TrustList) -> Self {
        Self { probe, trust }
    }
}

impl SignatureVerifier for TrustedDigestVerifier {
    fn verify(&self, image: &str) -> Result<()> {
        let expected = self
            .trust
            .images
            .get(image)
            .with_context(|| format!("image {image} is not in the trust list"))?;

        let actual = self.probe.digest(image)?;
        let actual = digest_hex(&actual);

        if actual != digest_hex(expected) {
            anyhow::bail!(
                "digest verification failed for {}\nExpected: {}\nActual:   {}",
                image,
                expected,
                actual
            );
        }

        tracing::debug!("Verified digest of {}: {}", image, actual);
        Ok(())
    }
}

/// Skips verification for listed images and delegates the rest
pub struct SkipListVerifier {
    inner: Arc<dyn SignatureVerifier>,
    skip: HashSet<String>,
}

impl SkipListVerifier {
    pub fn new<I, S>(inner: Arc<dyn SignatureVerifier>, skip: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner,
            skip: skip.into_iter().map(Into::into).collect(),
        }
    }
}

impl SignatureVerifier for SkipListVerifier {
    fn verify(&self, image: &str) -> Result<()> {
        if self.skip.contains(image) {
            tracing::warn!(
                "Skipping the plugins discovery image signature verification for {:?}",
                image
            );
            return Ok(());
        }
        self.inner.verify(image)
    }
}
