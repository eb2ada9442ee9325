//! Image registry collaborators
//!
//! Discovery needs three things from wherever catalog images are hosted: the
//! current digest of an image, a trust decision about it, and its content.
//! Each is a trait so transports (OCI registries, local mirrors, test fakes)
//! can be swapped independently. All calls are blocking; implementations
//! enforce their own timeouts and report them as ordinary errors.

mod local;
mod verify;

use std::path::Path;
use std::time::Duration;

pub use local::LocalImageRegistry;
pub use verify::{SkipListVerifier, TrustList, TrustedDigestVerifier};

/// Default bound on a single image fetch (5 minutes)
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Resolves the current content digest of an image
pub trait DigestProbe: Send + Sync {
    /// Digest of `image`, either bare hex or `<algorithm>:<hex>`
    fn digest(&self, image: &str) -> anyhow::Result<String>;
}

/// Decides whether an image is trusted
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, image: &str) -> anyhow::Result<()>;
}

/// Downloads the files of an image into a directory
pub trait ArtifactFetcher: Send + Sync {
    fn fetch(&self, image: &str, destination: &Path, limits: &FetchLimits) -> anyhow::Result<()>;
}

/// Bounds applied to a single fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub timeout: Duration,
    /// Maximum total size of the fetched files; `None` is unbounded
    pub max_bytes: Option<u64>,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_bytes: None,
        }
    }
}

/// Hex part of a digest, without any `<algorithm>:` prefix
pub fn digest_hex(digest: &str) -> &str {
    let digest = digest.trim();
    digest
        .split_once(':')
        .map(|(_, hex)| hex)
        .unwrap_or(digest)
}
