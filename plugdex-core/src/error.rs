//! Discovery error types
//!
//! Every fatal condition of a refresh or query maps to one variant here, and
//! the variant names the reference or path involved. Errors coming from the
//! external collaborators (digest probe, verifier, fetcher, catalog store) are
//! opaque `anyhow::Error` values carried as the source.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which listing a discovery source was serving when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Plugins,
    Groups,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKind::Plugins => f.write_str("plugins"),
            ListKind::Groups => f.write_str("groups"),
        }
    }
}

/// Errors raised while refreshing or querying a discovery source
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The base catalog image digest could not be resolved
    #[error("plugins discovery image resolution failed. Please check that the repository image URL {image:?} is correct")]
    ImageResolution {
        image: String,
        #[source]
        source: anyhow::Error,
    },

    /// The image reference is malformed
    #[error("invalid image reference {image:?}: {reason}")]
    InvalidImage { image: String, reason: String },

    /// The catalog image signature is not trusted
    #[error("signature verification failed for plugin inventory image {image}")]
    SignatureVerification {
        image: String,
        #[source]
        source: anyhow::Error,
    },

    /// The base catalog image could not be downloaded
    #[error("failed to download OCI image {image} from discovery '{discovery}'")]
    Download {
        discovery: String,
        image: String,
        #[source]
        source: anyhow::Error,
    },

    /// The downloaded base image does not contain a catalog file
    #[error("image {image} does not contain the plugin inventory file '{file}'")]
    MissingCatalogFile { image: String, file: &'static str },

    /// The metadata overlay exceeds the configured size bound
    #[error("plugin inventory metadata from {image} is too large: {size} bytes (limit: {limit} bytes)")]
    OverlayTooLarge { image: String, size: u64, limit: u64 },

    /// The metadata overlay was downloaded but could not be applied
    #[error("error while updating inventory database based on the inventory metadata database")]
    OverlayMerge {
        #[source]
        source: anyhow::Error,
    },

    /// The refreshed catalog could not be copied into the cache
    #[error("failed to promote plugin inventory to {path}")]
    Promotion {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source cache directory could not be created or read
    #[error("failed to access cache directory {path}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A temporary download location could not be created
    #[error("unable to create temp directory")]
    TempDir {
        #[source]
        source: std::io::Error,
    },

    /// The catalog store failed to answer a query
    #[error("failed to query the plugin inventory of discovery '{discovery}'")]
    Inventory {
        discovery: String,
        #[source]
        source: anyhow::Error,
    },

    /// A refresh failed while a discovery source was serving a listing
    #[error("unable to fetch the inventory of discovery '{discovery}' for {kind}")]
    Source {
        discovery: String,
        kind: ListKind,
        #[source]
        source: Box<DiscoveryError>,
    },
}

impl DiscoveryError {
    /// Log errors that indicate an untrusted or tampered catalog
    pub fn log_if_security_critical(&self) {
        match self {
            DiscoveryError::SignatureVerification { .. } => {
                tracing::error!(target: "security", "CATALOG TRUST VIOLATION: {}", self);
            }
            DiscoveryError::Source { source, .. } => source.log_if_security_critical(),
            _ => {}
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
