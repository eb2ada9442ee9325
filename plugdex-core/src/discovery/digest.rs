//! Digest markers
//!
//! A marker is an empty file in the source cache directory whose name records
//! the digest the cached catalog was built from: `digest.<hex>` for the
//! catalog image and `metadata.digest.<hex>` for the metadata overlay. An
//! absent overlay is recorded as `metadata.digest.none`.

use std::fmt;
use std::path::Path;

use crate::registry::digest_hex;

/// Marker value recorded for an image without a digest
pub const ABSENT_DIGEST_MARKER: &str = "none";

/// Current digest of one cache component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageDigest {
    /// No image, or the probe could not resolve one
    Absent,
    /// Hex digest, without the algorithm prefix
    Present(String),
}

impl ImageDigest {
    /// Normalize a probed digest; an empty one is [`ImageDigest::Absent`]
    pub fn from_probe(digest: &str) -> Self {
        match digest_hex(digest) {
            "" => ImageDigest::Absent,
            hex => ImageDigest::Present(hex.to_string()),
        }
    }

    /// Value used in the marker file name
    pub fn marker_value(&self) -> &str {
        match self {
            ImageDigest::Absent => ABSENT_DIGEST_MARKER,
            ImageDigest::Present(hex) => hex,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, ImageDigest::Present(_))
    }
}

impl fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker_value())
    }
}

/// The two independently tracked cache components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// The catalog image
    Inventory,
    /// The metadata overlay image
    Metadata,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 2] = [MarkerKind::Inventory, MarkerKind::Metadata];

    pub fn prefix(&self) -> &'static str {
        match self {
            MarkerKind::Inventory => "",
            MarkerKind::Metadata => "metadata.",
        }
    }

    /// Marker file name recording `digest`
    pub fn marker_file_name(&self, digest: &ImageDigest) -> String {
        format!("{}digest.{}", self.prefix(), digest.marker_value())
    }

    /// Glob matching every marker of this kind in `cache_dir`
    pub(crate) fn marker_pattern(&self, cache_dir: &Path) -> String {
        let dir = glob::Pattern::escape(&cache_dir.to_string_lossy());
        format!("{}/{}digest.*", dir.trim_end_matches('/'), self.prefix())
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerKind::Inventory => f.write_str("inventory"),
            MarkerKind::Metadata => f.write_str("metadata"),
        }
    }
}
