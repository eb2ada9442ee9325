//! Image reference parsing
//!
//! A catalog image is addressed as `[registry/]repository[:tag][@digest]`,
//! e.g. `registry.example.com/plugins/plugin-inventory:latest`. The metadata
//! overlay image of an air-gapped mirror lives next to it, in the same
//! repository path with a `-metadata` suffix.

use std::fmt;
use std::str::FromStr;

use crate::error::{DiscoveryError, Result};

/// Tag used when a reference carries none
pub const DEFAULT_TAG: &str = "latest";

/// Suffix appended to the catalog repository to locate its metadata overlay
pub const METADATA_REPOSITORY_SUFFIX: &str = "-metadata";

/// A parsed image reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    /// Parse an image reference
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| DiscoveryError::InvalidImage {
            image: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() {
            return Err(invalid("reference is empty"));
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(invalid("reference contains whitespace"));
        }

        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                let valid = digest
                    .split_once(':')
                    .map(|(algo, hex)| !algo.is_empty() && !hex.is_empty())
                    .unwrap_or(false);
                if !valid {
                    return Err(invalid("digest must have the form <algorithm>:<hex>"));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A ':' after the last '/' separates the tag; before it, it is a registry port
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(name[split + 1..].to_string()))
            }
            None => (name, None),
        };

        if let Some(tag) = &tag {
            if tag.is_empty() {
                return Err(invalid("tag is empty"));
            }
            if tag.len() > 128
                || !tag
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
            {
                return Err(invalid("tag contains invalid characters"));
            }
        }

        validate_repository(repository).map_err(|reason| invalid(reason))?;

        Ok(Self {
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Repository part, including the registry host
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The digest if pinned, otherwise the tag (defaulting to `latest`)
    pub fn identifier(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// Reference of the metadata overlay image derived from this catalog image
    ///
    /// `host/path/inventory:v1` becomes `host/path/inventory-metadata:v1`.
    /// A digest cannot be carried over to a different image, so digest-pinned
    /// references resolve to the overlay's `latest` tag unless they also
    /// carry a tag.
    pub fn metadata_image(&self) -> ImageRef {
        ImageRef {
            repository: format!("{}{}", self.repository, METADATA_REPOSITORY_SUFFIX),
            tag: Some(self.tag.clone().unwrap_or_else(|| DEFAULT_TAG.to_string())),
            digest: None,
        }
    }
}

fn validate_repository(repository: &str) -> std::result::Result<(), &'static str> {
    if repository.is_empty() {
        return Err("repository is empty");
    }

    let segments: Vec<&str> = repository.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err("repository has an empty path component");
    }

    // The first component is a registry host when it looks like one
    let has_host = segments.len() > 1
        && (segments[0].contains('.') || segments[0].contains(':') || segments[0] == "localhost");
    let path = if has_host { &segments[1..] } else { &segments[..] };

    let valid_path = path.iter().all(|segment| {
        segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
    });
    if !valid_path {
        return Err("repository path must be lowercase alphanumerics separated by '.', '_' or '-'");
    }

    Ok(())
}

impl FromStr for ImageRef {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
