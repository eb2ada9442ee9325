//! Directory-backed image registry
//!
//! Serves catalog images from a mirror on disk, the way an air-gapped
//! installation carries them. Image `host/path/name:tag` lives in
//! `<root>/host/path/name/tag/`; digest-pinned references use the digest
//! (with `:` replaced by `-`) as the directory name.
//!
//! The digest of an image is the SHA-256 over the relative path and contents
//! of every file, visited in sorted order, so it changes whenever any file is
//! added, removed, renamed or edited.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use super::{ArtifactFetcher, DigestProbe, FetchLimits};
use crate::image::ImageRef;

/// Image registry rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalImageRegistry {
    root: PathBuf,
}

impl LocalImageRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the files of `image`
    pub fn image_dir(&self, image: &str) -> Result<PathBuf> {
        let image = ImageRef::parse(image)?;

        let mut dir = self.root.clone();
        for segment in image.repository().split('/') {
            dir.push(segment.replace(':', "_"));
        }
        dir.push(image.identifier().replace(':', "-"));
        Ok(dir)
    }

    /// Replace the content of `image` with the files under `source`
    pub fn push(&self, image: &str, source: &Path) -> Result<PathBuf> {
        let dir = self.image_dir(image)?;
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to replace image directory: {}", dir.display()))?;
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create image directory: {}", dir.display()))?;

        for (relative, path) in image_files(source)? {
            let target = dir.join(&relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&path, &target)
                .with_context(|| format!("Failed to copy {} into {image}", path.display()))?;
        }

        tracing::debug!("Pushed {} to {}", image, dir.display());
        Ok(dir)
    }

    /// Delete `image` from the registry; deleting a missing image is a no-op
    pub fn remove(&self, image: &str) -> Result<()> {
        let dir = self.image_dir(image)?;
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove image directory: {}", dir.display()))?;
        }
        Ok(())
    }

    fn existing_image_dir(&self, image: &str) -> Result<PathBuf> {
        let dir = self.image_dir(image)?;
        if !dir.is_dir() {
            anyhow::bail!(
                "image {} not found in local registry {}",
                image,
                self.root.display()
            );
        }
        Ok(dir)
    }
}

impl DigestProbe for LocalImageRegistry {
    fn digest(&self, image: &str) -> Result<String> {
        let dir = self.existing_image_dir(image)?;

        let mut hasher = Sha256::new();
        let mut buffer = [0; 8192];

        for (relative, path) in image_files(&dir)? {
            hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
            hasher.update([0u8]);

            let mut file = File::open(&path)
                .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
            loop {
                let bytes_read = file.read(&mut buffer)?;
                if bytes_read == 0 {
                    break;
                }
                hasher.update(&buffer[..bytes_read]);
            }
        }

        Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
    }
}

impl ArtifactFetcher for LocalImageRegistry {
    fn fetch(&self, image: &str, destination: &Path, limits: &FetchLimits) -> Result<()> {
        let dir = self.existing_image_dir(image)?;
        let started = Instant::now();
        let mut total: u64 = 0;

        std::fs::create_dir_all(destination).with_context(|| {
            format!(
                "Failed to create download directory: {}",
                destination.display()
            )
        })?;

        for (relative, path) in image_files(&dir)? {
            if started.elapsed() > limits.timeout {
                anyhow::bail!(
                    "fetching {} timed out after {:?}",
                    image,
                    limits.timeout
                );
            }

            let size = std::fs::metadata(&path)?.len();
            total = total.saturating_add(size);
            if let Some(max) = limits.max_bytes {
                if total > max {
                    anyhow::bail!(
                        "image {} exceeds the size limit: more than {} bytes",
                        image,
                        max
                    );
                }
            }

            let target = destination.join(&relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&path, &target)
                .with_context(|| format!("Failed to copy {} from {image}", path.display()))?;
        }

        tracing::debug!("Fetched {} ({} bytes) into {}", image, total, destination.display());
        Ok(())
    }
}

/// Regular files under `dir` as (relative path, absolute path), sorted
fn image_files(dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir)?.to_path_buf();
        files.push((relative, entry.path().to_path_buf()));
    }
    Ok(files)
}
