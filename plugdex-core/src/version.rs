//! Plugin version ordering
//!
//! Catalog versions are semantic versions, usually written with a leading
//! `v` (`v1.2.0`). Sorting never fails: strings that do not parse are kept,
//! placed after every parseable version, and reported back to the caller.

use std::cmp::Ordering;
use std::fmt;

/// Versions that could not be parsed while sorting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsableVersions(pub Vec<String>);

impl fmt::Display for UnparsableVersions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid semantic version(s): {}", self.0.join(", "))
    }
}

impl std::error::Error for UnparsableVersions {}

/// Parse a version leniently
///
/// Accepts a leading `v` and pads a missing minor or patch component with
/// zeros, so `v1.2` parses as `1.2.0`.
pub fn parse_version(version: &str) -> Option<semver::Version> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    if let Ok(parsed) = semver::Version::parse(trimmed) {
        return Some(parsed);
    }

    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);
    let padded = match core.split('.').count() {
        1 => format!("{core}.0.0{suffix}"),
        2 => format!("{core}.0{suffix}"),
        _ => return None,
    };
    semver::Version::parse(&padded).ok()
}

/// Sort version strings in ascending semantic-version order, in place
///
/// The sort always completes. If any strings fail to parse they end up after
/// the parseable ones (in lexical order) and are returned in the error.
pub fn sort_versions(versions: &mut [String]) -> Result<(), UnparsableVersions> {
    let mut keyed: Vec<(Option<semver::Version>, String)> = versions
        .iter()
        .map(|v| (parse_version(v), v.clone()))
        .collect();

    keyed.sort_by(|(va, a), (vb, b)| match (va, vb) {
        (Some(va), Some(vb)) => va.cmp(vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    });

    let mut invalid = Vec::new();
    for (slot, (parsed, original)) in versions.iter_mut().zip(keyed) {
        if parsed.is_none() {
            invalid.push(original.clone());
        }
        *slot = original;
    }

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(UnparsableVersions(invalid))
    }
}
