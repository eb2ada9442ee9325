//! Listing across several discovery sources
//!
//! One unreachable or broken source must not hide the others, so failures
//! are collected next to the results instead of aborting the listing.

use super::source::DiscoverySource;
use super::types::{DiscoveredGroup, DiscoveredPlugin};
use crate::error::DiscoveryError;

/// Results of a multi-source listing
#[derive(Debug)]
pub struct DiscoveryReport<T> {
    /// Items from every source that answered, in source order
    pub items: Vec<T>,
    /// Sources that failed, by name
    pub failures: Vec<(String, DiscoveryError)>,
}

impl<T> DiscoveryReport<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(name, _)| name.as_str())
    }
}

/// List the plugins of every source
pub fn list_plugins_from_sources(sources: &[DiscoverySource]) -> DiscoveryReport<DiscoveredPlugin> {
    collect(sources, DiscoverySource::list_plugins)
}

/// List the plugin groups of every source
pub fn list_groups_from_sources(sources: &[DiscoverySource]) -> DiscoveryReport<DiscoveredGroup> {
    collect(sources, DiscoverySource::list_groups)
}

fn collect<T, F>(sources: &[DiscoverySource], list: F) -> DiscoveryReport<T>
where
    F: Fn(&DiscoverySource) -> crate::error::Result<Vec<T>>,
{
    let mut report = DiscoveryReport {
        items: Vec::new(),
        failures: Vec::new(),
    };

    for source in sources {
        match list(source) {
            Ok(items) => {
                tracing::debug!("Discovery '{}' returned {} entries", source.name(), items.len());
                report.items.extend(items);
            }
            Err(e) => {
                tracing::warn!("Failed to list discovery '{}': {}", source.name(), e);
                // Continue with other sources
                report.failures.push((source.name().to_string(), e));
            }
        }
    }

    report
}
