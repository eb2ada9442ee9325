//! Cache validation and refresh behaviour of a discovery source

mod common;

use common::*;
use plugdex_core::{DigestProbe, DiscoveryError, DiscoveryOptions, FetchConfig, ImageRef, ListKind};
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;

fn inner(err: &DiscoveryError) -> &DiscoveryError {
    match err {
        DiscoveryError::Source { source, .. } => source,
        other => panic!("expected a source error, got {other:?}"),
    }
}

#[test]
fn test_fresh_install_creates_catalog_and_markers() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    let d1 = fixture.digest_hex(IMAGE);

    let plugins = fixture.source(DiscoveryOptions::default()).list_plugins().unwrap();

    let names: Vec<&str> = plugins.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["cluster", "login"]);
    assert_eq!(
        markers(&fixture.cache_dir()),
        vec![format!("digest.{d1}"), "metadata.digest.none".to_string()]
    );
    assert!(fixture.cache_dir().join(CATALOG_FILE).is_file());
    assert_eq!(fixture.verify_count(), 1);
    // Catalog image plus the attempt on the missing overlay
    assert_eq!(fixture.fetch_count(), 2);
}

#[test]
fn test_unchanged_source_makes_no_transfers() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    let source = fixture.source(DiscoveryOptions::default());
    source.list_plugins().unwrap();

    fixture.reset_counters();
    source.list_plugins().unwrap();
    source.list_groups().unwrap();

    assert_eq!(fixture.fetch_count(), 0);
    assert_eq!(fixture.verify_count(), 0);
    // Only the catalog and overlay digests are probed, once per listing
    assert_eq!(fixture.registry.probes.load(Ordering::SeqCst), 4);
}

#[test]
fn test_catalog_change_triggers_refresh() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    let source = fixture.source(DiscoveryOptions::default());
    source.list_plugins().unwrap();

    let updated = CATALOG_YAML.replace("Log in to an endpoint", "Log in to a server");
    fixture.publish_catalog(&updated);
    let d1 = fixture.digest_hex(IMAGE);

    let plugins = source.list_plugins().unwrap();
    let login = plugins.iter().find(|p| p.name == "login").unwrap();
    assert_eq!(login.description, "Log in to a server");
    assert_eq!(
        markers(&fixture.cache_dir()),
        vec![format!("digest.{d1}"), "metadata.digest.none".to_string()]
    );
}

#[test]
fn test_air_gapped_switch_is_driven_by_overlay_marker() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    let source = fixture.source(DiscoveryOptions::default());
    source.list_plugins().unwrap();
    let d1 = fixture.digest_hex(IMAGE);

    fixture.publish_metadata(METADATA_YAML);
    let d2 = fixture.digest_hex(METADATA_IMAGE);
    fixture.reset_counters();

    let plugins = source.list_plugins().unwrap();

    assert_eq!(fixture.verify_count(), 1);
    assert_eq!(
        markers(&fixture.cache_dir()),
        vec![format!("digest.{d1}"), format!("metadata.digest.{d2}")]
    );

    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].name, "cluster");
    assert_eq!(plugins[0].supported_versions, vec!["v1.2.0"]);
    assert_eq!(plugins[0].recommended_version, "v1.2.0");

    let groups = source.list_groups().unwrap();
    let ids: Vec<String> = groups.iter().map(|g| g.id()).collect();
    assert_eq!(ids, vec!["vmware-tkg/default:v1.0.0"]);
}

#[test]
fn test_overlay_removal_forces_refresh() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    fixture.publish_metadata(METADATA_YAML);
    let source = fixture.source(DiscoveryOptions::default());
    assert_eq!(source.list_plugins().unwrap().len(), 1);

    fixture.remove_metadata();
    fixture.reset_counters();

    let plugins = source.list_plugins().unwrap();
    assert_eq!(fixture.verify_count(), 1);
    assert_eq!(plugins.len(), 2);
    assert!(markers(&fixture.cache_dir()).contains(&"metadata.digest.none".to_string()));
}

#[test]
fn test_duplicate_markers_are_healed() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    let source = fixture.source(DiscoveryOptions::default());
    source.list_plugins().unwrap();
    let d1 = fixture.digest_hex(IMAGE);

    let cache_dir = fixture.cache_dir();
    for name in ["digest.aaaa", "digest.bbbb", "metadata.digest.cccc"] {
        std::fs::write(cache_dir.join(name), "").unwrap();
    }
    fixture.reset_counters();

    source.list_plugins().unwrap();

    assert_eq!(fixture.verify_count(), 1);
    assert_eq!(
        markers(&cache_dir),
        vec![format!("digest.{d1}"), "metadata.digest.none".to_string()]
    );

    // Healed: the next listing is a cache hit
    fixture.reset_counters();
    source.list_plugins().unwrap();
    assert_eq!(fixture.fetch_count(), 0);
}

#[test]
fn test_deleted_catalog_file_is_restored() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    let source = fixture.source(DiscoveryOptions::default());
    source.list_plugins().unwrap();

    std::fs::remove_file(fixture.cache_dir().join(CATALOG_FILE)).unwrap();
    fixture.reset_counters();

    assert_eq!(source.list_plugins().unwrap().len(), 2);
    assert_eq!(fixture.verify_count(), 1);
}

#[test]
fn test_merge_failure_leaves_cache_untouched() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    let source = fixture.source(DiscoveryOptions::default());
    source.list_plugins().unwrap();
    let before = snapshot(&fixture.cache_dir());

    fixture.publish_metadata(METADATA_YAML);
    fixture.store.fail_merge.store(true, Ordering::SeqCst);

    let err = source.list_plugins().unwrap_err();
    assert!(matches!(
        err,
        DiscoveryError::Source {
            kind: ListKind::Plugins,
            ..
        }
    ));
    assert!(matches!(inner(&err), DiscoveryError::OverlayMerge { .. }));
    assert_eq!(snapshot(&fixture.cache_dir()), before);

    // Recovers once the overlay can be applied
    fixture.store.fail_merge.store(false, Ordering::SeqCst);
    assert_eq!(source.list_plugins().unwrap().len(), 1);
}

#[test]
fn test_signature_failure_leaves_cache_untouched() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    let source = fixture.source(DiscoveryOptions::default());
    source.list_plugins().unwrap();
    let before = snapshot(&fixture.cache_dir());

    fixture.publish_catalog(&CATALOG_YAML.replace("v0.3.0", "v0.4.0"));
    fixture.verifier.reject.store(true, Ordering::SeqCst);
    fixture.reset_counters();

    let err = source.list_groups().unwrap_err();
    assert!(err.to_string().contains("for groups"));
    assert!(matches!(
        inner(&err),
        DiscoveryError::SignatureVerification { .. }
    ));
    assert_eq!(fixture.fetch_count(), 0);
    assert_eq!(snapshot(&fixture.cache_dir()), before);
}

#[test]
fn test_unresolvable_image_names_reference() {
    let fixture = Fixture::new();
    let source = fixture.source(DiscoveryOptions::default());

    let err = source.list_plugins().unwrap_err();
    let resolution = inner(&err);
    assert!(matches!(resolution, DiscoveryError::ImageResolution { .. }));
    assert!(resolution.to_string().contains(IMAGE));
    assert_eq!(fixture.verify_count(), 0);
}

#[test]
fn test_image_without_catalog_file_is_rejected() {
    let fixture = Fixture::new();
    fixture.publish(IMAGE, "README.md", "not a catalog");
    let source = fixture.source(DiscoveryOptions::default());

    let err = source.list_plugins().unwrap_err();
    assert!(matches!(
        inner(&err),
        DiscoveryError::MissingCatalogFile { .. }
    ));
    assert!(markers(&fixture.cache_dir()).is_empty());
}

#[test]
fn test_oversized_overlay_is_fatal() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    fixture.publish_metadata(METADATA_YAML);

    let fetch = FetchConfig {
        max_overlay_size_bytes: Some(16),
        ..FetchConfig::default()
    };
    let source = fixture.source(DiscoveryOptions::default()).with_fetch_config(fetch);

    let err = source.list_plugins().unwrap_err();
    assert!(matches!(
        inner(&err),
        DiscoveryError::OverlayTooLarge { limit: 16, .. }
    ));
    assert!(!fixture.cache_dir().join(CATALOG_FILE).exists());
}

#[test]
fn test_oversized_catalog_fails_download() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    fixture.source(DiscoveryOptions::default()).list_plugins().unwrap();
    let before = snapshot(&fixture.cache_dir());

    fixture.publish_catalog(&CATALOG_YAML.replace("Log in to an endpoint", "changed"));
    let fetch = FetchConfig {
        max_catalog_size_bytes: Some(64),
        ..FetchConfig::default()
    };
    let source = fixture.source(DiscoveryOptions::default()).with_fetch_config(fetch);

    let err = source.list_plugins().unwrap_err();
    assert!(matches!(inner(&err), DiscoveryError::Download { .. }));
    assert_eq!(snapshot(&fixture.cache_dir()), before);
}

#[test]
fn test_unfetched_overlay_is_retried() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    // Larger than the catalog size bound, so only the overlay download fails
    let padded = format!("{METADATA_YAML}{}\n", "#".repeat(CATALOG_YAML.len()));
    fixture.publish_metadata(&padded);
    let d1 = fixture.digest_hex(IMAGE);
    let d2 = fixture.digest_hex(METADATA_IMAGE);

    let fetch = FetchConfig {
        max_catalog_size_bytes: Some(CATALOG_YAML.len() as u64),
        ..FetchConfig::default()
    };
    let bounded = fixture.source(DiscoveryOptions::default()).with_fetch_config(fetch);

    assert_eq!(bounded.list_plugins().unwrap().len(), 2);
    assert_eq!(
        markers(&fixture.cache_dir()),
        vec![format!("digest.{d1}"), "metadata.digest.none".to_string()]
    );

    // The overlay is still published, so the cache is not considered fresh
    fixture.reset_counters();
    bounded.list_plugins().unwrap();
    assert_eq!(fixture.verify_count(), 1);

    let plugins = fixture.source(DiscoveryOptions::default()).list_plugins().unwrap();
    assert_eq!(plugins.len(), 1);
    assert_eq!(
        markers(&fixture.cache_dir()),
        vec![format!("digest.{d1}"), format!("metadata.digest.{d2}")]
    );
}

#[test]
fn test_marker_creation_failure_is_not_fatal() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    let d1 = fixture.digest_hex(IMAGE);
    // A directory where the marker file would go
    std::fs::create_dir_all(fixture.cache_dir().join(format!("digest.{d1}"))).unwrap();
    let source = fixture.source(DiscoveryOptions::default());

    assert_eq!(source.list_plugins().unwrap().len(), 2);
    assert!(fixture.cache_dir().join(CATALOG_FILE).is_file());
    assert!(fixture.cache_dir().join(format!("digest.{d1}")).is_dir());
    assert!(fixture.cache_dir().join("metadata.digest.none").is_file());

    // Without its marker the catalog is refreshed again
    fixture.reset_counters();
    assert_eq!(source.list_plugins().unwrap().len(), 2);
    assert_eq!(fixture.verify_count(), 1);
}

#[test]
fn test_clean_cache_forces_refresh() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    let source = fixture.source(DiscoveryOptions::default());
    source.list_plugins().unwrap();

    source.clean_cache().unwrap();
    assert!(markers(&fixture.cache_dir()).is_empty());
    assert!(!fixture.cache_dir().join(CATALOG_FILE).exists());
    // Cleaning an empty cache is fine
    source.clean_cache().unwrap();

    fixture.reset_counters();
    source.list_plugins().unwrap();
    assert_eq!(fixture.verify_count(), 1);
}

#[test]
fn test_digest_pinned_source() {
    let fixture = Fixture::new();
    fixture.publish_catalog(CATALOG_YAML);
    let digest = fixture.registry.inner.digest(IMAGE).unwrap();
    let pinned = format!("registry.example.com/plugins/plugin-inventory@{digest}");

    // The local registry keys pinned images by digest
    let staging = tempfile::TempDir::new().unwrap();
    std::fs::write(staging.path().join(CATALOG_FILE), CATALOG_YAML).unwrap();
    fixture.registry.inner.push(&pinned, staging.path()).unwrap();

    let source = plugdex_core::DiscoverySource::new(
        "pinned",
        ImageRef::parse(&pinned).unwrap(),
        fixture.temp_dir.path().join("cache").join("pinned"),
        fixture.backend(),
    );
    assert_eq!(source.list_plugins().unwrap().len(), 2);
    assert_eq!(
        markers(source.cache_dir()),
        vec![
            format!("digest.{}", fixture.digest_hex(&pinned)),
            "metadata.digest.none".to_string()
        ]
    );
}
