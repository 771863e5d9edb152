use repokit_core::registry::{cache_path, invalidate, load, store};
use repokit_core::{
    discover, DiscoverOptions, DiscoverySource, Registry, RegistryError, StoreOutcome,
};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

fn registry_of(pairs: &[(&str, &str)]) -> Registry {
    let mut registry = Registry::new();
    for (key, id) in pairs {
        registry.insert(*key, *id);
    }
    registry
}

fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "// source\n").unwrap();
}

#[test]
fn store_then_load_roundtrips() {
    let cache = tempfile::tempdir().unwrap();
    let registry = registry_of(&[
        ("user.repository", "UserRepository"),
        ("invoice.repository", "billing::InvoiceRepository"),
    ]);

    assert_eq!(
        store(cache.path(), "Repository", &registry).unwrap(),
        StoreOutcome::Written
    );
    assert!(cache.path().join("shares/repository.json").is_file());

    let loaded = load(cache.path(), "Repository").unwrap();
    assert_eq!(loaded, Some(registry));
}

#[test]
fn load_without_cache_file_is_none() {
    let cache = tempfile::tempdir().unwrap();
    assert_eq!(load(cache.path(), "Repository").unwrap(), None);
    assert_eq!(load(cache.path().join("missing"), "Repository").unwrap(), None);
}

#[test]
fn second_store_never_overwrites() {
    let cache = tempfile::tempdir().unwrap();
    let first = registry_of(&[("user.repository", "UserRepository")]);
    let second = registry_of(&[("post.repository", "PostRepository")]);

    store(cache.path(), "Repository", &first).unwrap();
    let outcome = store(cache.path(), "repository", &second).unwrap();

    assert_eq!(outcome, StoreOutcome::AlreadyPresent);
    assert_eq!(load(cache.path(), "Repository").unwrap(), Some(first));
}

#[test]
fn concurrent_writers_leave_exactly_one_intact_document() {
    let cache = tempfile::tempdir().unwrap();
    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));

    let handles = (0..writers)
        .map(|index| {
            let barrier = Arc::clone(&barrier);
            let cache_dir = cache.path().to_path_buf();
            thread::spawn(move || {
                let id = format!("Writer{index}");
                let registry = registry_of(&[("writer.repository", id.as_str())]);
                barrier.wait();
                store(&cache_dir, "Repository", &registry).unwrap()
            })
        })
        .collect::<Vec<_>>();
    let outcomes = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();

    let written = outcomes
        .iter()
        .filter(|outcome| **outcome == StoreOutcome::Written)
        .count();
    assert_eq!(written, 1);

    let loaded = load(cache.path(), "Repository").unwrap().unwrap();
    assert!(loaded.get("writer.repository").unwrap().starts_with("Writer"));

    let leftovers = fs::read_dir(cache.path().join("shares")).unwrap().count();
    assert_eq!(leftovers, 1);
}

#[test]
fn malformed_cache_is_an_error() {
    let cache = tempfile::tempdir().unwrap();
    let path = cache_path(cache.path(), "Repository").unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    fs::write(&path, "a:1:{s:4:\"user\";}").unwrap();
    let err = load(cache.path(), "Repository").unwrap_err();
    assert!(matches!(err, RegistryError::MalformedCache { .. }));

    fs::write(
        &path,
        r#"{ "format": 1, "suffix": "controller", "entries": {} }"#,
    )
    .unwrap();
    let err = load(cache.path(), "Repository").unwrap_err();
    assert!(matches!(err, RegistryError::MalformedCache { .. }));

    fs::write(
        &path,
        r#"{ "format": 9, "suffix": "repository", "entries": {} }"#,
    )
    .unwrap();
    let err = load(cache.path(), "Repository").unwrap_err();
    assert!(matches!(err, RegistryError::MalformedCache { .. }));
}

#[test]
fn store_refuses_suffix_outside_shares_dir() {
    let root = tempfile::tempdir().unwrap();
    let cache_dir = root.path().join("cache");
    let registry = registry_of(&[("user.repository", "UserRepository")]);

    let err = store(&cache_dir, "../../Repository", &registry).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidSuffix(_)));
    assert!(!cache_dir.exists());
    assert!(!root.path().join("repository.json").exists());

    let err = load(&cache_dir, "nested/Repository").unwrap_err();
    assert!(matches!(err, RegistryError::InvalidSuffix(_)));
}

#[test]
fn discover_scans_once_then_serves_cache() {
    let src = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    touch(src.path(), "UserRepository.rs");
    let options = DiscoverOptions::new(src.path(), "Repository").with_cache_dir(cache.path());

    let first = discover(&options).unwrap();
    assert_eq!(first.source, DiscoverySource::Scan);

    touch(src.path(), "PostRepository.rs");
    let second = discover(&options).unwrap();
    assert_eq!(second.source, DiscoverySource::Cache);
    assert_eq!(second.registry, first.registry);
    assert!(!second.registry.contains_key("post.repository"));

    assert!(invalidate(cache.path(), "Repository").unwrap());
    let third = discover(&options).unwrap();
    assert_eq!(third.source, DiscoverySource::Scan);
    assert!(third.registry.contains_key("post.repository"));

    assert!(invalidate(cache.path(), "Repository").unwrap());
    assert!(!invalidate(cache.path(), "Repository").unwrap());
}

#[test]
fn discover_replaces_malformed_cache_with_fresh_scan() {
    let src = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    touch(src.path(), "UserRepository.rs");
    let path = cache_path(cache.path(), "Repository").unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "not json").unwrap();

    let options = DiscoverOptions::new(src.path(), "Repository").with_cache_dir(cache.path());
    let discovery = discover(&options).unwrap();

    assert_eq!(discovery.source, DiscoverySource::Scan);
    assert_eq!(discovery.registry.get("user.repository"), Some("UserRepository"));
    assert_eq!(
        load(cache.path(), "Repository").unwrap(),
        Some(discovery.registry)
    );
}

#[test]
fn discover_with_missing_root_is_empty_and_uncached() {
    let cache = tempfile::tempdir().unwrap();
    let options = DiscoverOptions::new(cache.path().join("absent"), "Repository")
        .with_cache_dir(cache.path());

    let discovery = discover(&options).unwrap();

    assert_eq!(discovery.source, DiscoverySource::MissingRoot);
    assert!(discovery.registry.is_empty());
    assert_eq!(load(cache.path(), "Repository").unwrap(), None);
}

#[test]
fn discover_without_cache_dir_writes_nothing() {
    let src = tempfile::tempdir().unwrap();
    touch(src.path(), "http/UserController.rs");

    let options = DiscoverOptions::new(src.path(), "Controller").with_path_filter("http");
    let discovery = discover(&options).unwrap();

    assert_eq!(discovery.source, DiscoverySource::Scan);
    assert_eq!(
        discovery.registry.get("user.controller"),
        Some("http::UserController")
    );
    assert!(!src.path().join("shares").exists());
}
