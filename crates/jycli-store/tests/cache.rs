//! Cache behaviour across components: publication, eviction and verification.

use jycli_schema::{ArtifactKind, Coordinate, LockedModule, ModuleOrigin, ResolutionLock};
use jycli_store::{verify_cache_integrity, ArtifactStore, CacheGc, CacheLayout, LockIndex};
use std::fs;
use std::io::Write;
use std::sync::Arc;

fn coord(s: &str) -> Coordinate {
    Coordinate::parse(s).unwrap()
}

fn open_cache() -> (tempfile::TempDir, CacheLayout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = CacheLayout::new(dir.path().join("cache"));
    layout.initialize().unwrap();
    (dir, layout)
}

#[test]
fn staged_download_is_invisible_until_committed() {
    let (_dir, layout) = open_cache();
    let store = ArtifactStore::new(layout);
    let c = coord("io.undertow:undertow-core:2.3.18.Final");

    let mut staged = store.stage().unwrap();
    staged.write_all(b"first half ").unwrap();
    assert!(!store.exists(&c, ArtifactKind::Jar));
    staged.write_all(b"second half").unwrap();
    let digests = staged.digests();

    let record = store.commit(&c, ArtifactKind::Jar, staged, "central").unwrap();
    assert_eq!(record.digests, digests);
    assert_eq!(
        store.read(&c, ArtifactKind::Jar).unwrap(),
        b"first half second half"
    );
}

#[test]
fn concurrent_commits_of_one_coordinate_leave_one_consistent_entry() {
    let (_dir, layout) = open_cache();
    let store = Arc::new(ArtifactStore::new(layout));
    let c = coord("a:b:1.0");

    std::thread::scope(|s| {
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let c = c.clone();
            s.spawn(move || {
                store.put(&c, ArtifactKind::Jar, b"same bytes", "mem").unwrap();
            });
        }
    });

    let records = store.list().unwrap();
    assert_eq!(records.len(), 1);
    store.verify(&c, ArtifactKind::Jar).unwrap();
    assert_eq!(
        fs::read_dir(store.layout().staging_dir()).unwrap().count(),
        0
    );
}

#[test]
fn evict_then_gc_then_verify() {
    let (_dir, layout) = open_cache();
    let store = ArtifactStore::new(layout.clone());
    let index = LockIndex::new(layout.clone());

    let roots = [coord("a:b:1.0"), coord("c:d:2.0")];
    let mut modules = Vec::new();
    for (i, c) in roots.iter().enumerate() {
        let record = store
            .put(c, ArtifactKind::Jar, format!("jar {i}").as_bytes(), "mem")
            .unwrap();
        store
            .put(c, ArtifactKind::Pom, b"<project/>", "mem")
            .unwrap();
        modules.push(LockedModule {
            coordinate: c.clone(),
            blake3: record.digests.blake3,
            sha256: record.digests.sha256,
            size: record.digests.size,
            depth: 0,
            origin: ModuleOrigin::Declared,
        });
    }
    let lock = ResolutionLock::new(&roots, modules);
    index.put(&lock).unwrap();
    assert!(verify_cache_integrity(&layout).unwrap().is_clean());

    let gc = CacheGc::new(layout.clone());
    let report = gc.collect(false).unwrap();
    assert!(report.orphaned_artifacts.is_empty());

    let evicted = gc.evict(&coord("a:b:1.0")).unwrap();
    assert_eq!(evicted.removed_locks, vec![lock.lock_key.clone()]);

    // With the lock gone, c:d is unreferenced too.
    let report = gc.collect(false).unwrap();
    assert_eq!(report.orphaned_artifacts, vec![coord("c:d:2.0")]);
    assert!(store.list().unwrap().is_empty());
    assert!(verify_cache_integrity(&layout).unwrap().is_clean());
}

#[test]
fn cache_reopens_with_existing_content() {
    let (dir, layout) = open_cache();
    ArtifactStore::new(layout)
        .put(&coord("a:b:1.0"), ArtifactKind::Jar, b"x", "mem")
        .unwrap();

    let reopened = CacheLayout::new(dir.path().join("cache"));
    reopened.initialize().unwrap();
    assert!(ArtifactStore::new(reopened).exists(&coord("a:b:1.0"), ArtifactKind::Jar));
}
