use crate::artifacts::ArtifactStore;
use crate::layout::CacheLayout;
use crate::locks::LockIndex;
use crate::StoreError;
use jycli_schema::{Coordinate, LockKey};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::info;

/// Staging files younger than this may belong to a running download.
pub const STAGING_GRACE: Duration = Duration::from_secs(60 * 60);

pub struct CacheGc {
    layout: CacheLayout,
    staging_grace: Duration,
}

#[derive(Debug, Default)]
pub struct GcReport {
    pub orphaned_artifacts: Vec<Coordinate>,
    pub unrecorded_files: Vec<PathBuf>,
    pub stale_staging: Vec<PathBuf>,
    pub removed_artifacts: usize,
    pub removed_files: usize,
    pub freed_bytes: u64,
}

#[derive(Debug, Default)]
pub struct EvictReport {
    pub removed_artifact: bool,
    pub removed_locks: Vec<LockKey>,
}

impl CacheGc {
    pub fn new(layout: CacheLayout) -> Self {
        Self {
            layout,
            staging_grace: STAGING_GRACE,
        }
    }

    #[must_use]
    pub fn with_staging_grace(mut self, grace: Duration) -> Self {
        self.staging_grace = grace;
        self
    }

    pub fn collect(&self, dry_run: bool) -> Result<GcReport, StoreError> {
        self.collect_with_cancel(dry_run, || false)
    }

    /// Remove artifacts no stored lock references, files without a record and
    /// abandoned staging files.
    pub fn collect_with_cancel(
        &self,
        dry_run: bool,
        should_stop: impl Fn() -> bool,
    ) -> Result<GcReport, StoreError> {
        let artifacts = ArtifactStore::new(self.layout.clone());
        let locks = LockIndex::new(self.layout.clone());

        let mut live: HashSet<Coordinate> = HashSet::new();
        for lock in locks.list()? {
            for module in lock.modules {
                live.insert(module.coordinate);
            }
        }

        let mut report = GcReport::default();
        let mut sizes: Vec<(Coordinate, u64)> = Vec::new();
        let mut orphaned: BTreeSet<Coordinate> = BTreeSet::new();
        for record in artifacts.list()? {
            if !live.contains(&record.coordinate) {
                sizes.push((record.coordinate.clone(), record.digests.size));
                orphaned.insert(record.coordinate);
            }
        }
        report.orphaned_artifacts = orphaned.into_iter().collect();
        report.unrecorded_files = artifacts.unrecorded_files()?;
        report.stale_staging = self.stale_staging()?;

        if dry_run {
            return Ok(report);
        }

        for coordinate in &report.orphaned_artifacts {
            if should_stop() {
                break;
            }
            artifacts.remove(coordinate)?;
            report.removed_artifacts += 1;
            report.freed_bytes += sizes
                .iter()
                .filter(|(c, _)| c == coordinate)
                .map(|(_, s)| s)
                .sum::<u64>();
        }

        for path in report.unrecorded_files.iter().chain(&report.stale_staging) {
            if should_stop() {
                break;
            }
            let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            match fs::remove_file(path) {
                Ok(()) => {
                    report.removed_files += 1;
                    report.freed_bytes += size;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "gc removed {} artifacts and {} files ({} bytes)",
            report.removed_artifacts, report.removed_files, report.freed_bytes
        );
        Ok(report)
    }

    /// Remove one coordinate and every lock whose module set contains it.
    pub fn evict(&self, coordinate: &Coordinate) -> Result<EvictReport, StoreError> {
        let artifacts = ArtifactStore::new(self.layout.clone());
        let locks = LockIndex::new(self.layout.clone());

        let removed_locks = locks.referencing(coordinate)?;
        for key in &removed_locks {
            locks.remove(key)?;
        }
        let removed_artifact = artifacts.remove(coordinate)?;
        Ok(EvictReport {
            removed_artifact,
            removed_locks,
        })
    }

    fn stale_staging(&self) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.layout.staging_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let now = SystemTime::now();
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= self.staging_grace {
                out.push(entry.path());
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jycli_schema::{ArtifactKind, LockedModule, ModuleOrigin, ResolutionLock};

    fn setup() -> (tempfile::TempDir, CacheLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, layout)
    }

    fn coord(s: &str) -> Coordinate {
        Coordinate::parse(s).unwrap()
    }

    fn lock_referencing(layout: &CacheLayout, coords: &[&str]) -> ResolutionLock {
        let store = ArtifactStore::new(layout.clone());
        let mut modules = Vec::new();
        for c in coords {
            let record = store
                .put(&coord(c), ArtifactKind::Jar, c.as_bytes(), "mem")
                .unwrap();
            modules.push(LockedModule {
                coordinate: coord(c),
                blake3: record.digests.blake3,
                sha256: record.digests.sha256,
                size: record.digests.size,
                depth: 0,
                origin: ModuleOrigin::Declared,
            });
        }
        let roots: Vec<Coordinate> = coords.iter().map(|c| coord(c)).collect();
        let lock = ResolutionLock::new(&roots, modules);
        LockIndex::new(layout.clone()).put(&lock).unwrap();
        lock
    }

    #[test]
    fn gc_removes_unreferenced_artifacts() {
        let (_dir, layout) = setup();
        lock_referencing(&layout, &["a:b:1.0"]);
        let store = ArtifactStore::new(layout.clone());
        store
            .put(&coord("old:lib:0.1"), ArtifactKind::Jar, b"stale", "mem")
            .unwrap();

        let report = CacheGc::new(layout).collect(false).unwrap();
        assert_eq!(report.orphaned_artifacts, vec![coord("old:lib:0.1")]);
        assert_eq!(report.removed_artifacts, 1);
        assert_eq!(report.freed_bytes, 5);
        assert!(!store.exists(&coord("old:lib:0.1"), ArtifactKind::Jar));
        assert!(store.exists(&coord("a:b:1.0"), ArtifactKind::Jar));
    }

    #[test]
    fn gc_dry_run_does_not_remove() {
        let (_dir, layout) = setup();
        let store = ArtifactStore::new(layout.clone());
        store
            .put(&coord("old:lib:0.1"), ArtifactKind::Jar, b"stale", "mem")
            .unwrap();

        let report = CacheGc::new(layout).collect(true).unwrap();
        assert_eq!(report.orphaned_artifacts.len(), 1);
        assert_eq!(report.removed_artifacts, 0);
        assert!(store.exists(&coord("old:lib:0.1"), ArtifactKind::Jar));
    }

    #[test]
    fn gc_keeps_fresh_staging_files() {
        let (_dir, layout) = setup();
        fs::write(layout.staging_dir().join(".tmp-download"), b"partial").unwrap();

        let report = CacheGc::new(layout.clone()).collect(false).unwrap();
        assert!(report.stale_staging.is_empty());

        let report = CacheGc::new(layout.clone())
            .with_staging_grace(Duration::ZERO)
            .collect(false)
            .unwrap();
        assert_eq!(report.stale_staging.len(), 1);
        assert_eq!(report.removed_files, 1);
        assert_eq!(fs::read_dir(layout.staging_dir()).unwrap().count(), 0);
    }

    #[test]
    fn gc_removes_files_without_record() {
        let (_dir, layout) = setup();
        let path = layout.artifact_path(&coord("a:b:1.0"), ArtifactKind::Jar);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"torn").unwrap();

        let report = CacheGc::new(layout).collect(false).unwrap();
        assert_eq!(report.unrecorded_files, vec![path.clone()]);
        assert!(!path.exists());
    }

    #[test]
    fn evict_removes_artifact_and_referencing_locks() {
        let (_dir, layout) = setup();
        let keep = lock_referencing(&layout, &["x:y:1.0"]);
        let drop = lock_referencing(&layout, &["a:b:1.0", "x:y:1.0"]);

        let report = CacheGc::new(layout.clone())
            .evict(&coord("a:b:1.0"))
            .unwrap();
        assert!(report.removed_artifact);
        assert_eq!(report.removed_locks, vec![drop.lock_key.clone()]);

        let index = LockIndex::new(layout.clone());
        assert!(index.exists(&keep.lock_key));
        assert!(!index.exists(&drop.lock_key));
    }

    #[test]
    fn evict_unknown_coordinate_is_noop() {
        let (_dir, layout) = setup();
        let report = CacheGc::new(layout).evict(&coord("no:such:1")).unwrap();
        assert!(!report.removed_artifact);
        assert!(report.removed_locks.is_empty());
    }
}
