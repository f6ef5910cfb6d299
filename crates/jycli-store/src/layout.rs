use crate::StoreError;
use jycli_schema::{ArtifactKind, Coordinate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current cache format version. Incremented on incompatible layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";

/// Directory layout of the artifact cache.
///
/// ```text
/// <root>/version                       format marker (JSON)
/// <root>/.lock                         cache-wide maintenance lock
/// <root>/artifacts/<maven path>.jar    artifact bytes
/// <root>/artifacts/<maven path>.jar.json  record, written last
/// <root>/locks/<lock key>.toml         resolved module sets
/// <root>/staging/                      in-progress downloads
/// <root>/inflight/<digest>.lock        per-coordinate fetch locks
/// ```
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheVersion {
    format_version: u32,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    pub fn artifact_path(&self, coordinate: &Coordinate, kind: ArtifactKind) -> PathBuf {
        self.artifacts_dir()
            .join(coordinate.repository_path(kind.extension()))
    }

    /// The record sits next to the file it describes.
    pub fn record_path(&self, coordinate: &Coordinate, kind: ArtifactKind) -> PathBuf {
        let mut path = self.artifact_path(coordinate, kind).into_os_string();
        path.push(".json");
        PathBuf::from(path)
    }

    #[inline]
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    pub fn lock_path(&self, lock_key: &str) -> PathBuf {
        self.locks_dir().join(format!("{lock_key}.toml"))
    }

    #[inline]
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    #[inline]
    pub fn inflight_dir(&self) -> PathBuf {
        self.root.join("inflight")
    }

    /// Advisory lock file serializing fetches of one coordinate across processes.
    pub fn coordinate_lock_path(&self, coordinate: &Coordinate) -> PathBuf {
        let digest = blake3::hash(coordinate.to_string().as_bytes()).to_hex();
        self.inflight_dir().join(format!("{}.lock", &digest.as_str()[..32]))
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.artifacts_dir())?;
        fs::create_dir_all(self.locks_dir())?;
        fs::create_dir_all(self.staging_dir())?;
        fs::create_dir_all(self.inflight_dir())?;

        let version_path = self.root.join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = CacheVersion {
                format_version: CACHE_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let mut tmp = NamedTempFile::new_in(&self.root)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&self.root)?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let content = fs::read_to_string(self.root.join(VERSION_FILE))?;
        let ver: CacheVersion = serde_json::from_str(&content)?;

        if ver.format_version != CACHE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: CACHE_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> Coordinate {
        Coordinate::parse("org.python:jython-slim:2.7.4").unwrap()
    }

    #[test]
    fn artifact_paths_follow_maven_layout() {
        let layout = CacheLayout::new("/tmp/jycli-test");
        assert_eq!(
            layout.artifact_path(&coord(), ArtifactKind::Jar),
            PathBuf::from("/tmp/jycli-test/artifacts/org/python/jython-slim/2.7.4/jython-slim-2.7.4.jar")
        );
        assert_eq!(
            layout.record_path(&coord(), ArtifactKind::Pom),
            PathBuf::from(
                "/tmp/jycli-test/artifacts/org/python/jython-slim/2.7.4/jython-slim-2.7.4.pom.json"
            )
        );
        assert_eq!(
            layout.lock_path("abc"),
            PathBuf::from("/tmp/jycli-test/locks/abc.toml")
        );
    }

    #[test]
    fn coordinate_lock_paths_are_distinct() {
        let layout = CacheLayout::new("/tmp/jycli-test");
        let other = Coordinate::parse("org.python:jython-slim:2.7.3").unwrap();
        assert_ne!(
            layout.coordinate_lock_path(&coord()),
            layout.coordinate_lock_path(&other)
        );
        assert!(layout
            .coordinate_lock_path(&coord())
            .starts_with(layout.inflight_dir()));
    }

    #[test]
    fn initialize_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        layout.initialize().unwrap();

        assert!(layout.artifacts_dir().is_dir());
        assert!(layout.locks_dir().is_dir());
        assert!(layout.staging_dir().is_dir());
        assert!(layout.inflight_dir().is_dir());
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        layout.initialize().unwrap();
        layout.initialize().unwrap();
        layout.verify_version().unwrap();
    }

    #[test]
    fn newer_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        layout.initialize().unwrap();
        fs::write(dir.path().join(VERSION_FILE), r#"{"format_version": 99}"#).unwrap();
        assert!(matches!(
            layout.initialize(),
            Err(StoreError::VersionMismatch { found: 99, .. })
        ));
    }
}
