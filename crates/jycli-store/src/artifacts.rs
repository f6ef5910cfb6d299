use crate::layout::CacheLayout;
use crate::{fsync_dir, StoreError};
use chrono::{DateTime, Utc};
use jycli_schema::{ArtifactKind, Coordinate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Content digests of one artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigests {
    pub blake3: String,
    pub sha256: String,
    pub size: u64,
}

/// Description of a cached file. Written after the file itself, so a present
/// record means the file is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub coordinate: Coordinate,
    pub kind: ArtifactKind,
    #[serde(flatten)]
    pub digests: ArtifactDigests,
    pub fetched_at: DateTime<Utc>,
    /// Name of the source the bytes came from.
    pub source: String,
}

/// A download in progress, written into the staging directory and hashed as
/// it streams. Dropping it discards the partial file.
pub struct StagedArtifact {
    tmp: NamedTempFile,
    blake3: blake3::Hasher,
    sha256: Sha256,
    size: u64,
}

impl StagedArtifact {
    pub fn digests(&self) -> ArtifactDigests {
        ArtifactDigests {
            blake3: self.blake3.finalize().to_hex().to_string(),
            sha256: hex(&self.sha256.clone().finalize()),
            size: self.size,
        }
    }

    pub fn path(&self) -> &Path {
        self.tmp.path()
    }
}

impl Write for StagedArtifact {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.tmp.write(buf)?;
        self.blake3.update(&buf[..n]);
        self.sha256.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tmp.flush()
    }
}

/// Cache of repository files keyed by coordinate and kind.
///
/// Publication is atomic: bytes land in `staging/`, are persisted into their
/// final path, and only then is the JSON record written. Readers trust the
/// record, never a bare file.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    layout: CacheLayout,
}

impl ArtifactStore {
    pub fn new(layout: CacheLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Start a download into the staging directory.
    pub fn stage(&self) -> Result<StagedArtifact, StoreError> {
        let dir = self.layout.staging_dir();
        fs::create_dir_all(&dir)?;
        Ok(StagedArtifact {
            tmp: NamedTempFile::new_in(&dir)?,
            blake3: blake3::Hasher::new(),
            sha256: Sha256::new(),
            size: 0,
        })
    }

    /// Move a finished download into place and record it.
    pub fn commit(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
        mut staged: StagedArtifact,
        source: &str,
    ) -> Result<ArtifactRecord, StoreError> {
        staged.flush()?;
        staged.tmp.as_file().sync_all()?;
        let digests = staged.digests();

        let dest = self.layout.artifact_path(coordinate, kind);
        let dir = dest
            .parent()
            .map_or_else(|| self.layout.artifacts_dir(), Path::to_path_buf);
        fs::create_dir_all(&dir)?;
        staged
            .tmp
            .persist(&dest)
            .map_err(|e| StoreError::Io(e.error))?;

        let record = ArtifactRecord {
            coordinate: coordinate.clone(),
            kind,
            digests,
            fetched_at: Utc::now(),
            source: source.to_owned(),
        };
        self.write_record(&record, &dir)?;
        debug!(
            "cached {coordinate} ({kind}, {} bytes) from {source}",
            record.digests.size
        );
        Ok(record)
    }

    /// Store an in-memory artifact.
    pub fn put(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
        data: &[u8],
        source: &str,
    ) -> Result<ArtifactRecord, StoreError> {
        let mut staged = self.stage()?;
        staged.write_all(data)?;
        self.commit(coordinate, kind, staged, source)
    }

    fn write_record(&self, record: &ArtifactRecord, dir: &Path) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(record)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.layout.record_path(&record.coordinate, record.kind))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(dir)?;
        Ok(())
    }

    /// The record of a cached file, `None` when the file is not cached.
    pub fn record(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
    ) -> Result<Option<ArtifactRecord>, StoreError> {
        let path = self.layout.record_path(coordinate, kind);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: ArtifactRecord = serde_json::from_str(&content)?;
        if !self.layout.artifact_path(coordinate, kind).is_file() {
            return Ok(None);
        }
        Ok(Some(record))
    }

    pub fn exists(&self, coordinate: &Coordinate, kind: ArtifactKind) -> bool {
        self.layout.record_path(coordinate, kind).is_file()
            && self.layout.artifact_path(coordinate, kind).is_file()
    }

    pub fn path(&self, coordinate: &Coordinate, kind: ArtifactKind) -> PathBuf {
        self.layout.artifact_path(coordinate, kind)
    }

    /// Read a cached file, verifying it against its record.
    pub fn read(&self, coordinate: &Coordinate, kind: ArtifactKind) -> Result<Vec<u8>, StoreError> {
        let record = self
            .record(coordinate, kind)?
            .ok_or_else(|| StoreError::NotCached(format!("{coordinate} ({kind})")))?;
        let data = fs::read(self.path(coordinate, kind))?;
        let actual = blake3::hash(&data).to_hex();
        if actual.as_str() != record.digests.blake3 {
            return Err(StoreError::IntegrityFailure {
                item: format!("{coordinate} ({kind})"),
                expected: record.digests.blake3,
                actual: actual.to_string(),
            });
        }
        Ok(data)
    }

    /// Recompute the digests of a cached file and compare them with its record.
    pub fn verify(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
    ) -> Result<ArtifactRecord, StoreError> {
        let record = self
            .record(coordinate, kind)?
            .ok_or_else(|| StoreError::NotCached(format!("{coordinate} ({kind})")))?;
        let actual = digest_file(&self.path(coordinate, kind))?;
        if actual.blake3 != record.digests.blake3 || actual.sha256 != record.digests.sha256 {
            return Err(StoreError::IntegrityFailure {
                item: format!("{coordinate} ({kind})"),
                expected: record.digests.blake3,
                actual: actual.blake3,
            });
        }
        Ok(record)
    }

    /// Remove both files of a coordinate. Returns whether anything was removed.
    pub fn remove(&self, coordinate: &Coordinate) -> Result<bool, StoreError> {
        let mut removed = false;
        for kind in [ArtifactKind::Jar, ArtifactKind::Pom] {
            // Record first: a record must never outlive its file.
            for path in [
                self.layout.record_path(coordinate, kind),
                self.layout.artifact_path(coordinate, kind),
            ] {
                match fs::remove_file(&path) {
                    Ok(()) => removed = true,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        if removed {
            debug!("evicted {coordinate}");
        }
        Ok(removed)
    }

    /// Every record in the cache, sorted by coordinate then kind.
    pub fn list(&self) -> Result<Vec<ArtifactRecord>, StoreError> {
        let mut records = Vec::new();
        let root = self.layout.artifacts_dir();
        if !root.exists() {
            return Ok(records);
        }
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|e| e == "json") {
                    let content = fs::read_to_string(&path)?;
                    match serde_json::from_str::<ArtifactRecord>(&content) {
                        Ok(record) => records.push(record),
                        Err(e) => debug!("skipping unreadable record {}: {e}", path.display()),
                    }
                }
            }
        }
        records.sort_by(|a, b| (&a.coordinate, a.kind).cmp(&(&b.coordinate, b.kind)));
        Ok(records)
    }

    /// Files under `artifacts/` that no record describes, such as leftovers of
    /// a crash between persisting a file and writing its record.
    pub fn unrecorded_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut out = Vec::new();
        let root = self.layout.artifacts_dir();
        if !root.exists() {
            return Ok(out);
        }
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let is_artifact = path
                    .extension()
                    .is_some_and(|e| e == "jar" || e == "pom");
                if !is_artifact {
                    continue;
                }
                let mut record = path.clone().into_os_string();
                record.push(".json");
                if !Path::new(&record).is_file() {
                    out.push(path);
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Stream a file through both digests.
pub fn digest_file(path: &Path) -> Result<ArtifactDigests, StoreError> {
    let mut file = fs::File::open(path)?;
    let mut blake = blake3::Hasher::new();
    let mut sha = Sha256::new();
    let mut size = 0u64;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        blake.update(&buf[..n]);
        sha.update(&buf[..n]);
        size += n as u64;
    }
    Ok(ArtifactDigests {
        blake3: blake.finalize().to_hex().to_string(),
        sha256: hex(&sha.finalize()),
        size,
    })
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(dir.path());
        layout.initialize().unwrap();
        let store = ArtifactStore::new(layout);
        (dir, store)
    }

    fn coord(s: &str) -> Coordinate {
        Coordinate::parse(s).unwrap()
    }

    #[test]
    fn put_and_read_roundtrip() {
        let (_dir, store) = test_store();
        let c = coord("a:b:1.0");
        let record = store.put(&c, ArtifactKind::Jar, b"jar bytes", "mem").unwrap();
        assert_eq!(record.digests.size, 9);
        assert_eq!(
            record.digests.blake3,
            blake3::hash(b"jar bytes").to_hex().to_string()
        );
        assert_eq!(store.read(&c, ArtifactKind::Jar).unwrap(), b"jar bytes");
        assert!(store.exists(&c, ArtifactKind::Jar));
        assert!(!store.exists(&c, ArtifactKind::Pom));
    }

    #[test]
    fn sha256_matches_known_vector() {
        let (_dir, store) = test_store();
        let record = store
            .put(&coord("a:b:1.0"), ArtifactKind::Jar, b"abc", "mem")
            .unwrap();
        assert_eq!(
            record.digests.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn missing_record_is_none() {
        let (_dir, store) = test_store();
        assert!(store
            .record(&coord("a:b:1.0"), ArtifactKind::Jar)
            .unwrap()
            .is_none());
        assert!(matches!(
            store.read(&coord("a:b:1.0"), ArtifactKind::Jar),
            Err(StoreError::NotCached(_))
        ));
    }

    #[test]
    fn file_without_record_is_not_cached() {
        let (_dir, store) = test_store();
        let c = coord("a:b:1.0");
        let path = store.path(&c, ArtifactKind::Jar);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"partial").unwrap();
        assert!(store.record(&c, ArtifactKind::Jar).unwrap().is_none());
        assert_eq!(store.unrecorded_files().unwrap(), vec![path]);
    }

    #[test]
    fn corruption_is_detected_on_read_and_verify() {
        let (_dir, store) = test_store();
        let c = coord("a:b:1.0");
        store.put(&c, ArtifactKind::Jar, b"original", "mem").unwrap();
        fs::write(store.path(&c, ArtifactKind::Jar), b"tampered").unwrap();
        assert!(matches!(
            store.read(&c, ArtifactKind::Jar),
            Err(StoreError::IntegrityFailure { .. })
        ));
        assert!(store.verify(&c, ArtifactKind::Jar).is_err());
    }

    #[test]
    fn dropped_stage_leaves_nothing_behind() {
        let (_dir, store) = test_store();
        {
            let mut staged = store.stage().unwrap();
            staged.write_all(b"half a download").unwrap();
            assert!(staged.path().exists());
        }
        assert_eq!(
            fs::read_dir(store.layout().staging_dir()).unwrap().count(),
            0
        );
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn remove_clears_both_kinds() {
        let (_dir, store) = test_store();
        let c = coord("a:b:1.0");
        store.put(&c, ArtifactKind::Jar, b"jar", "mem").unwrap();
        store.put(&c, ArtifactKind::Pom, b"<project/>", "mem").unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
        assert!(store.remove(&c).unwrap());
        assert!(store.list().unwrap().is_empty());
        assert!(!store.remove(&c).unwrap());
    }

    #[test]
    fn list_is_sorted() {
        let (_dir, store) = test_store();
        store.put(&coord("z:z:1"), ArtifactKind::Jar, b"1", "mem").unwrap();
        store.put(&coord("a:a:1"), ArtifactKind::Pom, b"2", "mem").unwrap();
        store.put(&coord("a:a:1"), ArtifactKind::Jar, b"3", "mem").unwrap();
        let listed: Vec<(String, ArtifactKind)> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|r| (r.coordinate.to_string(), r.kind))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("a:a:1".to_owned(), ArtifactKind::Jar),
                ("a:a:1".to_owned(), ArtifactKind::Pom),
                ("z:z:1".to_owned(), ArtifactKind::Jar),
            ]
        );
    }

    #[test]
    fn record_serializes_flat() {
        let (_dir, store) = test_store();
        let record = store
            .put(&coord("a:b:1.0"), ArtifactKind::Jar, b"x", "central")
            .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["coordinate"], "a:b:1.0");
        assert_eq!(json["kind"], "jar");
        assert_eq!(json["size"], 1);
        assert_eq!(json["source"], "central");
    }
}
