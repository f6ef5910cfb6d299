use crate::coordinate::Coordinate;
use crate::types::LockKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const LOCK_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock file parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("lock file serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unsupported lock_version {0}, expected {LOCK_VERSION}")]
    UnsupportedVersion(u32),
    #[error("lock key mismatch: lock has '{lock_key}', recomputed '{computed_key}'")]
    KeyMismatch {
        lock_key: String,
        computed_key: String,
    },
}

/// Where a module entered the resolved set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModuleOrigin {
    /// Listed by the manifest or added by the launcher as a root.
    Declared,
    /// Required by `parent`'s POM.
    Transitive { parent: Coordinate },
}

/// One entry of a resolved module set, pinned to its content digests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedModule {
    pub coordinate: Coordinate,
    pub blake3: String,
    pub sha256: String,
    pub size: u64,
    /// Distance from the roots; roots are at depth 0.
    pub depth: u32,
    pub origin: ModuleOrigin,
}

/// The recorded outcome of resolving one root set.
///
/// `lock_key` is derived from the sorted roots only, so identical dependency
/// declarations always map to the same record regardless of their order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionLock {
    pub lock_version: u32,
    pub lock_key: LockKey,
    /// Sorted, deduplicated roots.
    pub roots: Vec<Coordinate>,
    /// The same roots in the order they were declared. The stored classpath
    /// follows this order, so it is only valid for an identical declaration.
    #[serde(default)]
    pub declared: Vec<Coordinate>,
    /// Classpath order.
    pub modules: Vec<LockedModule>,
}

/// Deterministic key of a root set: blake3 over the sorted coordinate list.
pub fn compute_lock_key(roots: &[Coordinate]) -> LockKey {
    let mut sorted: Vec<String> = roots.iter().map(ToString::to_string).collect();
    sorted.sort();
    sorted.dedup();

    let mut hasher = blake3::Hasher::new();
    for coord in &sorted {
        hasher.update(coord.as_bytes());
        hasher.update(b"\n");
    }
    LockKey::new(hasher.finalize().to_hex().to_string())
}

/// `roots` without repeats, first occurrence kept.
pub fn declaration_order(roots: &[Coordinate]) -> Vec<Coordinate> {
    let mut seen = std::collections::HashSet::new();
    roots.iter().filter(|c| seen.insert(*c)).cloned().collect()
}

impl ResolutionLock {
    pub fn new(roots: &[Coordinate], modules: Vec<LockedModule>) -> Self {
        let mut sorted = roots.to_vec();
        sorted.sort();
        sorted.dedup();
        Self {
            lock_version: LOCK_VERSION,
            lock_key: compute_lock_key(&sorted),
            roots: sorted,
            declared: declaration_order(roots),
            modules,
        }
    }

    /// Whether the stored classpath was produced from `roots` in this order.
    pub fn matches_declaration(&self, roots: &[Coordinate]) -> bool {
        self.declared == declaration_order(roots)
    }

    /// Check the stored key against the stored roots.
    pub fn verify_integrity(&self) -> Result<(), LockError> {
        if self.lock_version != LOCK_VERSION {
            return Err(LockError::UnsupportedVersion(self.lock_version));
        }
        let computed = compute_lock_key(&self.roots);
        if computed != self.lock_key {
            return Err(LockError::KeyMismatch {
                lock_key: self.lock_key.to_string(),
                computed_key: computed.into_inner(),
            });
        }
        Ok(())
    }

    pub fn module(&self, coordinate: &Coordinate) -> Option<&LockedModule> {
        self.modules.iter().find(|m| &m.coordinate == coordinate)
    }

    pub fn references(&self, coordinate: &Coordinate) -> bool {
        self.module(coordinate).is_some()
    }

    pub fn to_toml(&self) -> Result<String, LockError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, LockError> {
        Ok(toml::from_str(content)?)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), LockError> {
        let path = path.as_ref();
        let content = self.to_toml()?;
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LockError::Io(e.error))?;
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}
