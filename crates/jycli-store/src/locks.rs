use crate::layout::CacheLayout;
use crate::StoreError;
use jycli_schema::{Coordinate, LockKey, ResolutionLock};
use std::fs;
use std::io;
use tracing::warn;

/// Resolved module sets, one TOML file per lock key.
#[derive(Debug, Clone)]
pub struct LockIndex {
    layout: CacheLayout,
}

impl LockIndex {
    pub fn new(layout: CacheLayout) -> Self {
        Self { layout }
    }

    pub fn put(&self, lock: &ResolutionLock) -> Result<(), StoreError> {
        fs::create_dir_all(self.layout.locks_dir())?;
        lock.write_to_file(self.layout.lock_path(&lock.lock_key))?;
        Ok(())
    }

    /// Load the lock stored under `key`. A file whose content does not match
    /// its key is reported as an integrity failure.
    pub fn get(&self, key: &LockKey) -> Result<Option<ResolutionLock>, StoreError> {
        let path = self.layout.lock_path(key);
        let lock = match ResolutionLock::read_from_file(&path) {
            Ok(lock) => lock,
            Err(jycli_schema::LockError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };
        lock.verify_integrity()?;
        if &lock.lock_key != key {
            return Err(StoreError::IntegrityFailure {
                item: format!("lock {}", key.short()),
                expected: key.to_string(),
                actual: lock.lock_key.to_string(),
            });
        }
        Ok(Some(lock))
    }

    pub fn exists(&self, key: &LockKey) -> bool {
        self.layout.lock_path(key).is_file()
    }

    pub fn remove(&self, key: &LockKey) -> Result<(), StoreError> {
        match fs::remove_file(self.layout.lock_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Keys of every stored lock, sorted.
    pub fn list_keys(&self) -> Result<Vec<LockKey>, StoreError> {
        let dir = self.layout.locks_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".toml")) else {
                continue;
            };
            if !stem.starts_with('.') {
                keys.push(LockKey::new(stem));
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Every readable lock. Corrupt entries are skipped with a warning.
    pub fn list(&self) -> Result<Vec<ResolutionLock>, StoreError> {
        let mut locks = Vec::new();
        for key in self.list_keys()? {
            match self.get(&key) {
                Ok(Some(lock)) => locks.push(lock),
                Ok(None) => {}
                Err(e) => warn!("skipping corrupted lock '{}': {e}", key.short()),
            }
        }
        Ok(locks)
    }

    /// Like `list()`, but surfaces per-entry failures for verification.
    #[allow(clippy::type_complexity)]
    pub fn list_with_errors(
        &self,
    ) -> Result<Vec<Result<ResolutionLock, (LockKey, StoreError)>>, StoreError> {
        let mut out = Vec::new();
        for key in self.list_keys()? {
            match self.get(&key) {
                Ok(Some(lock)) => out.push(Ok(lock)),
                Ok(None) => {}
                Err(e) => out.push(Err((key, e))),
            }
        }
        Ok(out)
    }

    /// Locks whose module set contains `coordinate`.
    pub fn referencing(&self, coordinate: &Coordinate) -> Result<Vec<LockKey>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|lock| lock.references(coordinate))
            .map(|lock| lock.lock_key)
            .collect())
    }
}
