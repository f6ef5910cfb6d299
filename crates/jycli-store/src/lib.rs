//! Persistent artifact cache for jython-cli.
//!
//! This crate provides the storage layer: `ArtifactStore` keeps repository
//! files keyed by coordinate with blake3/sha256 digests and atomic
//! publication, `LockIndex` keeps resolved module sets under their lock key,
//! `CacheLayout` owns the directory structure, `CacheGc` evicts unreferenced
//! entries and `verify_cache_integrity` re-checks everything on disk.

pub mod artifacts;
pub mod gc;
pub mod integrity;
pub mod layout;
pub mod locks;

pub use artifacts::{digest_file, ArtifactDigests, ArtifactRecord, ArtifactStore, StagedArtifact};
pub use gc::{CacheGc, EvictReport, GcReport, STAGING_GRACE};
pub use integrity::{verify_cache_integrity, IntegrityFailure, IntegrityReport};
pub use layout::{CacheLayout, CACHE_FORMAT_VERSION};
pub use locks::LockIndex;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for {item}: expected {expected}, got {actual}")]
    IntegrityFailure {
        item: String,
        expected: String,
        actual: String,
    },
    #[error("not cached: {0}")]
    NotCached(String),
    #[error("cache format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("lock record error: {0}")]
    Lock(#[from] jycli_schema::LockError),
}
