//! Artifact sources for jython-cli dependency resolution.
//!
//! This crate provides the `ArtifactSource` trait and its implementations:
//! `HttpRepository` for remote Maven repositories, `LocalRepository` for
//! directories in Maven layout and `MemorySource` for tests. It also owns the
//! repository configuration file and the `CancelToken` every fetch observes.

pub mod cancel;
pub mod config;
pub mod http;
pub mod local;
pub mod mock;

pub use cancel::{CancelToken, Interrupted};
pub use config::{
    default_config_path, RepositoryConfig, RepositoryList, RepositoryLocation, MAVEN_CENTRAL_URL,
};
pub use http::HttpRepository;
pub use local::LocalRepository;
pub use mock::{simple_pom, MemorySource};

use jycli_schema::{ArtifactKind, Coordinate};
use std::io::Write;
use std::time::Duration;
use thiserror::Error;

/// Sent as `User-Agent` on every HTTP request.
pub const USER_AGENT: &str = concat!("jython-cli/", env!("CARGO_PKG_VERSION"));

/// Size of the chunks sources copy with, checking cancellation in between.
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("{coordinate} ({kind}) not found in {source_name}")]
    NotFound {
        coordinate: Coordinate,
        kind: ArtifactKind,
        source_name: String,
    },
    #[error("repository config error: {0}")]
    Config(String),
    #[error("fetch {0}")]
    Interrupted(#[from] Interrupted),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }
}

/// A place artifacts can be fetched from.
pub trait ArtifactSource: Send + Sync {
    /// Short name used in diagnostics and cache records.
    fn name(&self) -> &str;

    /// Stream one file into `out`, returning the number of bytes written.
    ///
    /// Must return [`RemoteError::NotFound`] when the source simply does not
    /// have the file, so callers can try the next source. On any error `out`
    /// may hold a partial file and must be discarded.
    fn fetch(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<u64, RemoteError>;
}

/// Build the source a repository entry describes.
pub fn open_source(config: &RepositoryConfig, timeout: Duration) -> Box<dyn ArtifactSource> {
    match config.location() {
        RepositoryLocation::Http(_) => Box::new(HttpRepository::new(config.clone(), timeout)),
        RepositoryLocation::Local(path) => Box::new(LocalRepository::new(&config.name, path)),
    }
}

/// Copy `reader` into `out` in chunks, checking `cancel` before each one.
pub(crate) fn copy_with_cancel(
    reader: &mut dyn std::io::Read,
    out: &mut dyn Write,
    cancel: &CancelToken,
) -> Result<u64, RemoteError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        cancel.check()?;
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        out.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}
