//! Embedded manifest parsing, dependency coordinates, runtime options, POM
//! reading and resolution locks for jython-cli.
//!
//! This crate is the schema layer: it extracts the `# /// jbang` block from a
//! script (`extract_block`), parses and validates it into a `Manifest`, keys
//! JVM options by the flag they affect (`RuntimeOptions`), reads the parts of
//! Maven POMs that decide a classpath (`Pom`) and records resolved module sets
//! (`ResolutionLock`). Nothing here touches the network or runs a process.

pub mod checksum;
pub mod coordinate;
pub mod lock;
pub mod manifest;
pub mod normalize;
pub mod options;
pub mod pom;
pub mod types;

pub use checksum::{Checksum, ChecksumAlgorithm};
pub use coordinate::{ArtifactKind, Coordinate, CoordinateError, ModuleId};
pub use lock::{compute_lock_key, LockError, LockedModule, ModuleOrigin, ResolutionLock};
pub use manifest::{
    extract_block, parse_block, parse_manifest_str, parse_script_file, parse_script_str,
    EmbeddedBlock, HostSection, LauncherSection, ManifestError, ScriptManifest, BLOCK_CLOSE,
    BLOCK_OPEN,
};
pub use normalize::{HostVersion, Manifest, DEFAULT_HOST_MAJOR, DEFAULT_INTERPRETER_VERSION};
pub use options::{render_flag, split_flag, RuntimeOptions};
pub use pom::{Exclusion, Pom, PomDependency, PomError, RuntimeDependency};
pub use types::{ArtifactDigest, LockKey, ShortKey};

/// Group of the interpreter artifact every launch puts on the classpath.
pub const INTERPRETER_GROUP: &str = "org.python";
/// Artifact id of the standalone interpreter jar without bundled libraries.
pub const INTERPRETER_ARTIFACT: &str = "jython-slim";

/// Coordinate of the interpreter jar for `version`.
pub fn interpreter_coordinate(version: &str) -> Result<Coordinate, CoordinateError> {
    Coordinate::new(INTERPRETER_GROUP, INTERPRETER_ARTIFACT, version)
}
