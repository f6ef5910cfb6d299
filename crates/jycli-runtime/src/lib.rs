//! Host runtime layer for jython-cli.
//!
//! This crate turns a parsed manifest and a resolved classpath into a
//! `LaunchConfig` (JVM flags, classpath, interpreter entry point, program
//! arguments), locates a Java installation satisfying the manifest's
//! `requires-java`, and starts the interpreter through a pluggable
//! `HostRuntime` backend: the real JVM process, or a recording mock for tests.

pub mod backend;
pub mod configure;
pub mod jvm;
pub mod locate;
pub mod mock;

pub use backend::{select_host, HostRuntime};
pub use configure::{configure, Invocation, LaunchConfig, DEBUG_FLAGS, DEFAULT_FLAGS, MAIN_CLASS};
pub use jvm::JvmHost;
pub use locate::{java_executable_name, major_of, JavaInstallation, JavaLocator};
pub use mock::MockHost;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("host '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("no Java installation matching requires-java = \"{requirement}\" found\n{inspected}")]
    HostUnavailable {
        requirement: String,
        inspected: String,
    },
    #[error("classpath entry cannot be passed to the host: {0}")]
    InvalidClasspath(String),
    #[error("host execution failed: {0}")]
    ExecFailed(String),
}
