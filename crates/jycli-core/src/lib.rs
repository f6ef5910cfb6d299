//! Launch orchestration for jython-cli.
//!
//! This crate ties together manifest parsing, dependency resolution against
//! the artifact cache and the host runtime. `Resolver` turns a manifest into
//! an ordered classpath (level-parallel, single-flight per coordinate, locked
//! across processes), `Launcher` drives one launch through its phases and
//! `concurrency` holds the cache-wide locks and Ctrl-C handling.

pub mod concurrency;
pub mod flight;
pub mod launcher;
pub mod lifecycle;
pub mod resolver;

pub use concurrency::{
    install_signal_handler, set_host_running, shutdown_requested, CoordinateLock,
    CoordinateLockError, StoreLock, INTERRUPTED_EXIT,
};
pub use flight::FlightTable;
pub use launcher::{load_manifest, render_block, LaunchPlan, Launcher};
pub use lifecycle::{validate_transition, LaunchPhase};
pub use resolver::{
    ResolveError, ResolveOptions, ResolvedModule, ResolvedModuleSet, Resolver, DEFAULT_PARALLELISM,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] jycli_schema::ManifestError),
    #[error("dependency resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("store error: {0}")]
    Store(#[from] jycli_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] jycli_runtime::RuntimeError),
    #[error("invalid launch transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("remote error: {0}")]
    Remote(#[from] jycli_remote::RemoteError),
}

impl CoreError {
    /// Launch phase the error belongs to, for diagnostics.
    pub fn phase(&self) -> &'static str {
        match self {
            CoreError::Manifest(_) => "manifest",
            CoreError::Resolve(_) | CoreError::Store(_) | CoreError::Remote(_) => "resolve",
            CoreError::Runtime(jycli_runtime::RuntimeError::HostUnavailable { .. }) => "configure",
            CoreError::Runtime(_) => "run",
            CoreError::InvalidTransition { .. } | CoreError::Io(_) | CoreError::Serialization(_) => {
                "launcher"
            }
        }
    }

    /// True when the user or the resolve timeout stopped the launch.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, CoreError::Resolve(e) if e.is_interrupted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_only_for_cancelled_resolution() {
        assert!(CoreError::from(ResolveError::Cancelled).is_interrupted());
        assert!(CoreError::from(ResolveError::TimedOut).is_interrupted());
        assert!(!CoreError::from(ResolveError::InvalidRoot("x".into())).is_interrupted());
    }

    #[test]
    fn phase_names_the_failing_step() {
        let manifest = CoreError::from(jycli_schema::ManifestError::Invalid("x".into()));
        assert_eq!(manifest.phase(), "manifest");
        assert_eq!(CoreError::from(ResolveError::Cancelled).phase(), "resolve");
        let host = CoreError::from(jycli_runtime::RuntimeError::HostUnavailable {
            requirement: "21".into(),
            inspected: String::new(),
        });
        assert_eq!(host.phase(), "configure");
    }

    #[test]
    fn transition_error_names_both_phases() {
        let e = CoreError::InvalidTransition {
            from: "init".into(),
            to: "run".into(),
        };
        assert_eq!(e.to_string(), "invalid launch transition: init -> run");
    }
}
