use crate::configure::LaunchConfig;
use crate::locate::JavaInstallation;
use crate::RuntimeError;
use jycli_schema::HostVersion;

/// A way of starting the interpreter.
pub trait HostRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// Find an installation satisfying `requirement`.
    fn locate(&self, requirement: &HostVersion) -> Result<JavaInstallation, RuntimeError>;

    /// Start the host with inherited stdio and wait for it. Returns the
    /// process exit code; death by signal `n` is reported as `128 + n`.
    fn launch(&self, java: &JavaInstallation, config: &LaunchConfig) -> Result<i32, RuntimeError>;
}

/// `jvm` runs a real Java process; `mock` records launches without running
/// anything.
pub fn select_host(name: &str) -> Result<Box<dyn HostRuntime>, RuntimeError> {
    match name {
        "jvm" => Ok(Box::new(crate::jvm::JvmHost::new())),
        "mock" => Ok(Box::new(crate::mock::MockHost::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
