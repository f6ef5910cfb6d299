use crate::backend::HostRuntime;
use crate::configure::LaunchConfig;
use crate::locate::{JavaInstallation, JavaLocator};
use crate::RuntimeError;
use jycli_schema::HostVersion;
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, info};

/// Runs the interpreter in a real JVM found through [`JavaLocator`].
#[derive(Debug, Default)]
pub struct JvmHost {
    locator: Option<JavaLocator>,
}

impl JvmHost {
    /// Search the environment when asked to locate.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locator(locator: JavaLocator) -> Self {
        Self {
            locator: Some(locator),
        }
    }

    /// The process command for `config` on `java`, without spawning it.
    pub fn command(java: &JavaInstallation, config: &LaunchConfig) -> Result<Command, RuntimeError> {
        let mut cmd = Command::new(&java.executable);
        cmd.args(config.arguments()?);
        cmd.envs(&config.env);
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        Ok(cmd)
    }
}

impl HostRuntime for JvmHost {
    fn name(&self) -> &'static str {
        "jvm"
    }

    fn locate(&self, requirement: &HostVersion) -> Result<JavaInstallation, RuntimeError> {
        match self.locator {
            Some(ref locator) => locator.find(requirement),
            None => JavaLocator::from_env().find(requirement),
        }
    }

    fn launch(&self, java: &JavaInstallation, config: &LaunchConfig) -> Result<i32, RuntimeError> {
        let mut cmd = Self::command(java, config)?;
        info!("starting Java {} for {}", java.version, describe(config));
        let status = cmd.status().map_err(|e| {
            RuntimeError::ExecFailed(format!(
                "failed to start {}: {e}",
                java.executable.display()
            ))
        })?;
        let code = exit_code(status);
        debug!("host exited with {code}");
        Ok(code)
    }
}

fn describe(config: &LaunchConfig) -> String {
    config
        .script
        .as_ref()
        .map_or_else(|| "interactive console".to_owned(), |s| s.display().to_string())
}

/// Exit code of a finished process, mapping signal death to `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
