use crate::backend::HostRuntime;
use crate::configure::LaunchConfig;
use crate::locate::JavaInstallation;
use crate::RuntimeError;
use jycli_schema::HostVersion;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

/// Host that records launches instead of running them.
pub struct MockHost {
    launches: Mutex<Vec<LaunchConfig>>,
    exit_code: AtomicI32,
    available: AtomicBool,
}

impl Default for MockHost {
    fn default() -> Self {
        Self {
            launches: Mutex::new(Vec::new()),
            exit_code: AtomicI32::new(0),
            available: AtomicBool::new(true),
        }
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit code every launch reports. Also read from `JYCLI_MOCK_EXIT`.
    #[must_use]
    pub fn with_exit_code(self, code: i32) -> Self {
        self.exit_code.store(code, Ordering::SeqCst);
        self
    }

    /// Make `locate` fail as if no Java were installed.
    #[must_use]
    pub fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub fn launches(&self) -> Vec<LaunchConfig> {
        self.launches.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().map(|l| l.len()).unwrap_or(0)
    }
}

impl HostRuntime for MockHost {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn locate(&self, requirement: &HostVersion) -> Result<JavaInstallation, RuntimeError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(RuntimeError::HostUnavailable {
                requirement: requirement.to_string(),
                inspected: "inspected: mock host has no Java".to_owned(),
            });
        }
        let home = PathBuf::from(format!("/mock/jdk-{}", requirement.major));
        Ok(JavaInstallation {
            executable: home.join("bin").join(crate::java_executable_name()),
            home,
            version: format!("{}.0.0", requirement.major),
            major: requirement.major,
        })
    }

    fn launch(&self, _java: &JavaInstallation, config: &LaunchConfig) -> Result<i32, RuntimeError> {
        let mut launches = self
            .launches
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))?;
        launches.push(config.clone());
        let code = std::env::var("JYCLI_MOCK_EXIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| self.exit_code.load(Ordering::SeqCst));
        // Lets CLI tests observe the final command line.
        if std::env::var_os("JYCLI_MOCK_ECHO").is_some() {
            println!("mock-launch: {}", config.display_command());
        }
        Ok(code)
    }
}
