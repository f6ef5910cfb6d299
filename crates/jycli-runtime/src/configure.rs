use crate::locate::JavaInstallation;
use crate::RuntimeError;
use jycli_schema::{split_flag, HostVersion, Manifest, RuntimeOptions};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

/// Interpreter entry point on the classpath.
pub const MAIN_CLASS: &str = "org.python.util.jython";

/// Applied to every launch unless the manifest declares the same key.
pub const DEFAULT_FLAGS: &[&str] = &["-Dpython.console.encoding=UTF-8"];

/// Appended when the manifest sets `debug = true`, again skipping declared keys.
pub const DEBUG_FLAGS: &[&str] = &[
    "-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,address=5005",
    "-Dpython.verbose=debug",
    "-XX:+ShowCodeDetailsInExceptionMessages",
];

/// What the user asked to run, as opposed to what the manifest declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// `None` starts the interactive console.
    pub script: Option<PathBuf>,
    /// Interpreter options placed before the script (`--jython-opt`).
    pub interpreter_args: Vec<String>,
    /// Forwarded verbatim after the script.
    pub program_args: Vec<String>,
}

impl Invocation {
    pub fn script(path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            script: Some(path.into()),
            interpreter_args: Vec::new(),
            program_args: args,
        }
    }
}

/// Everything needed to start the host process. Derived per launch and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchConfig {
    pub host: HostVersion,
    /// Filled once a matching installation has been located.
    pub java: Option<PathBuf>,
    pub jvm_flags: Vec<String>,
    pub classpath: Vec<PathBuf>,
    pub main_class: String,
    pub interpreter_args: Vec<String>,
    pub script: Option<PathBuf>,
    pub program_args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Derive the launch configuration. Never fails: unknown option keys pass
/// through verbatim and defaults only fill keys the manifest left open.
pub fn configure(
    manifest: &Manifest,
    classpath: Vec<PathBuf>,
    invocation: &Invocation,
) -> LaunchConfig {
    let mut options = manifest.runtime_options.clone();
    add_missing(&mut options, DEFAULT_FLAGS);
    if manifest.debug {
        add_missing(&mut options, DEBUG_FLAGS);
    }

    LaunchConfig {
        host: manifest.host_version,
        java: None,
        jvm_flags: options.to_flags(),
        classpath,
        main_class: MAIN_CLASS.to_owned(),
        interpreter_args: invocation.interpreter_args.clone(),
        script: invocation.script.clone(),
        program_args: invocation.program_args.clone(),
        env: BTreeMap::new(),
    }
}

fn add_missing(options: &mut RuntimeOptions, flags: &[&str]) {
    for flag in flags {
        let (key, value) = split_flag(flag);
        if !options.contains_key(&key) {
            options.set(key, value);
        }
    }
}

impl LaunchConfig {
    /// Record the installation that will run this configuration.
    pub fn bind_host(&mut self, java: &JavaInstallation) {
        self.java = Some(java.executable.clone());
        self.env
            .insert("JAVA_HOME".to_owned(), java.home.display().to_string());
    }

    /// Classpath joined with the platform separator.
    pub fn classpath_value(&self) -> Result<OsString, RuntimeError> {
        std::env::join_paths(&self.classpath)
            .map_err(|e| RuntimeError::InvalidClasspath(e.to_string()))
    }

    /// Arguments after the executable, in launch order.
    pub fn arguments(&self) -> Result<Vec<OsString>, RuntimeError> {
        let mut args: Vec<OsString> = self.jvm_flags.iter().map(OsString::from).collect();
        if !self.classpath.is_empty() {
            args.push("-cp".into());
            args.push(self.classpath_value()?);
        }
        args.push(self.main_class.clone().into());
        args.extend(self.interpreter_args.iter().map(OsString::from));
        if let Some(ref script) = self.script {
            args.push(script.clone().into_os_string());
        }
        args.extend(self.program_args.iter().map(OsString::from));
        Ok(args)
    }

    /// Pretty JSON for `--dry-run --json`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable command line for diagnostics.
    pub fn display_command(&self) -> String {
        let java = self
            .java
            .as_ref()
            .map_or_else(|| crate::java_executable_name().to_owned(), |p| p.display().to_string());
        let args = self.arguments().unwrap_or_default();
        let mut parts = vec![java];
        parts.extend(args.iter().map(|a| quote(&a.to_string_lossy())));
        parts.join(" ")
    }
}

fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
        return arg.to_owned();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}
