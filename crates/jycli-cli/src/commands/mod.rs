pub mod cache;
pub mod completions;
pub mod inspect;
pub mod man_pages;
pub mod run;

use console::Term;
use indicatif::{ProgressBar, ProgressStyle};
use jycli_core::{install_signal_handler, CoreError, ResolveOptions, Resolver};
use jycli_remote::{open_source, ArtifactSource, CancelToken, RepositoryConfig, RepositoryList};
use jycli_store::CacheLayout;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 65;
pub const EXIT_RESOLVE_ERROR: u8 = 69;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Per-request HTTP timeout when `--resolve-timeout` is not given.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// A failed command: the message printed after `error: ` and the exit status.
#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
}

impl CliError {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<String> for CliError {
    fn from(message: String) -> Self {
        Self::new(EXIT_FAILURE, message)
    }
}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        Self::new(exit_code_for(&e), format!("{}: {e}", e.phase()))
    }
}

pub fn exit_code_for(e: &CoreError) -> u8 {
    use jycli_schema::ManifestError;
    match e {
        CoreError::Manifest(ManifestError::Io(_)) => EXIT_FAILURE,
        CoreError::Manifest(_) => EXIT_MANIFEST_ERROR,
        CoreError::Resolve(r) if r.is_interrupted() => EXIT_INTERRUPTED,
        CoreError::Resolve(_) => EXIT_RESOLVE_ERROR,
        _ => EXIT_FAILURE,
    }
}

/// The script's exit status, as far as a process exit code can carry it.
pub fn script_exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(EXIT_FAILURE)
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn spinner_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        spinner_style("{spinner:.cyan} {msg}")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(spinner_style("{msg}"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(spinner_style("{msg}"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Dimmed text for launcher diagnostics on stderr.
pub fn dim(text: &str) -> String {
    console::style(text).dim().to_string()
}

/// Where the artifact cache lives: `--cache-dir`, then `JYCLI_CACHE_DIR`,
/// then `$XDG_CACHE_HOME/jython-cli`, then `~/.cache/jython-cli`.
pub fn cache_dir(
    flag: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf, String> {
    if let Some(dir) = flag {
        return Ok(dir.to_path_buf());
    }
    let lookup = |key: &str| env(key).filter(|v| !v.is_empty());
    if let Some(dir) = lookup("JYCLI_CACHE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = lookup("XDG_CACHE_HOME") {
        return Ok(PathBuf::from(dir).join("jython-cli"));
    }
    match lookup("HOME") {
        Some(home) => Ok(PathBuf::from(home).join(".cache").join("jython-cli")),
        None => Err("cannot locate a cache directory: set --cache-dir or JYCLI_CACHE_DIR".to_owned()),
    }
}

/// Everything the global flags decide about resolution.
pub struct Context {
    pub layout: CacheLayout,
    pub repositories: Vec<String>,
    pub options: ResolveOptions,
    pub resolve_timeout: Option<Duration>,
    pub json: bool,
    /// Spinners only when stderr is a terminal and logging is quiet.
    pub interactive: bool,
}

impl Context {
    fn repository_list(&self) -> Result<RepositoryList, String> {
        if !self.repositories.is_empty() {
            return Ok(RepositoryList {
                repositories: self
                    .repositories
                    .iter()
                    .map(|r| RepositoryConfig::from_arg(r))
                    .collect(),
            });
        }
        RepositoryList::load_default().map_err(|e| e.to_string())
    }

    /// Resolver over the cache with the configured sources, in order.
    pub fn resolver(&self) -> Result<Resolver, CliError> {
        let timeout = self.resolve_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT);
        let sources: Vec<Arc<dyn ArtifactSource>> = self
            .repository_list()?
            .repositories
            .iter()
            .map(|config| Arc::from(open_source(config, timeout)))
            .collect();
        let resolver = Resolver::open(&self.layout, sources)
            .map_err(|e| CliError::from(CoreError::from(e)))?
            .with_options(self.options);
        tracing::debug!(
            "cache {} with sources {:?}",
            self.layout.root().display(),
            resolver.source_names()
        );
        Ok(resolver)
    }

    /// Token for one resolution, wired to Ctrl-C and `--resolve-timeout`.
    pub fn cancel_token(&self) -> CancelToken {
        let token = match self.resolve_timeout {
            Some(timeout) => CancelToken::new().with_timeout(timeout),
            None => CancelToken::new(),
        };
        install_signal_handler(&token);
        token
    }

    pub fn spinner(&self, msg: &str) -> Option<ProgressBar> {
        (self.interactive && !self.json).then(|| spinner(msg))
    }
}

pub fn stderr_is_terminal() -> bool {
    Term::stderr().is_term()
}
