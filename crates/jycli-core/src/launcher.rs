use crate::concurrency::set_host_running;
use crate::lifecycle::{validate_transition, LaunchPhase};
use crate::resolver::{ResolvedModuleSet, Resolver};
use crate::CoreError;
use jycli_remote::CancelToken;
use jycli_runtime::{configure, HostRuntime, Invocation, JavaInstallation, LaunchConfig};
use jycli_schema::{extract_block, parse_block, EmbeddedBlock, Manifest, ManifestError};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

/// Everything decided before the host starts.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub manifest: Manifest,
    /// `None` when the script has no block (or there is no script).
    pub block: Option<EmbeddedBlock>,
    pub resolved: ResolvedModuleSet,
    pub config: LaunchConfig,
    /// Set by [`Launcher::prepare_host`].
    pub java: Option<JavaInstallation>,
}

impl LaunchPlan {
    /// Multi-line dump of the block with its source lines, the parsed
    /// manifest and the classpath, for `--cli-debug` and `debug = true`.
    pub fn debug_report(&self) -> String {
        let mut out = String::new();
        match self.block {
            Some(ref block) => {
                let _ = writeln!(
                    out,
                    "[jython-cli] manifest block, lines {}-{}:",
                    block.open_line, block.close_line
                );
                out.push_str(&render_block(block));
            }
            None => out.push_str("[jython-cli] no manifest block, using defaults\n"),
        }
        let json = self
            .manifest
            .canonical_json()
            .unwrap_or_else(|e| format!("<unserializable: {e}>"));
        let _ = writeln!(out, "[jython-cli] manifest: {json}");
        let _ = writeln!(
            out,
            "[jython-cli] classpath ({} modules, lock {}{}):",
            self.resolved.len(),
            self.resolved.lock_key.short(),
            if self.resolved.from_lock { ", cached" } else { "" }
        );
        for module in &self.resolved.modules {
            let _ = writeln!(out, "  {:<60} {}", module.coordinate, module.path.display());
        }
        if let Some(ref java) = self.java {
            let _ = writeln!(out, "[jython-cli] java {} at {}", java.version, java.home.display());
        }
        let _ = writeln!(out, "[jython-cli] command: {}", self.config.display_command());
        out
    }
}

/// Block lines prefixed with their script line numbers.
pub fn render_block(block: &EmbeddedBlock) -> String {
    let width = block.close_line.to_string().len();
    let mut out = String::new();
    for (line_no, text) in &block.lines {
        let _ = writeln!(out, "  {line_no:>width$} | {text}");
    }
    out
}

/// Read a script's manifest. A script without a block, or no script at all,
/// gets [`Manifest::default`].
pub fn load_manifest(script: Option<&Path>) -> Result<(Manifest, Option<EmbeddedBlock>), ManifestError> {
    let Some(path) = script else {
        return Ok((Manifest::default(), None));
    };
    let source = std::fs::read_to_string(path)?;
    match extract_block(&source) {
        Ok(block) => {
            let manifest = parse_block(&block)?.normalize()?;
            Ok((manifest, Some(block)))
        }
        Err(ManifestError::NotFound) => {
            info!("{} has no manifest block; using defaults", path.display());
            Ok((Manifest::default(), None))
        }
        Err(e) => Err(e),
    }
}

/// Drives one launch through its phases.
///
/// `plan` stops at `Configured` without starting anything; `launch` goes on
/// to locate the host and run it. Any failure before `Running` ends in
/// `Failed` and no host is started.
pub struct Launcher<'a> {
    resolver: &'a Resolver,
    host: &'a dyn HostRuntime,
    phase: LaunchPhase,
}

impl<'a> Launcher<'a> {
    pub fn new(resolver: &'a Resolver, host: &'a dyn HostRuntime) -> Self {
        Self {
            resolver,
            host,
            phase: LaunchPhase::Init,
        }
    }

    pub fn phase(&self) -> LaunchPhase {
        self.phase
    }

    fn advance(&mut self, to: LaunchPhase) -> Result<(), CoreError> {
        validate_transition(self.phase, to)?;
        debug!("launch phase {} -> {to}", self.phase);
        self.phase = to;
        Ok(())
    }

    fn fail(&mut self) {
        if !self.phase.is_terminal() {
            debug!("launch phase {} -> failed", self.phase);
            self.phase = LaunchPhase::Failed;
        }
    }

    fn failing<T>(&mut self, result: Result<T, CoreError>) -> Result<T, CoreError> {
        if result.is_err() {
            self.fail();
        }
        result
    }

    /// Parse, resolve and configure.
    pub fn plan(&mut self, invocation: &Invocation, cancel: &CancelToken) -> Result<LaunchPlan, CoreError> {
        let result = self.plan_phases(invocation, cancel);
        self.failing(result)
    }

    fn plan_phases(&mut self, invocation: &Invocation, cancel: &CancelToken) -> Result<LaunchPlan, CoreError> {
        let (manifest, block) = load_manifest(invocation.script.as_deref())?;
        self.advance(LaunchPhase::ManifestParsed)?;

        let resolved = self.resolver.resolve(&manifest, cancel)?;
        self.advance(LaunchPhase::DependenciesResolved)?;

        let config = configure(&manifest, resolved.classpath(), invocation);
        self.advance(LaunchPhase::Configured)?;

        Ok(LaunchPlan {
            manifest,
            block,
            resolved,
            config,
            java: None,
        })
    }

    /// Locate an installation for the plan and bind it.
    pub fn prepare_host(&mut self, plan: &mut LaunchPlan) -> Result<(), CoreError> {
        let located = self.host.locate(&plan.config.host).map_err(CoreError::from);
        let java = self.failing(located)?;
        plan.config.bind_host(&java);
        plan.java = Some(java);
        Ok(())
    }

    /// Start the host and wait for it. Returns the script's exit code.
    pub fn run(&mut self, plan: &LaunchPlan) -> Result<i32, CoreError> {
        let Some(ref java) = plan.java else {
            let err = CoreError::InvalidTransition {
                from: self.phase.to_string(),
                to: format!("{} (no host located)", LaunchPhase::Running),
            };
            self.fail();
            return Err(err);
        };
        self.advance(LaunchPhase::Running)?;

        set_host_running(true);
        let result = self.host.launch(java, &plan.config);
        set_host_running(false);

        match result {
            Ok(0) => {
                self.advance(LaunchPhase::Completed)?;
                Ok(0)
            }
            Ok(code) => {
                self.advance(LaunchPhase::Failed)?;
                debug!("script exited with {code}");
                Ok(code)
            }
            Err(e) => {
                self.advance(LaunchPhase::Failed)?;
                Err(e.into())
            }
        }
    }

    /// `plan`, `prepare_host` and `run` in one call.
    pub fn launch(&mut self, invocation: &Invocation, cancel: &CancelToken) -> Result<i32, CoreError> {
        let mut plan = self.plan(invocation, cancel)?;
        self.prepare_host(&mut plan)?;
        self.run(&plan)
    }
}
