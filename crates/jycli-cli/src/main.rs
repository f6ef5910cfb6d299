mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::run::RunRequest;
use commands::{cache_dir, stderr_is_terminal, CliError, Context};
use jycli_core::ResolveOptions;
use jycli_runtime::Invocation;
use jycli_store::CacheLayout;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

pub const BIN_NAME: &str = "jython-cli";

/// Interpreter version followed by the launcher's own fix number.
const LAUNCHER_VERSION: &str = "2.7.4.0";

#[derive(Debug, Parser)]
#[command(
    name = BIN_NAME,
    version = LAUNCHER_VERSION,
    about = "Run Jython scripts that declare their own dependencies",
    long_about = "Run Jython scripts that declare their own dependencies.\n\n\
        The script's `# /// jbang` comment block names the interpreter version, \
        the required Java version, Maven dependencies and JVM options. Everything \
        after the script path is passed to the script unchanged."
)]
struct Cli {
    /// Print the manifest block, the parsed manifest and the final command on
    /// stderr. Also recognised after the script path; never passed to the script.
    #[arg(long, default_value_t = false)]
    cli_debug: bool,

    /// Artifact cache directory [default: $JYCLI_CACHE_DIR, $XDG_CACHE_HOME/jython-cli or ~/.cache/jython-cli].
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<String>,

    /// Maven repository URL or local directory; repeat to list several (replaces the configured ones).
    #[arg(long = "repository", global = true, value_name = "URL|PATH")]
    repositories: Vec<String>,

    /// Resolve from the cache only.
    #[arg(long, default_value_t = false, global = true)]
    offline: bool,

    /// Re-download every dependency, keeping previously recorded digests.
    #[arg(long, default_value_t = false, global = true, conflicts_with = "offline")]
    refresh: bool,

    /// Give up dependency resolution after this many seconds.
    #[arg(long, global = true, value_name = "SECS")]
    resolve_timeout: Option<u64>,

    /// Resolve and configure, print the command instead of running it.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Interpreter option placed before the script (repeatable).
    #[arg(long = "jython-opt", value_name = "OPT", allow_hyphen_values = true)]
    jython_opts: Vec<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Script to run, followed by its arguments. Without a script the
    /// interactive console starts.
    #[arg(value_name = "SCRIPT", trailing_var_arg = true)]
    script_and_args: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show a script's manifest, resolved classpath and launch command.
    Inspect {
        /// Path to the script.
        script: PathBuf,
    },
    /// Inspect and maintain the artifact cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// List cached artifacts.
    List,
    /// Recompute digests of every cached artifact and lock.
    Verify,
    /// Remove artifacts no resolution lock references.
    Gc {
        /// Only report what would be removed.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Remove one artifact and every lock that uses it.
    Evict {
        /// Coordinate as group:artifact:version.
        coordinate: String,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_env("JYCLI_LOG");
    let quiet = env_filter.is_err() && !cli.trace && !cli.verbose;
    tracing_subscriber::fmt()
        .with_env_filter(
            env_filter.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match dispatch(cli, quiet) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {}", e.message);
            ExitCode::from(e.code)
        }
    }
}

fn dispatch(cli: Cli, quiet: bool) -> Result<u8, CliError> {
    match cli.command {
        Some(Commands::Completions { shell }) => Ok(commands::completions::run::<Cli>(shell)?),
        Some(Commands::ManPages { ref dir }) => Ok(commands::man_pages::run::<Cli>(dir)?),
        Some(Commands::Inspect { ref script }) => {
            let ctx = context(&cli, quiet)?;
            commands::inspect::run(&ctx, script, &host_name())
        }
        Some(Commands::Cache { ref action }) => {
            let ctx = context(&cli, quiet)?;
            match action {
                CacheCommand::List => commands::cache::list(&ctx.layout, ctx.json),
                CacheCommand::Verify => commands::cache::verify(&ctx.layout, ctx.json),
                CacheCommand::Gc { dry_run } => {
                    commands::cache::gc(&ctx.layout, *dry_run, ctx.json)
                }
                CacheCommand::Evict { coordinate } => {
                    commands::cache::evict(&ctx.layout, coordinate, ctx.json)
                }
            }
        }
        None => {
            let ctx = context(&cli, quiet)?;
            let mut script_and_args = cli.script_and_args;
            let cli_debug = take_cli_debug(&mut script_and_args) || cli.cli_debug;
            let mut words = script_and_args.into_iter();
            let invocation = Invocation {
                script: words.next().map(PathBuf::from),
                interpreter_args: cli.jython_opts,
                program_args: words.collect(),
            };
            let request = RunRequest {
                invocation,
                cli_debug,
                dry_run: cli.dry_run,
                host: host_name(),
            };
            commands::run::run(&ctx, &request)
        }
    }
}

/// `--cli-debug` belongs to the launcher wherever it appears, even after the
/// script path. Removes it and reports whether it was there.
fn take_cli_debug(words: &mut Vec<String>) -> bool {
    let before = words.len();
    words.retain(|w| w != "--cli-debug");
    words.len() != before
}

/// `JYCLI_HOST` picks the host backend; `mock` records instead of running.
fn host_name() -> String {
    std::env::var("JYCLI_HOST")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "jvm".to_owned())
}

fn context(cli: &Cli, quiet: bool) -> Result<Context, CliError> {
    let flag = cli.cache_dir.as_deref().map(expand_tilde);
    let root = cache_dir(flag.as_deref(), |key| std::env::var(key).ok())?;
    Ok(Context {
        layout: CacheLayout::new(root),
        repositories: cli.repositories.clone(),
        options: ResolveOptions {
            offline: cli.offline,
            refresh: cli.refresh,
            ..ResolveOptions::default()
        },
        resolve_timeout: cli.resolve_timeout.map(Duration::from_secs),
        json: cli.json,
        interactive: quiet && stderr_is_terminal(),
    })
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
