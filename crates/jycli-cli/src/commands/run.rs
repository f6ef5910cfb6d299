use super::{
    dim, json_pretty, script_exit_code, spin_fail, spin_ok, CliError, Context, EXIT_SUCCESS,
};
use jycli_core::{LaunchPlan, Launcher, StoreLock};
use jycli_runtime::{select_host, Invocation};
use tracing::warn;

/// How the script should be started, from the command line.
#[derive(Debug, Default)]
pub struct RunRequest {
    pub invocation: Invocation,
    pub cli_debug: bool,
    pub dry_run: bool,
    pub host: String,
}

pub fn run(ctx: &Context, request: &RunRequest) -> Result<u8, CliError> {
    let resolver = ctx.resolver()?;
    let host = select_host(&request.host).map_err(|e| CliError::from(e.to_string()))?;
    let cancel = ctx.cancel_token();
    // Shared hold: `cache gc` and `cache evict` wait until the launch has its classpath.
    let store_lock = StoreLock::acquire_shared(&ctx.layout.lock_file(), &cancel)?;

    let mut launcher = Launcher::new(&resolver, host.as_ref());
    let pb = ctx.spinner("resolving dependencies...");
    let mut plan = match launcher.plan(&request.invocation, &cancel) {
        Ok(plan) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("{} modules on the classpath", plan.resolved.len()));
            }
            plan
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "dependency resolution failed");
            }
            return Err(e.into());
        }
    };
    drop(store_lock);

    if request.dry_run {
        if let Err(e) = launcher.prepare_host(&mut plan) {
            warn!("{e}");
        }
        print_debug(&plan, request.cli_debug);
        return print_plan(&plan, ctx.json);
    }

    let located = launcher.prepare_host(&mut plan);
    print_debug(&plan, request.cli_debug);
    located?;

    let code = launcher.run(&plan)?;
    Ok(script_exit_code(code))
}

fn print_debug(plan: &LaunchPlan, cli_debug: bool) {
    if cli_debug || plan.manifest.debug {
        eprint!("{}", dim(&plan.debug_report()));
    }
}

fn print_plan(plan: &LaunchPlan, json: bool) -> Result<u8, CliError> {
    if json {
        let payload = serde_json::json!({
            "lock_key": plan.resolved.lock_key,
            "from_lock": plan.resolved.from_lock,
            "modules": plan.resolved.modules,
            "java": plan.java,
            "launch": plan.config,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{}", plan.config.display_command());
    }
    Ok(EXIT_SUCCESS)
}
