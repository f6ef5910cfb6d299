use super::{json_pretty, CliError, Context, EXIT_SUCCESS};
use jycli_core::{render_block, Launcher, StoreLock};
use jycli_runtime::{select_host, Invocation};
use jycli_schema::ModuleOrigin;
use std::path::Path;

/// Parse, resolve and configure a script without running it.
pub fn run(ctx: &Context, script: &Path, host: &str) -> Result<u8, CliError> {
    let resolver = ctx.resolver()?;
    let host = select_host(host).map_err(|e| CliError::from(e.to_string()))?;
    let cancel = ctx.cancel_token();
    let _lock = StoreLock::acquire_shared(&ctx.layout.lock_file(), &cancel)?;

    let mut launcher = Launcher::new(&resolver, host.as_ref());
    let mut plan = launcher.plan(&Invocation::script(script, Vec::new()), &cancel)?;
    // A missing Java is reported, not fatal: the rest of the plan is still useful.
    let host_error = launcher.prepare_host(&mut plan).err().map(|e| e.to_string());

    if ctx.json {
        let payload = serde_json::json!({
            "script": script,
            "has_block": plan.block.is_some(),
            "manifest": plan.manifest,
            "lock_key": plan.resolved.lock_key,
            "from_lock": plan.resolved.from_lock,
            "modules": plan.resolved.modules,
            "java": plan.java,
            "host_error": host_error,
            "launch": plan.config,
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    let manifest = &plan.manifest;
    println!("script:          {}", script.display());
    match plan.block {
        Some(ref block) => println!("block:           lines {}-{}", block.open_line, block.close_line),
        None => println!("block:           (none, using defaults)"),
    }
    println!("requires-jython: {}", manifest.interpreter_version);
    println!("requires-java:   {}", manifest.host_version);
    println!("debug:           {}", manifest.debug);
    println!("lock:            {}", plan.resolved.lock_key.short());
    match (&plan.java, &host_error) {
        (Some(java), _) => println!("java:            {} ({})", java.version, java.home.display()),
        (None, Some(e)) => println!("java:            not found: {}", e.lines().next().unwrap_or("")),
        (None, None) => println!("java:            not located"),
    }
    if let Some(ref block) = plan.block {
        println!();
        print!("{}", render_block(block));
    }

    println!();
    println!("{:<52} {:>5}  ORIGIN", "MODULE", "DEPTH");
    for module in &plan.resolved.modules {
        let origin = match module.origin {
            ModuleOrigin::Declared => "declared".to_owned(),
            ModuleOrigin::Transitive { ref parent } => format!("via {parent}"),
        };
        println!("{:<52} {:>5}  {origin}", module.coordinate.to_string(), module.depth);
    }

    println!();
    println!("{}", plan.config.display_command());
    Ok(EXIT_SUCCESS)
}
