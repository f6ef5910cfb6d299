use super::EXIT_SUCCESS;
use clap::{Command, CommandFactory};
use std::path::Path;

fn render(cmd: Command, dir: &Path, name: &str) -> Result<(), String> {
    let mut buf = Vec::new();
    clap_mangen::Man::new(cmd)
        .render(&mut buf)
        .map_err(|e| format!("man page render failed: {e}"))?;
    let path = dir.join(format!("{name}.1"));
    std::fs::write(&path, &buf).map_err(|e| format!("failed to write {}: {e}", path.display()))
}

/// One page for the launcher and one per subcommand, nested ones included
/// (`jython-cli-cache-gc.1`).
pub fn run<C: CommandFactory>(dir: &Path) -> Result<u8, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("failed to create dir: {e}"))?;
    let cmd = C::command();
    render(cmd.clone(), dir, crate::BIN_NAME)?;
    let mut pending: Vec<(String, Command)> = cmd
        .get_subcommands()
        .map(|sub| (format!("{}-{}", crate::BIN_NAME, sub.get_name()), sub.clone()))
        .collect();
    while let Some((name, sub)) = pending.pop() {
        for nested in sub.get_subcommands() {
            pending.push((format!("{name}-{}", nested.get_name()), nested.clone()));
        }
        render(sub, dir, &name)?;
    }
    println!("man pages written to {}", dir.display());
    Ok(EXIT_SUCCESS)
}
