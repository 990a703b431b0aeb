//! `xbake doctor`: is Blender reachable, can maps be written here?

use anyhow::Result;
use colored::Colorize;
use std::env;
use std::path::Path;
use std::process::ExitCode;
use xbake_backend_blender::{BlenderError, Orchestrator, OrchestratorConfig};

/// Prints the xbake version, the Blender that would be used and whether the
/// working directory accepts new files. Exits with 1 when Blender is missing
/// or the directory is read-only.
pub fn run(blender: Option<&Path>) -> Result<ExitCode> {
    println!("{}", "xBake Doctor".cyan().bold());
    println!("{}", "============".cyan());
    println!();

    let mut all_ok = true;

    println!("{}", "Versions:".bold());
    println!("  {} xbake-cli v{}", "->".green(), env!("CARGO_PKG_VERSION"));
    println!();

    println!("{}", "Blender:".bold());
    let mut config = OrchestratorConfig::default();
    if let Some(path) = blender {
        config = config.blender_path(path);
    }
    let orchestrator = Orchestrator::with_config(config);
    match orchestrator.find_blender() {
        Ok(path) => match orchestrator.blender_version() {
            Ok(version) => {
                println!("  {} {} ({})", "ok".green(), version, path.display());
            }
            Err(e) => {
                println!("  {} Blender at {} failed to run: {}", "!!".red(), path.display(), e);
                all_ok = false;
            }
        },
        Err(BlenderError::BlenderNotFound) => {
            println!("  {} Blender not found", "!!".red());
            println!(
                "     {}",
                "Set BLENDER_PATH, pass --blender, or add Blender to PATH.".dimmed()
            );
            println!(
                "     {}",
                "Blender 3.6 LTS or newer: https://www.blender.org/download/".dimmed()
            );
            all_ok = false;
        }
        Err(e) => {
            println!("  {} {}", "!!".red(), e);
            all_ok = false;
        }
    }

    println!();

    println!("{}", "Output:".bold());
    match env::current_dir() {
        Ok(dir) => match check_writable(&dir) {
            Ok(()) => println!(
                "  {} {} accepts new files",
                "ok".green(),
                dir.display()
            ),
            Err(e) => {
                println!("  {} {} is not writable: {}", "!!".red(), dir.display(), e);
                all_ok = false;
            }
        },
        Err(e) => {
            println!("  {} no working directory: {}", "!!".red(), e);
            all_ok = false;
        }
    }

    println!();

    if all_ok {
        println!("{} ready to bake", "SUCCESS".green().bold());
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "{} fix the items marked !! above",
            "FAILED".red().bold()
        );
        Ok(ExitCode::from(1))
    }
}

/// Writes and removes a probe file in `dir`.
fn check_writable(dir: &Path) -> std::io::Result<()> {
    let probe = dir.join(".xbake_write_test");
    std::fs::write(&probe, "test")?;
    std::fs::remove_file(&probe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_writable_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        check_writable(dir.path()).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_check_writable_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_writable(&dir.path().join("missing")).is_err());
    }
}
