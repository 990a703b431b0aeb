//! xBake CLI - Command-line interface for texture baking
//!
//! This binary bakes texture maps from a highpoly mesh onto a lowpoly mesh
//! in a background Blender, previews job plans and checks the local setup.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use xbake_cli::commands;
use xbake_cli::commands::bake::BakeArgs;

/// xBake - Texture bake orchestration
#[derive(Parser)]
#[command(name = "xbake")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a lowpoly/highpoly pair into Blender and bake maps
    Bake(BakeArgs),

    /// Print the jobs a configuration would run and their output paths
    Plan {
        /// JSON bake configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Target object name
        #[arg(short, long)]
        target: String,

        /// Source object name
        #[arg(short, long)]
        source: Option<String>,

        /// Project root for automatic output paths
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Output the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check Blender discovery and write permissions
    Doctor {
        /// Path to the Blender executable
        #[arg(long)]
        blender: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Bake(args) => commands::bake::run(&args),
        Commands::Plan {
            config,
            target,
            source,
            project,
            json,
        } => commands::plan::run(&config, &target, source.as_deref(), &project, json),
        Commands::Doctor { blender } => commands::doctor::run(blender.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_bake() {
        let cli = Cli::try_parse_from([
            "xbake",
            "bake",
            "--lowpoly",
            "rock_low.fbx",
            "--highpoly",
            "rock_high.fbx",
            "--no-ao",
            "--resolution",
            "1024",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Bake(args) => {
                assert_eq!(args.lowpoly, PathBuf::from("rock_low.fbx"));
                assert_eq!(args.highpoly, PathBuf::from("rock_high.fbx"));
                assert!(args.no_ao);
                assert!(!args.no_normal);
                assert_eq!(args.resolution, Some(1024));
                assert!(!args.dry_run);
            }
            _ => panic!("expected bake command"),
        }
    }

    #[test]
    fn test_cli_bake_requires_both_meshes() {
        assert!(Cli::try_parse_from(["xbake", "bake", "--lowpoly", "rock_low.fbx"]).is_err());
    }

    #[test]
    fn test_cli_parses_plan() {
        let cli = Cli::try_parse_from([
            "xbake",
            "plan",
            "--config",
            "bake.json",
            "--target",
            "Rock_Low",
            "--source",
            "Rock_High",
        ])
        .unwrap();
        match cli.command {
            Commands::Plan {
                config,
                target,
                source,
                project,
                json,
            } => {
                assert_eq!(config, PathBuf::from("bake.json"));
                assert_eq!(target, "Rock_Low");
                assert_eq!(source.as_deref(), Some("Rock_High"));
                assert_eq!(project, PathBuf::from("."));
                assert!(!json);
            }
            _ => panic!("expected plan command"),
        }
    }

    #[test]
    fn test_cli_parses_doctor() {
        let cli = Cli::try_parse_from(["xbake", "doctor"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert!(matches!(cli.command, Commands::Doctor { blender: None }));
    }
}
