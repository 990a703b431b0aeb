//! Plan command implementation
//!
//! Prints the jobs a configuration would run and where each map is written,
//! without touching a scene.

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::Path;
use std::process::ExitCode;
use xbake_engine::plan_jobs;
use xbake_spec::{BakeConfiguration, ObjectNames};

use super::reporting;

/// Run the plan command
///
/// # Arguments
/// * `config_path` - JSON bake configuration
/// * `target` - Target object name, overriding the file
/// * `source` - Source object name, overriding the file
/// * `project` - Project root for automatic output paths
/// * `json_output` - Print the plan as JSON
///
/// # Returns
/// Exit code: 0 if the configuration is valid, 1 otherwise
pub fn run(
    config_path: &Path,
    target: &str,
    source: Option<&str>,
    project: &Path,
    json_output: bool,
) -> Result<ExitCode> {
    let mut config = BakeConfiguration::from_file(config_path).with_context(|| {
        format!(
            "Failed to load bake configuration: {}",
            config_path.display()
        )
    })?;
    config.target_object = Some(target.to_string());
    if let Some(source) = source {
        config.source_object = Some(source.to_string());
    }

    let validation = config.validate();
    let names = ObjectNames::from_config(&config);
    let jobs = match (&names, validation.ok) {
        (Some(names), true) => plan_jobs(&config, names, project),
        _ => Vec::new(),
    };

    if json_output {
        let output = json!({
            "ok": validation.ok,
            "errors": validation.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "warnings": validation.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "jobs": jobs,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{} {}", "Plan:".cyan().bold(), config_path.display());
        reporting::print_warnings(&validation.warnings);
        if validation.ok {
            reporting::print_jobs(&jobs);
        } else {
            reporting::print_errors(&validation.errors);
        }
    }

    Ok(if validation.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
