use colored::Colorize;
use xbake_engine::{BakeJob, BakeReport};
use xbake_spec::{ValidationError, ValidationWarning};

/// Print configuration warnings.
pub(crate) fn print_warnings(warnings: &[ValidationWarning]) {
    for warning in warnings {
        println!("  {} {}", "!".yellow(), warning);
    }
}

/// Print configuration errors to stderr.
pub(crate) fn print_errors(errors: &[ValidationError]) {
    for error in errors {
        eprintln!("  {} {}", "x".red(), error);
    }
}

/// Print the job list, one map per line.
pub(crate) fn print_jobs(jobs: &[BakeJob]) {
    for job in jobs {
        let kind = if job.pass.is_none() {
            "export".dimmed()
        } else if job.requires_graph() {
            "graph".dimmed()
        } else if job.lit {
            "lit".dimmed()
        } else {
            "unlit".dimmed()
        };
        println!(
            "  {:>2}. {:<22} {} {}",
            job.index + 1,
            job.map_type.to_string(),
            job.path().display(),
            kind
        );
    }
}

/// Print a finished run.
pub(crate) fn print_report(report: &BakeReport) {
    for map in &report.baked_maps {
        println!(
            "  {} {:<22} {} ({}x{}, {}-bit)",
            "ok".green(),
            map.map_type.to_string(),
            map.path.display(),
            map.resolution[0],
            map.resolution[1],
            map.bit_depth.bits()
        );
    }
    for warning in &report.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }
    for error in &report.errors {
        eprintln!("  {} {}", "x".red(), error);
    }
    println!(
        "{} {} map(s), margin {}px, {}ms",
        "Done:".dimmed(),
        report.baked_maps.len(),
        report.margin,
        report.duration_ms
    );
}
