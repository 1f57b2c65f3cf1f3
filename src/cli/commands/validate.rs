//! `ptk validate` command - Check project files without running them

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::output::print_validation_messages;
use crate::yaml::parser::load_project;

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Project files to validate
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Strict mode - warnings become errors
    #[arg(long)]
    pub strict: bool,

    /// Show summary only, don't show individual problems
    #[arg(long)]
    pub summary: bool,
}

/// Validation statistics
#[derive(Default)]
struct ValidationStats {
    files_checked: usize,
    files_passed: usize,
    files_failed: usize,
    total_errors: usize,
    total_warnings: usize,
}

pub fn run(args: ValidateArgs) -> Result<()> {
    let mut stats = ValidationStats::default();

    println!(
        "{} Validating {} file(s)...\n",
        style("→").blue(),
        args.paths.len()
    );

    for path in &args.paths {
        stats.files_checked += 1;

        let project = match load_project(path) {
            Ok(project) => project,
            Err(e) => {
                stats.files_failed += 1;
                stats.total_errors += 1;
                if !args.summary {
                    println!("{} {} - could not be loaded", style("✗").red(), path.display());
                    let report = miette::Report::new(e);
                    println!("{:?}", report);
                }
                continue;
            }
        };

        let report = project.validate();
        let errors = report.error_count();
        let warnings = report.warning_count();
        stats.total_errors += errors;
        stats.total_warnings += warnings;

        let failed = errors > 0 || (args.strict && warnings > 0);
        if failed {
            stats.files_failed += 1;
        } else {
            stats.files_passed += 1;
        }

        if !args.summary {
            if failed {
                println!(
                    "{} {} - {} error(s), {} warning(s)",
                    style("✗").red(),
                    path.display(),
                    errors,
                    warnings
                );
            } else if warnings > 0 {
                println!(
                    "{} {} - {} warning(s)",
                    style("✓").green(),
                    path.display(),
                    warnings
                );
            } else {
                println!("{} {}", style("✓").green(), path.display());
            }
            print_validation_messages(&report);
        }
    }

    // Print summary
    println!();
    println!("{}", style("─".repeat(60)).dim());
    println!("{}", style("Validation Summary").bold());
    println!("{}", style("─".repeat(60)).dim());
    println!("  Files checked:  {}", style(stats.files_checked).cyan());
    println!("  Files passed:   {}", style(stats.files_passed).green());
    println!("  Files failed:   {}", style(stats.files_failed).red());
    println!("  Total errors:   {}", style(stats.total_errors).red());
    if stats.total_warnings > 0 {
        println!("  Total warnings: {}", style(stats.total_warnings).yellow());
    }
    println!();

    match stats.files_failed {
        0 => {
            println!("{} All files passed validation!", style("✓").green().bold());
            Ok(())
        }
        1 => Err(miette::miette!("Validation failed: 1 file has errors")),
        n => Err(miette::miette!("Validation failed: {} files have errors", n)),
    }
}
