//! `ptk run` command - Run the reliability method of a project

use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::cli::commands::MethodArg;
use crate::cli::helpers::display_name;
use crate::cli::output::{effective_format, print_data, print_design_point};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::validation::MessageType;
use crate::yaml::parser::load_project;

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Project file to run
    pub project: PathBuf,

    /// Use another method than the project's, with default settings
    #[arg(long, short = 'm', value_enum)]
    pub method: Option<MethodArg>,

    /// Seed for the sampling methods (makes the run repeatable)
    #[arg(long, short = 's')]
    pub seed: Option<u64>,

    /// Worker threads for model evaluation
    #[arg(long, short = 'j')]
    pub threads: Option<usize>,

    /// Show the convergence history
    #[arg(long, short = 'H')]
    pub history: bool,

    /// Keep every model evaluation in the output
    #[arg(long)]
    pub save_evaluations: bool,
}

pub fn run(args: RunArgs, global: &GlobalOpts) -> Result<()> {
    let mut project = load_project(&args.project)?;

    if let Some(method) = args.method {
        method.apply(&mut project.method);
    }
    if let Some(seed) = args.seed {
        project.method.set_seed(seed);
    }
    if let Some(threads) = args.threads {
        project.run_settings.max_parallel_processes = threads;
    }
    if args.save_evaluations {
        project.run_settings.save_evaluations = true;
    }

    let report = project.validate();
    for message in report.messages.iter().filter(|m| m.severity == MessageType::Warning) {
        warn!("{}", message);
    }
    if !report.is_valid() {
        let details: Vec<String> = report.errors().map(|m| format!("  {}", m)).collect();
        return Err(miette::miette!(
            "{} has {} error(s):\n{}",
            display_name(&args.project),
            report.error_count(),
            details.join("\n")
        ));
    }

    info!(project = %project.title(), method = %project.method, "Running project");
    let design_point = project.run().into_diagnostic()?;

    match effective_format(global.format, true) {
        OutputFormat::Table | OutputFormat::Auto => {
            let subtitle = format!("{} | {}", project.method, project.limit_state);
            print_design_point(&project.title(), &subtitle, &design_point, args.history);
        }
        format => print_data(&design_point, format)?,
    }
    Ok(())
}
