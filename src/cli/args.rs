//! Command line definition

use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::commands::example::ExampleArgs;
use crate::cli::commands::run::RunArgs;
use crate::cli::commands::validate::ValidateArgs;

#[derive(Parser, Debug)]
#[command(name = "ptk")]
#[command(version)]
#[command(about = "Reliability analysis of limit-state functions (FORM, directional sampling, crude Monte Carlo)")]
#[command(
    long_about = "Probabilistic Toolkit computes the reliability index and design point of a \
limit-state function Z(x) over random inputs described in a YAML project file."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, value_enum, default_value_t = OutputFormat::Auto)]
    pub format: OutputFormat,

    /// Debug logging of iterations and batches
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table for reports, YAML for data
    #[default]
    Auto,
    Table,
    Yaml,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the reliability method of a project file
    Run(RunArgs),

    /// Check project files without running them
    Validate(ValidateArgs),

    /// Print an example project file
    Example(ExampleArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_format_after_subcommand() {
        let cli = Cli::parse_from(["ptk", "run", "project.yaml", "--format", "json"]);
        assert_eq!(cli.global.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Run(_)));
    }
}
