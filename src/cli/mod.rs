//! CLI module - argument parsing and command dispatch

pub mod args;
pub mod commands;
pub mod helpers;
pub mod output;

pub use args::{Cli, Commands, GlobalOpts, OutputFormat};

use miette::Result;

/// Dispatch a parsed command line
pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => commands::run::run(args, &cli.global),
        Commands::Validate(args) => commands::validate::run(args),
        Commands::Example(args) => commands::example::run(args, &cli.global),
    }
}
