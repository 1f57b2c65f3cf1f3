//! `ptk example` command - Print an example project file

use miette::Result;
use std::collections::BTreeMap;

use crate::cli::commands::MethodArg;
use crate::cli::output::print_data;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::entities::project::ProjectFile;
use crate::reliability::ReliabilityMethod;
use crate::yaml::parser::parse_yaml;

/// Annotated project shipped with the binary
pub const EXAMPLE_PROJECT: &str = include_str!("../../../demos/resistance_load.yaml");

#[derive(clap::Args, Debug)]
pub struct ExampleArgs {
    /// Method section to show, with its default settings
    #[arg(long, short = 'm', value_enum)]
    pub method: Option<MethodArg>,
}

pub fn run(args: ExampleArgs, global: &GlobalOpts) -> Result<()> {
    let text = match args.method {
        Some(method) => replace_method(EXAMPLE_PROJECT, &method.default_method())?,
        None => EXAMPLE_PROJECT.to_string(),
    };

    if global.format == OutputFormat::Json {
        let project: ProjectFile = parse_yaml(&text, "example.yaml")?;
        return print_data(&project, OutputFormat::Json);
    }
    print!("{}", text);
    Ok(())
}

/// Swaps the `method:` block of a project text, keeping the comments elsewhere
fn replace_method(template: &str, method: &ReliabilityMethod) -> Result<String> {
    let start = template
        .find("\nmethod:")
        .ok_or_else(|| miette::miette!("example has no method section"))?;
    let end = template[start + 1..]
        .find("\n\n")
        .map_or(template.len(), |offset| start + 1 + offset);

    let section = BTreeMap::from([("method", method)]);
    let yaml = serde_yml::to_string(&section).map_err(|e| miette::miette!("{}", e))?;

    Ok(format!(
        "{}{}{}",
        &template[..=start],
        yaml.trim_end(),
        &template[end..]
    ))
}
