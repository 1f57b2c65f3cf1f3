//! Output formatting utilities

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Style};
use tabled::{Table, Tabled};

use crate::cli::helpers::{format_number, format_probability, truncate_str};
use crate::cli::OutputFormat;
use crate::core::validation::{MessageType, ValidationReport};
use crate::entities::design_point::{DesignPoint, Message};

/// Determine the effective output format based on context
pub fn effective_format(format: OutputFormat, is_report: bool) -> OutputFormat {
    match format {
        OutputFormat::Auto => {
            if is_report {
                OutputFormat::Table
            } else {
                OutputFormat::Yaml
            }
        }
        other => other,
    }
}

/// Serialize a value as YAML or JSON
pub fn print_data<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).into_diagnostic()?;
            println!("{}", json);
        }
        _ => {
            let yaml = serde_yml::to_string(value).into_diagnostic()?;
            print!("{}", yaml);
        }
    }
    Ok(())
}

#[derive(Tabled)]
struct AlphaRow {
    #[tabled(rename = "Stochast")]
    stochast: String,
    #[tabled(rename = "Alpha")]
    alpha: String,
    #[tabled(rename = "Influence")]
    influence: String,
    #[tabled(rename = "U")]
    u: String,
    #[tabled(rename = "X")]
    x: String,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Step")]
    step: usize,
    #[tabled(rename = "Beta")]
    beta: String,
    #[tabled(rename = "Convergence")]
    convergence: String,
    #[tabled(rename = "Converged")]
    converged: &'static str,
}

/// Alphas of the design point as a table
pub fn alpha_table(design_point: &DesignPoint) -> String {
    let rows: Vec<AlphaRow> = design_point
        .point
        .alphas
        .iter()
        .map(|a| AlphaRow {
            stochast: truncate_str(&a.stochast, 24),
            alpha: format!("{:+.4}", a.alpha),
            influence: format!("{:.1}%", a.influence_factor * 100.0),
            u: format_number(a.u),
            x: format_number(a.x),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .modify(Columns::new(1..), Alignment::right())
        .to_string()
}

/// Reported steps of the run as a table
pub fn history_table(design_point: &DesignPoint) -> String {
    let rows: Vec<HistoryRow> = design_point
        .reliability_results
        .iter()
        .map(|r| HistoryRow {
            step: r.index,
            beta: format_number(r.beta),
            convergence: format_number(r.convergence),
            converged: if r.is_converged { "yes" } else { "no" },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

fn styled_message(message: &Message) -> String {
    let kind = match message.kind {
        MessageType::Error => style("error").red().bold(),
        MessageType::Warning => style("warning").yellow(),
        MessageType::Info => style("info").cyan(),
        MessageType::Debug => style("debug").dim(),
    };
    format!("{}: {}", kind, message.text)
}

/// Human readable report of a finished run
pub fn print_design_point(title: &str, subtitle: &str, design_point: &DesignPoint, history: bool) {
    let report = &design_point.convergence_report;

    println!("{}", style(title).bold());
    println!("{}", style(subtitle).dim());
    println!("{}", style("─".repeat(60)).dim());

    println!(
        "  Reliability index:  {}",
        style(format_number(design_point.beta())).cyan().bold()
    );
    println!(
        "  Failure prob.:      {}",
        format_probability(design_point.probability_of_failure())
    );
    if report.is_converged {
        println!("  Converged:          {}", style("✓ yes").green());
    } else {
        println!("  Converged:          {}", style("✗ no").red());
    }
    println!("  Convergence:        {}", format_number(report.convergence));
    println!("  Samples/iterations: {}", report.total_samples);
    if report.failed_samples > 0 {
        println!("  Failing samples:    {}", report.failed_samples);
    }
    if let Some(relaxation) = report.relaxation_factor {
        println!("  Relaxation factor:  {}", relaxation);
    }
    if let Some(variance) = report.variance_factor {
        println!("  Sampled mass:       {}", format_probability(variance));
    }
    if !design_point.contributing_design_points.is_empty() {
        println!(
            "  Earlier attempts:   {}",
            design_point.contributing_design_points.len()
        );
    }

    if !design_point.point.alphas.is_empty() {
        println!();
        println!("{}", style("Design point").bold());
        println!("{}", alpha_table(design_point));
    }

    if history && !design_point.reliability_results.is_empty() {
        println!();
        println!("{}", style("Convergence history").bold());
        println!("{}", history_table(design_point));
    }

    if !design_point.messages.is_empty() {
        println!();
        for message in &design_point.messages {
            println!("  {}", styled_message(message));
        }
    }
}

/// Findings of a validation pass, one per line
pub fn print_validation_messages(report: &ValidationReport) {
    for message in &report.messages {
        let marker = match message.severity {
            MessageType::Error => style("✗").red(),
            MessageType::Warning => style("!").yellow(),
            _ => style("·").dim(),
        };
        println!("    {} {}", marker, message);
    }
}
