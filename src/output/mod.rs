mod cli;
mod json;

pub use cli::{render_applications_table, render_diff_table, render_remote_table};
pub use json::{applications_json, diff_json, remote_json};

use crate::diff::DiffReport;
use crate::model::Application;
use crate::store::RemoteObject;
use crate::Result;

/// Output format for listings and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format for programmatic use
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "plain" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'table' or 'json'", s)),
        }
    }
}

// Each report is rendered completely before anything reaches stdout.

pub fn print_applications(applications: &[&Application], format: OutputFormat) -> Result<()> {
    let out = match format {
        OutputFormat::Table => render_applications_table(applications),
        OutputFormat::Json => applications_json(applications)?,
    };
    println!("{}", out);
    Ok(())
}

pub fn print_remote(objects: &[RemoteObject], format: OutputFormat) -> Result<()> {
    let out = match format {
        OutputFormat::Table => render_remote_table(objects),
        OutputFormat::Json => remote_json(objects)?,
    };
    println!("{}", out);
    Ok(())
}

pub fn print_diff(report: &DiffReport, format: OutputFormat) -> Result<()> {
    let out = match format {
        OutputFormat::Table => render_diff_table(report),
        OutputFormat::Json => diff_json(report)?,
    };
    println!("{}", out);
    Ok(())
}
