use crate::diff::{DiffReport, DiffRow};
use crate::model::Application;
use crate::store::RemoteObject;
use tabled::{settings::Style, Table, Tabled};

const PRODUCTION: &str = "production";

#[derive(Tabled)]
struct ApplicationRow {
    #[tabled(rename = "Application")]
    application: String,
    #[tabled(rename = "Version")]
    version: String,
}

#[derive(Tabled)]
struct RemoteRow {
    #[tabled(rename = "Environment")]
    environment: String,
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "LastModified")]
    last_modified: String,
}

#[derive(Tabled)]
struct DiffTableRow {
    #[tabled(rename = "Application")]
    application: String,
    #[tabled(rename = "Hostname")]
    hostname: String,
    #[tabled(rename = "Environment")]
    environment: String,
    #[tabled(rename = "CurrentVersion")]
    current: String,
    #[tabled(rename = "PreviousVersion")]
    previous: String,
}

pub fn render_applications_table(applications: &[&Application]) -> String {
    if applications.is_empty() {
        return "No applications found.".to_string();
    }

    let rows: Vec<ApplicationRow> = applications
        .iter()
        .map(|app| ApplicationRow {
            application: app.name().to_string(),
            version: app.display_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_remote_table(objects: &[RemoteObject]) -> String {
    if objects.is_empty() {
        return "No remote snapshots found.".to_string();
    }

    let rows: Vec<RemoteRow> = objects
        .iter()
        .map(|object| RemoteRow {
            environment: object.environment().unwrap_or("-").to_string(),
            instance: object.instance_id().unwrap_or("-").to_string(),
            key: object.key.clone(),
            last_modified: object.last_modified.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_diff_table(report: &DiffReport) -> String {
    if report.is_empty() {
        return "No applications found.".to_string();
    }

    let rows: Vec<DiffTableRow> = report
        .rows()
        .map(|(application, row)| DiffTableRow {
            application: application.to_string(),
            hostname: row.hostname.clone(),
            environment: format_environment(&row.environment),
            current: format_current(row),
            previous: row.previous.clone().unwrap_or_default(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

fn format_environment(environment: &str) -> String {
    if environment == PRODUCTION {
        format!("\x1b[1m{}\x1b[0m", environment)
    } else {
        environment.to_string()
    }
}

fn format_current(row: &DiffRow) -> String {
    match (&row.current, row.color) {
        (Some(version), Some(color)) => color.paint(version),
        (Some(version), None) => version.clone(),
        (None, _) => String::new(),
    }
}
