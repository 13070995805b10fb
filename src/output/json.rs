use crate::diff::DiffReport;
use crate::model::{Application, ApplicationEntry};
use crate::store::RemoteObject;
use crate::Result;

pub fn applications_json(applications: &[&Application]) -> Result<String> {
    let entries: Vec<ApplicationEntry> = applications
        .iter()
        .map(|app| app.to_snapshot_entry())
        .collect();
    Ok(serde_json::to_string(&entries)?)
}

pub fn remote_json(objects: &[RemoteObject]) -> Result<String> {
    Ok(serde_json::to_string(objects)?)
}

pub fn diff_json(report: &DiffReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}
