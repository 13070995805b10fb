use super::{Application, VersionKind, VersionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The persisted form of one application.
///
/// This is the body of a `versions.application.<hex>.json` file and the
/// element type of [`Snapshot::applications`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationEntry {
    pub application: String,
    #[serde(default, deserialize_with = "skip_nulls")]
    pub version: Vec<VersionRecord>,
}

impl ApplicationEntry {
    pub fn current(&self) -> Option<&VersionRecord> {
        self.first_of(VersionKind::Current)
    }

    pub fn previous(&self) -> Option<&VersionRecord> {
        self.first_of(VersionKind::Previous)
    }

    fn first_of(&self, kind: VersionKind) -> Option<&VersionRecord> {
        self.version.iter().find(|r| r.kind == kind)
    }

    /// Adds every contained record to `application`.
    pub fn replay_into(&self, application: &mut Application) {
        for record in &self.version {
            application.add_record(record.kind, record.version.clone(), record.created_at);
        }
    }
}

/// The complete version report of one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_updated: DateTime<Utc>,
    pub host_name: String,
    pub environment: String,
    pub instance_id: String,
    #[serde(default)]
    pub applications: Vec<ApplicationEntry>,
}

impl Snapshot {
    /// The host name up to the first domain separator.
    pub fn short_host_name(&self) -> &str {
        self.host_name.split('.').next().unwrap_or_default()
    }
}

// Older writers emitted `null` for a missing current version.
fn skip_nulls<'de, D>(deserializer: D) -> Result<Vec<VersionRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Vec<Option<VersionRecord>> = Vec::deserialize(deserializer)?;
    Ok(entries.into_iter().flatten().collect())
}
