use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionKind {
    Current,
    Previous,
}

impl VersionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionKind::Current => "current",
            VersionKind::Previous => "previous",
        }
    }
}

impl std::fmt::Display for VersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable version fact.
///
/// The serialized field names (`type`, `ctime`) are the ones found in
/// persisted metadata files and host snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(rename = "type")]
    pub kind: VersionKind,
    pub version: String,
    #[serde(rename = "ctime")]
    pub created_at: DateTime<Utc>,
}

impl VersionRecord {
    pub fn new(kind: VersionKind, version: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            version: version.into(),
            created_at,
        }
    }
}
