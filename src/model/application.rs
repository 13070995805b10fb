use super::{ApplicationEntry, VersionKind, VersionRecord};
use chrono::{DateTime, Utc};

/// The version history of one named application.
///
/// Records are only ever appended. Several records of the same kind may
/// coexist (one per source that reported it); [`current`](Self::current) and
/// [`previous`](Self::previous) pick the most recent fact of their kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    name: String,
    records: Vec<VersionRecord>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn records(&self) -> &[VersionRecord] {
        &self.records
    }

    pub fn add_record(
        &mut self,
        kind: VersionKind,
        version: impl Into<String>,
        created_at: DateTime<Utc>,
    ) {
        self.records
            .push(VersionRecord::new(kind, version, created_at));
    }

    /// The current fact with the latest timestamp. On equal timestamps the
    /// record added last wins.
    pub fn current(&self) -> Option<&VersionRecord> {
        self.latest(VersionKind::Current)
    }

    /// The previous fact with the latest timestamp.
    pub fn previous(&self) -> Option<&VersionRecord> {
        self.latest(VersionKind::Previous)
    }

    fn latest(&self, kind: VersionKind) -> Option<&VersionRecord> {
        self.records
            .iter()
            .filter(|r| r.kind == kind)
            .max_by_key(|r| r.created_at)
    }

    /// Human-readable form: `current (previous)`.
    pub fn display_string(&self) -> String {
        let current = self.current().map(|r| r.version.as_str()).unwrap_or("");
        match self.previous() {
            Some(previous) if current.is_empty() => format!("({})", previous.version),
            Some(previous) => format!("{} ({})", current, previous.version),
            None => current.to_string(),
        }
    }

    /// Builds the persisted form: at most one current and one previous
    /// entry, current first.
    pub fn to_snapshot_entry(&self) -> ApplicationEntry {
        let version = self
            .current()
            .into_iter()
            .chain(self.previous())
            .cloned()
            .collect();

        ApplicationEntry {
            application: self.name.clone(),
            version,
        }
    }
}
