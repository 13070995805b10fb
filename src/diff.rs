//! Cross-host version comparison.
//!
//! [`DiffEngine`] merges the snapshots of many hosts into one table grouped
//! by application, and gives every distinct version of an application its
//! own display [`Color`].
//!
//! Colors are handed out in the order versions are first seen in an
//! application's rows. That order follows the order of the input
//! snapshots, so the same version may get a different color on another run
//! when snapshots arrive in a different order.

use crate::model::Snapshot;
use crate::Result;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

const SNAPSHOT_MARKER: &str = "-SNAPSHOT";

/// Application name filter; a name passes only if every pattern matches.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    patterns: Vec<Regex>,
}

impl NameFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().all(|pattern| pattern.is_match(name))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Display colors for versions, in assignment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Green,
    Yellow,
    Red,
    Blue,
    LightMagenta,
    LightGreen,
    LightYellow,
    LightRed,
    LightBlue,
}

impl Color {
    pub const PALETTE: [Color; 9] = [
        Color::Green,
        Color::Yellow,
        Color::Red,
        Color::Blue,
        Color::LightMagenta,
        Color::LightGreen,
        Color::LightYellow,
        Color::LightRed,
        Color::LightBlue,
    ];

    fn ansi_code(&self) -> &'static str {
        match self {
            Color::Green => "32",
            Color::Yellow => "33",
            Color::Red => "31",
            Color::Blue => "34",
            Color::LightMagenta => "95",
            Color::LightGreen => "92",
            Color::LightYellow => "93",
            Color::LightRed => "91",
            Color::LightBlue => "94",
        }
    }

    pub fn paint(&self, text: &str) -> String {
        format!("\x1b[{}m{}\x1b[0m", self.ansi_code(), text)
    }
}

/// Strips a trailing `-SNAPSHOT` marker.
pub fn normalize_version(version: &str) -> &str {
    version.strip_suffix(SNAPSHOT_MARKER).unwrap_or(version)
}

/// One host's view of one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffRow {
    pub hostname: String,
    pub environment: String,
    pub current: Option<String>,
    pub previous: Option<String>,
    /// Color of the current version; `None` without a current version or
    /// once an application has more distinct versions than the palette.
    #[serde(skip)]
    pub color: Option<Color>,
}

/// Rows grouped by application, applications in lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DiffReport {
    pub applications: BTreeMap<String, Vec<DiffRow>>,
}

impl DiffReport {
    /// Every row paired with its application, in output order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &DiffRow)> {
        self.applications
            .iter()
            .flat_map(|(name, rows)| rows.iter().map(move |row| (name.as_str(), row)))
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

/// First-seen color allocation for the versions of one application.
#[derive(Debug, Default)]
struct ColorAssigner {
    seen: Vec<String>,
}

impl ColorAssigner {
    fn assign(&mut self, version: &str) -> Option<Color> {
        let normalized = normalize_version(version);
        let slot = match self.seen.iter().position(|v| v == normalized) {
            Some(slot) => slot,
            None => {
                self.seen.push(normalized.to_string());
                self.seen.len() - 1
            }
        };
        Color::PALETTE.get(slot).copied()
    }
}

pub struct DiffEngine {
    filter: NameFilter,
}

impl DiffEngine {
    pub fn new(filter: NameFilter) -> Self {
        Self { filter }
    }

    pub fn diff(&self, snapshots: &[Snapshot]) -> DiffReport {
        let mut applications: BTreeMap<String, Vec<DiffRow>> = BTreeMap::new();

        for snapshot in snapshots {
            let hostname = snapshot.short_host_name();

            for entry in &snapshot.applications {
                if !self.filter.matches(&entry.application) {
                    continue;
                }

                applications
                    .entry(entry.application.clone())
                    .or_default()
                    .push(DiffRow {
                        hostname: hostname.to_string(),
                        environment: snapshot.environment.clone(),
                        current: entry.current().map(|r| r.version.clone()),
                        previous: entry.previous().map(|r| r.version.clone()),
                        color: None,
                    });
            }
        }

        for rows in applications.values_mut() {
            let mut colors = ColorAssigner::default();
            for row in rows.iter_mut() {
                row.color = row.current.as_deref().and_then(|v| colors.assign(v));
            }
        }

        DiffReport { applications }
    }
}
