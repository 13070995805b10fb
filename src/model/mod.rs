//! Core data types for version facts, applications, and host snapshots.
//!
//! - [`VersionKind`] - Whether a fact describes the live or the replaced version
//! - [`VersionRecord`] - A single (kind, version, timestamp) fact
//! - [`Application`] - All facts known about one application
//! - [`Snapshot`] - The per-host document exchanged between hosts
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use versions::{Application, VersionKind};
//!
//! let mut app = Application::new("orders");
//! app.add_record(VersionKind::Previous, "1.0.0", Utc.timestamp_opt(100, 0).unwrap());
//! app.add_record(VersionKind::Current, "1.1.0", Utc.timestamp_opt(200, 0).unwrap());
//!
//! assert_eq!(app.display_string(), "1.1.0 (1.0.0)");
//! ```

mod application;
mod record;
mod snapshot;

pub use application::*;
pub use record::*;
pub use snapshot::*;
