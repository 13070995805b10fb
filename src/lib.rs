pub mod config;
pub mod diff;
pub mod error;
pub mod model;
pub mod output;
pub mod platform;
pub mod registry;
pub mod source;
pub mod store;

pub use config::Config;
pub use diff::{DiffEngine, DiffReport, NameFilter};
pub use error::{Error, Result};
pub use model::{Application, ApplicationEntry, Snapshot, VersionKind, VersionRecord};
pub use registry::Registry;
pub use source::{Fact, VersionSource};
pub use store::{DirectoryStore, ObjectStore, StoreError};
