//! The per-host version registry.
//!
//! A [`Registry`] owns every [`Application`] known on this host. It is
//! filled from persisted per-application files and from the registered
//! [`VersionSource`]s, records deployments through [`Registry::update`], and
//! produces the [`Snapshot`] that is shared with other hosts.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use versions::{Registry, VersionKind};
//!
//! let mut registry = Registry::new("staging", "host-01", "/var/tmp");
//! registry.update("orders", "1.4.0", Utc::now(), VersionKind::Current)?;
//!
//! let snapshot = registry.snapshot()?;
//! println!("{}", serde_json::to_string_pretty(&snapshot)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::config::Config;
use crate::model::{Application, ApplicationEntry, Snapshot, VersionKind};
use crate::platform::{adjust_group, host_name};
use crate::source::{configured_sources, VersionSource};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APPLICATION_FILE_PREFIX: &str = "versions.application.";
const APPLICATION_FILE_SUFFIX: &str = ".json";

pub struct Registry {
    environment_name: String,
    instance_id: String,
    storage_directory: PathBuf,
    group_ownership: Option<String>,
    applications: BTreeMap<String, Application>,
    sources: Vec<Box<dyn VersionSource>>,
    collected: bool,
}

impl Registry {
    /// Creates an empty registry with no sources.
    pub fn new(
        environment_name: impl Into<String>,
        instance_id: impl Into<String>,
        storage_directory: impl AsRef<Path>,
    ) -> Self {
        Self {
            environment_name: environment_name.into(),
            instance_id: instance_id.into(),
            storage_directory: storage_directory.as_ref().to_path_buf(),
            group_ownership: None,
            applications: BTreeMap::new(),
            sources: Vec::new(),
            collected: false,
        }
    }

    /// Creates a registry with every source enabled in `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new(
            &config.environment_name,
            &config.instance_id,
            &config.version_directory,
        )
        .with_group_ownership(config.group().map(str::to_string));

        for source in configured_sources(config) {
            registry.register_source(source);
        }

        registry
    }

    pub fn with_group_ownership(mut self, group: Option<String>) -> Self {
        self.group_ownership = group;
        self
    }

    /// Adds a source; sources run in registration order.
    pub fn register_source(&mut self, source: Box<dyn VersionSource>) {
        self.sources.push(source);
    }

    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn storage_directory(&self) -> &Path {
        &self.storage_directory
    }

    /// Looks up an application, creating an empty one if it is unknown.
    pub fn application(&mut self, name: &str) -> &mut Application {
        self.applications
            .entry(name.to_string())
            .or_insert_with(|| Application::new(name))
    }

    /// Applications known so far, without triggering collection.
    pub fn applications(&self) -> &BTreeMap<String, Application> {
        &self.applications
    }

    /// File name holding one application's persisted entry.
    pub fn application_file_name(application: &str) -> String {
        format!(
            "{}{}{}",
            APPLICATION_FILE_PREFIX,
            hex::encode(application),
            APPLICATION_FILE_SUFFIX
        )
    }

    /// Replays every per-application file in the storage directory.
    ///
    /// A missing directory holds no applications. A file that cannot be
    /// read or parsed fails the whole load.
    pub fn load_local(&mut self) -> Result<()> {
        let entries = match fs::read_dir(&self.storage_directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_application_file(path))
            .collect();
        paths.sort();

        for path in paths {
            let content = fs::read_to_string(&path)?;
            let entry: ApplicationEntry = serde_json::from_str(&content)
                .map_err(|source| Error::CorruptMetadata {
                    path: path.clone(),
                    source,
                })?;

            debug!("Loaded {:?} for {}", path, entry.application);
            entry.replay_into(self.application(&entry.application));
        }

        Ok(())
    }

    /// Loads local metadata and runs every source, once per registry.
    pub fn collect(&mut self) -> Result<&BTreeMap<String, Application>> {
        if !self.collected {
            self.load_local()?;

            let sources = std::mem::take(&mut self.sources);
            for source in &sources {
                source.discover(self);
            }
            self.sources = sources;

            self.collected = true;
        }

        Ok(&self.applications)
    }

    /// Records a deployment and persists the application's file.
    ///
    /// With [`VersionKind::Current`] the existing current version is first
    /// re-recorded as previous, stamped with `created_at`, so it outranks
    /// any older previous fact. `created_at` is expected to be no older
    /// than the facts already known for the application.
    pub fn update(
        &mut self,
        application: &str,
        version: &str,
        created_at: DateTime<Utc>,
        kind: VersionKind,
    ) -> Result<PathBuf> {
        self.collect()?;

        let app = self.application(application);
        match kind {
            VersionKind::Previous => app.add_record(VersionKind::Previous, version, created_at),
            VersionKind::Current => {
                if let Some(current) = app.current().map(|r| r.version.clone()) {
                    app.add_record(VersionKind::Previous, current, created_at);
                }
                app.add_record(VersionKind::Current, version, created_at);
            }
        }
        let entry = app.to_snapshot_entry();

        fs::create_dir_all(&self.storage_directory)?;
        let path = self
            .storage_directory
            .join(Self::application_file_name(application));
        fs::write(&path, serde_json::to_string(&entry)?)?;
        adjust_group(&path, self.group_ownership.as_deref());

        info!("Recorded {} {} as {}", application, version, kind);
        Ok(path)
    }

    /// The full host document, stamped with the current time.
    pub fn snapshot(&mut self) -> Result<Snapshot> {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&mut self, last_updated: DateTime<Utc>) -> Result<Snapshot> {
        let applications = self
            .collect()?
            .values()
            .map(Application::to_snapshot_entry)
            .collect();

        Ok(Snapshot {
            last_updated,
            host_name: host_name(),
            environment: self.environment_name.clone(),
            instance_id: self.instance_id.clone(),
            applications,
        })
    }

    /// Writes the snapshot to `<directory>/versions.<environment>.<instance>.json`.
    pub fn write_metadata_file(&mut self, directory: &Path) -> Result<PathBuf> {
        let snapshot = self.snapshot()?;

        fs::create_dir_all(directory)?;
        let path = directory.join(format!(
            "versions.{}.{}.json",
            self.environment_name, self.instance_id
        ));
        fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
        adjust_group(&path, self.group_ownership.as_deref());

        debug!("Generated metadata file {:?}", path);
        Ok(path)
    }
}

fn is_application_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| {
            name.starts_with(APPLICATION_FILE_PREFIX) && name.ends_with(APPLICATION_FILE_SUFFIX)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Fact;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn registry(dir: &Path) -> Registry {
        Registry::new("staging", "host-01", dir)
    }

    struct FixedSource(Vec<Fact>);

    impl VersionSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn facts(&self) -> Result<Vec<Fact>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_application_file_name_is_hex_of_name() {
        assert_eq!(
            Registry::application_file_name("api"),
            "versions.application.617069.json"
        );
    }

    #[test]
    fn test_lookup_creates_empty_application() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry(dir.path());

        assert!(registry.application("orders").current().is_none());
        assert!(registry.applications().contains_key("orders"));
    }

    #[test]
    fn test_update_promotes_current_to_previous() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry(dir.path());

        registry.update("orders", "v1", at(10), VersionKind::Current).unwrap();
        registry.update("orders", "v2", at(20), VersionKind::Current).unwrap();

        let app = registry.application("orders");
        assert_eq!(app.current().unwrap().version, "v2");
        assert_eq!(app.previous().unwrap().version, "v1");
    }

    #[test]
    fn test_first_update_has_no_previous() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry(dir.path());

        registry.update("orders", "v1", at(10), VersionKind::Current).unwrap();

        let app = registry.application("orders");
        assert_eq!(app.current().unwrap().version, "v1");
        assert!(app.previous().is_none());
    }

    #[test]
    fn test_promoted_record_outranks_older_previous() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry(dir.path());
        registry.register_source(Box::new(FixedSource(vec![
            Fact::new("orders", VersionKind::Previous, "v0", at(5)),
            Fact::new("orders", VersionKind::Current, "v1", at(10)),
        ])));

        registry.update("orders", "v2", at(20), VersionKind::Current).unwrap();

        let app = registry.application("orders");
        assert_eq!(app.current().unwrap().version, "v2");
        assert_eq!(app.previous().unwrap().version, "v1");
    }

    #[test]
    fn test_update_previous_on_empty_application() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry(dir.path());

        registry.update("orders", "v1", at(10), VersionKind::Previous).unwrap();

        let app = registry.application("orders");
        assert!(app.current().is_none());
        assert_eq!(app.previous().unwrap().version, "v1");
    }

    #[test]
    fn test_update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut registry = registry(dir.path());
            registry.update("orders", "v1", at(10), VersionKind::Current).unwrap();
            let path = registry.update("orders", "v2", at(20), VersionKind::Current).unwrap();
            assert_eq!(path, dir.path().join("versions.application.6f7264657273.json"));
        }

        let mut reloaded = registry(dir.path());
        let applications = reloaded.collect().unwrap();
        let app = &applications["orders"];
        assert_eq!(app.current().unwrap().version, "v2");
        assert_eq!(app.previous().unwrap().version, "v1");
    }

    #[test]
    fn test_update_after_reload_promotes_persisted_current() {
        let dir = tempfile::tempdir().unwrap();
        registry(dir.path())
            .update("orders", "v1", at(10), VersionKind::Current)
            .unwrap();

        let mut second = registry(dir.path());
        second.update("orders", "v2", at(20), VersionKind::Current).unwrap();

        let app = second.application("orders");
        assert_eq!(app.current().unwrap().version, "v2");
        assert_eq!(app.previous().unwrap().version, "v1");
    }

    #[test]
    fn test_load_local_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry(&dir.path().join("missing"));

        assert!(registry.collect().unwrap().is_empty());
    }

    #[test]
    fn test_load_local_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "not json").unwrap();
        fs::write(dir.path().join("versions.staging.host.json"), "not json").unwrap();

        let mut registry = registry(dir.path());
        assert!(registry.collect().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_metadata_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Registry::application_file_name("orders"));
        fs::write(&path, "{\"application\": \"orders\", \"version\": [").unwrap();

        let mut registry = registry(dir.path());
        match registry.load_local() {
            Err(Error::CorruptMetadata { path: bad, .. }) => assert_eq!(bad, path),
            other => panic!("expected corrupt metadata error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_collect_runs_sources_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry(dir.path());
        registry.register_source(Box::new(FixedSource(vec![Fact::new(
            "orders",
            VersionKind::Current,
            "v1",
            at(10),
        )])));

        registry.collect().unwrap();
        registry.collect().unwrap();

        assert_eq!(registry.application("orders").records().len(), 1);
    }

    #[test]
    fn test_snapshot_contains_all_applications() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry(dir.path());
        registry.register_source(Box::new(FixedSource(vec![
            Fact::new("orders", VersionKind::Current, "v2", at(20)),
            Fact::new("orders", VersionKind::Previous, "v1", at(10)),
            Fact::new("billing", VersionKind::Current, "1.3.0", at(30)),
        ])));

        let snapshot = registry.snapshot_at(at(100)).unwrap();
        assert_eq!(snapshot.environment, "staging");
        assert_eq!(snapshot.instance_id, "host-01");
        assert_eq!(snapshot.last_updated, at(100));

        let names: Vec<_> = snapshot.applications.iter().map(|a| a.application.as_str()).collect();
        assert_eq!(names, vec!["billing", "orders"]);
        assert_eq!(snapshot.applications[1].version.len(), 2);
    }

    #[test]
    fn test_write_metadata_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut registry = registry(dir.path());
        registry.update("orders", "v1", at(10), VersionKind::Current).unwrap();

        let path = registry.write_metadata_file(out.path()).unwrap();
        assert_eq!(path, out.path().join("versions.staging.host-01.json"));

        let snapshot: Snapshot = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(snapshot.applications[0].current().unwrap().version, "v1");
    }
}
