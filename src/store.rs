//! Snapshot exchange through shared object storage.
//!
//! Each host uploads its snapshot under
//! `versions/<environment>/<instance_id>.json`; the diff path downloads all
//! of them. [`ObjectStore`] is the minimal interface this needs, and
//! [`DirectoryStore`] implements it on a shared directory such as a network
//! or bucket mount.

use crate::diff::NameFilter;
use crate::model::Snapshot;
use crate::platform::adjust_group;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Key prefix all host snapshots live under.
pub const SNAPSHOT_PREFIX: &str = "versions/";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("No object store configured")]
    NotConfigured,

    #[error("Access denied for {key}")]
    AccessDenied { key: String },

    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Object store IO error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn from_io(key: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::PermissionDenied => StoreError::AccessDenied {
                key: key.to_string(),
            },
            io::ErrorKind::NotFound => StoreError::NotFound {
                key: key.to_string(),
            },
            _ => StoreError::Io {
                key: key.to_string(),
                source,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

impl RemoteObject {
    /// Environment segment of a `versions/<environment>/<instance>.json` key.
    pub fn environment(&self) -> Option<&str> {
        let mut segments = self.key.strip_prefix(SNAPSHOT_PREFIX)?.split('/');
        let environment = segments.next()?;
        segments.next().map(|_| environment)
    }

    /// Instance id of a `versions/<environment>/<instance>.json` key.
    pub fn instance_id(&self) -> Option<&str> {
        self.key
            .rsplit('/')
            .next()
            .and_then(|name| name.strip_suffix(".json"))
    }
}

pub trait ObjectStore {
    fn upload(&self, local: &Path, key: &str) -> std::result::Result<(), StoreError>;

    fn list(&self, prefix: &str) -> std::result::Result<Vec<RemoteObject>, StoreError>;

    fn download(&self, key: &str, local: &Path) -> std::result::Result<(), StoreError>;
}

/// An object store backed by a directory; keys are relative paths.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns [`StoreError::NotConfigured`] when no directory is set.
    pub fn from_config(config: &crate::Config) -> std::result::Result<Self, StoreError> {
        config
            .store
            .directory
            .as_ref()
            .map(Self::new)
            .ok_or(StoreError::NotConfigured)
    }

    fn object_path(&self, key: &str) -> std::result::Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let valid = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

        if key.is_empty() || !valid {
            return Err(StoreError::Io {
                key: key.to_string(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "invalid object key"),
            });
        }

        Ok(self.root.join(relative))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(segments.join("/"))
    }
}

impl ObjectStore for DirectoryStore {
    fn upload(&self, local: &Path, key: &str) -> std::result::Result<(), StoreError> {
        let destination = self.object_path(key)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::from_io(key, e))?;
        }

        fs::copy(local, &destination).map_err(|e| StoreError::from_io(key, e))?;
        info!("Uploaded {:?} to {}", local, key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> std::result::Result<Vec<RemoteObject>, StoreError> {
        if !self.root.is_dir() {
            return Err(StoreError::Io {
                key: prefix.to_string(),
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("store directory {:?} does not exist", self.root),
                ),
            });
        }

        // Only the directory the prefix names is walked, so unreadable
        // siblings such as `lost+found` do not affect the listing.
        let base = match prefix.rfind('/') {
            Some(end) if end > 0 => self.object_path(&prefix[..end])?,
            _ => self.root.clone(),
        };
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();

        let walker = WalkDir::new(&base)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| match self.key_for(entry.path()) {
                Some(key) if entry.file_type().is_dir() => {
                    let dir = format!("{}/", key);
                    dir.starts_with(prefix) || prefix.starts_with(&dir)
                }
                Some(_) => true,
                None => false,
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
                StoreError::from_io(prefix, source)
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let key = match self.key_for(entry.path()) {
                Some(key) if key.starts_with(prefix) => key,
                _ => continue,
            };

            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);

            match modified {
                Some(last_modified) => objects.push(RemoteObject { key, last_modified }),
                None => debug!("Skipping {} without modification time", key),
            }
        }

        Ok(objects)
    }

    fn download(&self, key: &str, local: &Path) -> std::result::Result<(), StoreError> {
        let source = self.object_path(key)?;
        fs::copy(&source, local).map_err(|e| StoreError::from_io(key, e))?;
        Ok(())
    }
}

/// Key a host's snapshot is uploaded under.
pub fn snapshot_key(environment: &str, instance_id: &str) -> String {
    format!("{}{}/{}.json", SNAPSHOT_PREFIX, environment, instance_id)
}

/// Lists snapshot objects whose key matches every name filter and whose
/// RFC 3339 last-modified time matches `last_modified`, oldest first.
pub fn list_snapshots(
    store: &dyn ObjectStore,
    filter: &NameFilter,
    last_modified: Option<&Regex>,
) -> Result<Vec<RemoteObject>> {
    let mut objects: Vec<_> = store
        .list(SNAPSHOT_PREFIX)?
        .into_iter()
        .filter(|object| !object.key.ends_with('/'))
        .filter(|object| filter.matches(&object.key))
        .filter(|object| {
            last_modified
                .map(|pattern| pattern.is_match(&object.last_modified.to_rfc3339()))
                .unwrap_or(true)
        })
        .collect();

    objects.sort_by(|a, b| a.last_modified.cmp(&b.last_modified));
    Ok(objects)
}

/// Downloads and parses every host snapshot, newest first.
///
/// Files land in `tmp_directory` named after their key with `/` replaced
/// by `.`. A snapshot that does not parse is an error.
pub fn fetch_snapshots(
    store: &dyn ObjectStore,
    tmp_directory: &Path,
    group: Option<&str>,
) -> Result<Vec<Snapshot>> {
    let mut objects: Vec<_> = store
        .list(SNAPSHOT_PREFIX)?
        .into_iter()
        .filter(|object| !object.key.ends_with('/'))
        .collect();
    objects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));

    fs::create_dir_all(tmp_directory)?;

    let mut snapshots = Vec::with_capacity(objects.len());
    for object in objects {
        let path = tmp_directory.join(object.key.replace('/', "."));
        store.download(&object.key, &path)?;
        adjust_group(&path, group);

        let content = fs::read_to_string(&path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .map_err(|source| Error::CorruptMetadata { path, source })?;
        snapshots.push(snapshot);
    }

    debug!("Fetched {} snapshots", snapshots.len());
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    fn write_object(root: &Path, key: &str, body: &str, age_secs: u64) {
        let path = root.join(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        let modified = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    fn snapshot_body(host: &str, app: &str, version: &str) -> String {
        format!(
            r#"{{"last_updated": "2019-03-01T10:00:00Z", "host_name": "{}", "environment": "staging",
                "instance_id": "x", "applications": [{{"application": "{}", "version": [
                {{"type": "current", "version": "{}", "ctime": "2019-03-01T09:00:00Z"}}]}}]}}"#,
            host, app, version
        )
    }

    #[test]
    fn test_snapshot_key() {
        assert_eq!(snapshot_key("production", "abc"), "versions/production/abc.json");
    }

    #[test]
    fn test_remote_object_key_parts() {
        let object = RemoteObject {
            key: "versions/production/abc.json".to_string(),
            last_modified: Utc::now(),
        };
        assert_eq!(object.environment(), Some("production"));
        assert_eq!(object.instance_id(), Some("abc"));
    }

    #[test]
    fn test_upload_list_download() {
        let root = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(root.path());

        let local = work.path().join("local.json");
        fs::write(&local, "{}").unwrap();
        store.upload(&local, "versions/staging/host.json").unwrap();

        let objects = store.list(SNAPSHOT_PREFIX).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "versions/staging/host.json");

        let copy = work.path().join("copy.json");
        store.download("versions/staging/host.json", &copy).unwrap();
        assert_eq!(fs::read_to_string(copy).unwrap(), "{}");
    }

    #[test]
    fn test_list_filters_by_prefix() {
        let root = tempfile::tempdir().unwrap();
        write_object(root.path(), "versions/staging/a.json", "{}", 0);
        write_object(root.path(), "artifacts/app.tar", "", 0);

        let store = DirectoryStore::new(root.path());
        let keys: Vec<_> = store.list(SNAPSHOT_PREFIX).unwrap().into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["versions/staging/a.json"]);
    }

    #[test]
    fn test_list_ignores_unreadable_sibling_directory() {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::geteuid().is_root() {
            return;
        }

        let root = tempfile::tempdir().unwrap();
        write_object(root.path(), "versions/staging/a.json", "{}", 0);
        let lost = root.path().join("lost+found");
        fs::create_dir(&lost).unwrap();
        fs::write(lost.join("orphan"), "").unwrap();
        fs::set_permissions(&lost, fs::Permissions::from_mode(0o000)).unwrap();

        let store = DirectoryStore::new(root.path());
        let listed = store.list(SNAPSHOT_PREFIX);
        let partial = store.list("ver");

        fs::set_permissions(&lost, fs::Permissions::from_mode(0o700)).unwrap();

        assert_eq!(listed.unwrap().len(), 1);
        assert_eq!(partial.unwrap().len(), 1);
    }

    #[test]
    fn test_list_missing_prefix_is_empty() {
        let root = tempfile::tempdir().unwrap();
        write_object(root.path(), "artifacts/app.tar", "", 0);

        let store = DirectoryStore::new(root.path());
        assert!(store.list(SNAPSHOT_PREFIX).unwrap().is_empty());
    }

    #[test]
    fn test_list_unreadable_prefix_is_access_denied() {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::geteuid().is_root() {
            return;
        }

        let root = tempfile::tempdir().unwrap();
        write_object(root.path(), "versions/staging/a.json", "{}", 0);
        let staging = root.path().join("versions/staging");
        fs::set_permissions(&staging, fs::Permissions::from_mode(0o000)).unwrap();

        let result = DirectoryStore::new(root.path()).list(SNAPSHOT_PREFIX);

        fs::set_permissions(&staging, fs::Permissions::from_mode(0o700)).unwrap();
        assert!(matches!(result, Err(StoreError::AccessDenied { .. })));
    }

    #[test]
    fn test_download_missing_object() {
        let root = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(root.path());

        let result = store.download("versions/nope.json", &root.path().join("out"));
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_keys_cannot_escape_root() {
        let root = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(root.path().join("store"));

        let result = store.download("../secret", &root.path().join("out"));
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[test]
    fn test_unconfigured_store() {
        let config = crate::Config::default();
        assert!(matches!(
            DirectoryStore::from_config(&config),
            Err(StoreError::NotConfigured)
        ));
    }

    #[test]
    fn test_fetch_snapshots_newest_first() {
        let root = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        write_object(root.path(), "versions/staging/old.json", &snapshot_body("old.example.com", "api", "1.0"), 3600);
        write_object(root.path(), "versions/production/new.json", &snapshot_body("new", "api", "2.0"), 0);

        let store = DirectoryStore::new(root.path());
        let snapshots = fetch_snapshots(&store, tmp.path(), None).unwrap();

        let hosts: Vec<_> = snapshots.iter().map(|s| s.short_host_name()).collect();
        assert_eq!(hosts, vec!["new", "old"]);
        assert!(tmp.path().join("versions.staging.old.json").exists());
    }

    #[test]
    fn test_fetch_snapshots_rejects_corrupt_document() {
        let root = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        write_object(root.path(), "versions/staging/bad.json", "{", 0);

        let store = DirectoryStore::new(root.path());
        let result = fetch_snapshots(&store, tmp.path(), None);
        assert!(matches!(result, Err(Error::CorruptMetadata { .. })));
    }

    #[test]
    fn test_list_snapshots_filters_and_sorts_oldest_first() {
        let root = tempfile::tempdir().unwrap();
        write_object(root.path(), "versions/production/p1.json", "{}", 0);
        write_object(root.path(), "versions/staging/s1.json", "{}", 7200);
        write_object(root.path(), "versions/staging/s2.json", "{}", 3600);

        let store = DirectoryStore::new(root.path());

        let filter = NameFilter::new(["staging"]).unwrap();
        let keys: Vec<_> = list_snapshots(&store, &filter, None)
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["versions/staging/s1.json", "versions/staging/s2.json"]);

        let never = Regex::new("^1970-").unwrap();
        assert!(list_snapshots(&store, &NameFilter::default(), Some(&never))
            .unwrap()
            .is_empty());
    }
}
