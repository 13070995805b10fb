use super::{Fact, VersionSource};
use crate::model::VersionKind;
use crate::Result;
use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const CURRENT_LINK: &str = "current";
const PREVIOUS_LINK: &str = "previous";

/// Never reported; deploy tooling keeps a template application under this name.
const EXCLUDED_APPLICATION: &str = "sample";

/// Reads `<root>/<application>/current` and `previous` release symlinks.
pub struct ReleaseDirectorySource {
    root: PathBuf,
}

impl ReleaseDirectorySource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl VersionSource for ReleaseDirectorySource {
    fn name(&self) -> &'static str {
        "Release Directories"
    }

    fn facts(&self) -> Result<Vec<Fact>> {
        Ok(scan_release_directory(&self.root))
    }
}

/// Walks `root` for `current` symlinks that resolve.
///
/// The application name is the path between `root` and the link, so nested
/// layouts such as `root/team/api/current` yield `team/api`. Broken links
/// and unreadable entries are skipped. A missing root yields nothing.
pub fn scan_release_directory(root: &Path) -> Vec<Fact> {
    if !root.is_dir() {
        debug!("Release directory {:?} does not exist", root);
        return Vec::new();
    }

    let mut facts = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).into_iter().flatten() {
        if entry.file_name() != CURRENT_LINK || !entry.path_is_symlink() {
            continue;
        }

        let link = entry.path();
        let application = match application_name(root, link) {
            Some(name) if name != EXCLUDED_APPLICATION => name,
            _ => continue,
        };

        let (version, created_at) = match read_release_link(link) {
            Some(found) => found,
            None => {
                debug!("Skipping unresolvable release link {:?}", link);
                continue;
            }
        };
        facts.push(Fact::new(&application, VersionKind::Current, version, created_at));

        let previous = link.with_file_name(PREVIOUS_LINK);
        if let Some((version, created_at)) = read_release_link(&previous) {
            facts.push(Fact::new(application, VersionKind::Previous, version, created_at));
        }
    }

    facts
}

fn application_name(root: &Path, link: &Path) -> Option<String> {
    let relative = link.strip_prefix(root).ok()?.parent()?;
    let name = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Version is the base name of the link target, timestamp the link's own ctime.
///
/// The link itself is stat'ed, not its target. Re-pointing `current` at a
/// release that was unpacked earlier still has to show up as a new deployment.
fn read_release_link(link: &Path) -> Option<(String, DateTime<Utc>)> {
    let metadata = fs::symlink_metadata(link).ok()?;
    if !metadata.file_type().is_symlink() {
        return None;
    }

    // Dangling links do not count.
    fs::canonicalize(link).ok()?;

    let target = fs::read_link(link).ok()?;
    let version = target.file_name()?.to_string_lossy().into_owned();
    let created_at = Utc
        .timestamp_opt(metadata.ctime(), metadata.ctime_nsec() as u32)
        .single()?;

    Some((version, created_at))
}
