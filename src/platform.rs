//! Host identity and file ownership helpers.
//!
//! Everything here talks to the operating system directly and is
//! best-effort: failures fall back to a sensible value or are logged.

use nix::unistd::{gethostname, Group};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;

/// Group write bit (`g+w`).
const GROUP_WRITE: u32 = 0o020;

/// Returns the host name as reported by the OS, or `localhost` if it
/// cannot be determined.
pub fn host_name() -> String {
    match gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            debug!("Failed to read host name: {}", e);
            "localhost".to_string()
        }
    }
}

/// Default instance id: the hex encoding of the host name.
pub fn default_instance_id() -> String {
    hex::encode(host_name())
}

/// Hands `path` to `group` and makes it group writable.
///
/// Does nothing when no group is given. Any failure (unknown group, not
/// permitted) is logged at debug level and otherwise ignored.
pub fn adjust_group(path: &Path, group: Option<&str>) {
    let Some(group) = group else {
        return;
    };

    if let Err(e) = try_adjust_group(path, group) {
        debug!("Could not hand {:?} to group {}: {}", path, group, e);
    }
}

fn try_adjust_group(path: &Path, group: &str) -> io::Result<()> {
    let gid = resolve_gid(group)?;
    std::os::unix::fs::chown(path, None, Some(gid))?;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | GROUP_WRITE);
    fs::set_permissions(path, permissions)
}

fn resolve_gid(group: &str) -> io::Result<u32> {
    if let Ok(gid) = group.parse::<u32>() {
        return Ok(gid);
    }

    match Group::from_name(group) {
        Ok(Some(group)) => Ok(group.gid.as_raw()),
        Ok(None) => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("unknown group {}", group),
        )),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;

    #[test]
    fn test_default_instance_id_is_hex_of_host_name() {
        let id = default_instance_id();
        assert_eq!(hex::decode(&id).unwrap(), host_name().into_bytes());
    }

    #[test]
    fn test_adjust_group_to_own_group_adds_group_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        let gid = fs::metadata(&path).unwrap().gid();
        adjust_group(&path, Some(&gid.to_string()));

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o620);
    }

    #[test]
    fn test_adjust_group_unknown_group_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        adjust_group(&path, Some("no-such-group-for-versions-tests"));

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }
}
