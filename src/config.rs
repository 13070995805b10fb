//! Configuration file handling.
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/versions/config.toml`
//! - macOS: `~/Library/Application Support/versions/config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! environment_name = "production"
//! version_directory = "/var/tmp"
//! tmp_directory = "/tmp"
//! group_ownership = "app"
//! default_format = "table"
//!
//! [release_directory]
//! enabled = true
//! root = "/data/app/data"
//!
//! [docker]
//! enabled = true
//! repository = "registry.example.com/apps"
//!
//! [store]
//! directory = "/mnt/application-artifacts"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::platform::default_instance_id;
use crate::Result;

/// Application configuration.
///
/// # Example
///
/// ```no_run
/// use versions::Config;
///
/// let config = Config::load().unwrap();
/// println!("Environment: {}", config.environment_name);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment this host belongs to, e.g. `staging` or `production`.
    ///
    /// Also selects which container image tags count as deployed.
    pub environment_name: String,

    /// Identifies this host's snapshot in the object store.
    ///
    /// Default: hex encoding of the host name
    pub instance_id: String,

    /// Where per-application metadata files are kept.
    pub version_directory: PathBuf,

    /// Where generated snapshots and downloaded remote snapshots are written.
    pub tmp_directory: PathBuf,

    /// Group that should own written files. Set to an empty string to disable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_ownership: Option<String>,

    /// Output format when `--format` is not given ("table" or "json").
    pub default_format: String,

    pub release_directory: ReleaseDirectoryConfig,

    pub docker: DockerConfig,

    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseDirectoryConfig {
    pub enabled: bool,
    /// Parent of all `<application>/current` release links.
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub enabled: bool,
    /// Restricts `docker images` to one repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

/// Shared location snapshots are exchanged through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root of the mounted object store. Remote actions are unavailable
    /// while this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment_name: "staging".to_string(),
            instance_id: default_instance_id(),
            version_directory: PathBuf::from("/var/tmp"),
            tmp_directory: PathBuf::from("/tmp"),
            group_ownership: Some("app".to_string()),
            default_format: "table".to_string(),
            release_directory: ReleaseDirectoryConfig::default(),
            docker: DockerConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for ReleaseDirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("/data/app/data"),
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repository: None,
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves the configuration to the config file, creating its directory.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("versions")
            .join("config.toml")
    }

    pub fn generate_default_config() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }

    /// The group hint, with an empty string meaning "none".
    pub fn group(&self) -> Option<&str> {
        self.group_ownership.as_deref().filter(|g| !g.is_empty())
    }
}
