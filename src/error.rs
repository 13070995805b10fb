use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt metadata file {path:?}: {source}")]
    CorruptMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid filter pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Config parsing failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config serialization failed: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Command failed: {0}")]
    Command(String),
}

pub type Result<T> = std::result::Result<T, Error>;
