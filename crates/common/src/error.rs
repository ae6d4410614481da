//! Error type shared by configuration loading across the workspace

use std::path::PathBuf;

use thiserror::Error;

/// Configuration and startup error
#[derive(Error, Debug)]
pub enum Error {
    /// A value was read but is not acceptable
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Toml(#[from] toml::de::Error),

    /// A secret file was named but could not be read
    #[error("cannot read secret file {}: {source}", path.display())]
    SecretFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
