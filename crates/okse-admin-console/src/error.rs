//! Errors raised by the console outside the polling path.

use std::path::PathBuf;

use okse_admin_protocol::{ConfigurationError, TransportError, UnknownTabError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid {what} '{value}'")]
    InvalidArgument { what: &'static str, value: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    UnknownTab(#[from] UnknownTabError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("terminal I/O failed: {0}")]
    Terminal(#[from] std::io::Error),
}
