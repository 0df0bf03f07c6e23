use thiserror::Error;

/// Switchyard error types
///
/// Only setup and control operations fail. Problems with the byte stream
/// itself are diagnostics, see [`crate::domain::diagnostics`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Invalid destination name {name:?}: {reason}")]
    InvalidDestinationName { name: String, reason: String },

    #[error("Failed to spawn extraction worker: {0}")]
    WorkerSpawn(std::io::Error),

    #[error("Extraction worker is no longer running")]
    WorkerGone,

    #[error("Router service is no longer running")]
    RouterGone,
}

impl Error {
    pub fn invalid_setting(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_destination(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidDestinationName {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
