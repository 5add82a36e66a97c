//! Settings error types.

use thiserror::Error;

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors that can occur loading configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Config file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON or does not match the schema.
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}
