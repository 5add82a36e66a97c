//! Provider error types.

use thiserror::Error;

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors from a chat provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (connect, timeout, TLS).
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// No provider matched the requested name.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// No providers are configured at all.
    #[error("no chat providers configured")]
    NoneConfigured,
}
