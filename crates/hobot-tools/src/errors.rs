//! Tool execution error types.

use thiserror::Error;

/// Result alias for tool operations.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors from tool validation, dispatch, and confirmation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Parameters failed schema validation. Every violation is listed; the
    /// tool was never dispatched.
    #[error("invalid parameters: {}", violations.join("; "))]
    Validation { violations: Vec<String> },

    /// No descriptor with this name exists in the registry.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}")]
    BackendStatus { status: u16, detail: String },

    /// The backend could not be reached and no cached payload was available.
    #[error("backend unreachable: {0}")]
    BackendUnreachable(#[from] reqwest::Error),

    /// Confirmation id unknown or already consumed.
    #[error("confirmation not found or already executed: {0}")]
    ConfirmationNotFound(String),

    /// The audit record for this action could not be written. The action
    /// must not proceed.
    #[error("audit write failed: {0}")]
    Audit(#[from] hobot_audit::AuditError),
}
