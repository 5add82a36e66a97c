//! Runtime error types.

use thiserror::Error;

/// Result alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors from the JSONL session store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt session event log: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("session file has no metadata record")]
    MissingMetadata,

    #[error("invalid {what}: {value:?}")]
    InvalidId {
        what: &'static str,
        value: String,
    },
}

/// Result alias for agent turns.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced from a full agent turn.
///
/// Provider and tool failures are normally absorbed inside the loop (keyword
/// fallback, error payloads fed back to the model); what escapes here is
/// state the turn cannot proceed without.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Audit(#[from] hobot_audit::AuditError),

    #[error(transparent)]
    Tool(#[from] hobot_tools::ToolError),
}
