//! Audit store error types.

use thiserror::Error;

/// Result alias for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Errors from the audit persistence layer.
///
/// Any variant is an `AuditWriteFailure` from the caller's point of view:
/// the action whose audit record could not be written must not proceed.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Underlying SQLite failure.
    #[error("audit database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool exhausted or broken.
    #[error("audit connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Stored JSON could not be decoded.
    #[error("corrupt audit payload: {0}")]
    Corrupt(#[from] serde_json::Error),
}
