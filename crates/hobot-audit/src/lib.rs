//! # hobot-audit
//!
//! SQLite-backed persistence for the gateway's safety trail:
//!
//! - **Audit log**: append-only [`store::ActionRecord`] rows: write-once,
//!   queryable, never updated.
//! - **Escalations**: human hand-off records linked to an audit entry,
//!   mutable only to append a resolution.
//! - **Clinical facts**: append-only patient-scoped data extracted from tool
//!   results, used to enrich future prompt context.
//!
//! Tool parameters are never stored raw: only a SHA-256 hash reaches the
//! audit table. Result summaries are clipped and PHI-redacted by callers
//! before they arrive here.
//!
//! If an audit write fails, the error is surfaced to the caller, which must
//! treat it as fatal for that action, since untracked critical actions are
//! unacceptable.

#![deny(unsafe_code)]

pub mod errors;
pub mod schema;
pub mod store;

pub use errors::{AuditError, Result};
pub use store::{ActionKind, ActionRecord, AuditRow, AuditStore, EscalationRow};
