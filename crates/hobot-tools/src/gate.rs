//! Confirmation gate for critical tools.
//!
//! A critical request is staged here as a [`PendingConfirmation`] and only
//! executes when a confirm arrives with the matching id. `take` removes the
//! ticket under the lock, so two concurrent confirms for the same id cannot
//! both execute: the second finds nothing.
//!
//! Tickets live in process memory only. Losing them on crash is acceptable:
//! no side effect has happened yet, so re-requesting is safe.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

/// A staged critical tool invocation, consumed exactly once.
#[derive(Clone, Debug)]
pub struct PendingConfirmation {
    pub id: String,
    pub tool: String,
    pub params: Value,
    pub session_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub channel: String,
}

/// In-process table of pending confirmations.
#[derive(Default)]
pub struct ConfirmationGate {
    pending: Mutex<HashMap<String, PendingConfirmation>>,
}

impl ConfirmationGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh confirmation id. Minted before staging so the gating audit
    /// entry can carry the id and abort staging if it cannot be written.
    #[must_use]
    pub fn mint_id() -> String {
        format!("cfm_{}", Uuid::now_v7())
    }

    /// Stage a ticket under its id.
    #[instrument(skip_all, fields(tool = %ticket.tool, confirmation_id = %ticket.id))]
    pub fn stage(&self, ticket: PendingConfirmation) {
        debug!("staged critical tool");
        let _ = self.pending.lock().insert(ticket.id.clone(), ticket);
    }

    /// Remove and return the ticket for `id`, if still unconsumed.
    #[must_use]
    pub fn take(&self, id: &str) -> Option<PendingConfirmation> {
        self.pending.lock().remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
