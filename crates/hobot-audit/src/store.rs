//! The [`AuditStore`]: pooled SQLite access for audit entries, escalations,
//! and clinical facts.
//!
//! Audit rows are append-only and safe for concurrent writers by
//! construction (new rows, no shared mutable row state). The only UPDATE in
//! this module appends a resolution to an escalation.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use hobot_core::facts::{ClinicalFact, FactKind};

use crate::errors::Result;
use crate::schema::run_migrations;

/// Kind of audited action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    /// A tool was dispatched on behalf of the user.
    ToolCall,
    /// A chat turn completed (provider or keyword path).
    ChatResponse,
    /// A critical tool was staged pending confirmation.
    CriticalToolGated,
    /// A staged critical tool was confirmed and executed.
    CriticalToolConfirmed,
    /// A human escalation was requested.
    Escalate,
}

impl ActionKind {
    /// Stable name stored in the `action` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::ToolCall => "tool_call",
            ActionKind::ChatResponse => "chat_response",
            ActionKind::CriticalToolGated => "critical_tool_gated",
            ActionKind::CriticalToolConfirmed => "critical_tool_confirmed",
            ActionKind::Escalate => "escalate",
        }
    }
}

/// One audit entry, ready to insert.
///
/// `params` is hashed before storage; raw parameters (which may carry PHI)
/// never reach the audit table.
#[derive(Clone, Debug)]
pub struct ActionRecord<'a> {
    pub tenant_id: &'a str,
    pub session_id: &'a str,
    pub user_id: &'a str,
    pub channel: &'a str,
    pub action: ActionKind,
    pub tool_name: Option<&'a str>,
    pub params: Option<&'a Value>,
    pub result_summary: Option<&'a str>,
    pub confirmation_id: Option<&'a str>,
    pub provider: Option<&'a str>,
    pub model: Option<&'a str>,
    pub latency_ms: Option<u64>,
}

impl<'a> ActionRecord<'a> {
    /// Minimal record; optional fields start empty.
    #[must_use]
    pub fn new(
        tenant_id: &'a str,
        session_id: &'a str,
        user_id: &'a str,
        channel: &'a str,
        action: ActionKind,
    ) -> Self {
        Self {
            tenant_id,
            session_id,
            user_id,
            channel,
            action,
            tool_name: None,
            params: None,
            result_summary: None,
            confirmation_id: None,
            provider: None,
            model: None,
            latency_ms: None,
        }
    }
}

/// A stored audit entry.
#[derive(Clone, Debug, PartialEq)]
pub struct AuditRow {
    pub id: i64,
    pub tenant_id: String,
    pub timestamp: String,
    pub session_id: String,
    pub action: String,
    pub tool_name: Option<String>,
    pub params_hash: Option<String>,
    pub result_summary: Option<String>,
    pub confirmation_id: Option<String>,
    pub provider: Option<String>,
    pub latency_ms: Option<u64>,
}

/// A stored escalation.
#[derive(Clone, Debug, PartialEq)]
pub struct EscalationRow {
    pub id: i64,
    pub tenant_id: String,
    pub audit_log_id: i64,
    pub escalated_to: String,
    pub reason: Option<String>,
    pub resolved_at: Option<String>,
    pub resolved_by: Option<String>,
    pub resolution: Option<String>,
}

/// Pooled SQLite store for the audit trail.
pub struct AuditStore {
    pool: Pool<SqliteConnectionManager>,
}

impl AuditStore {
    /// Open (or create) the audit database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            // Best effort; open() reports the real failure if this races.
            let _ = std::fs::create_dir_all(parent);
        }
        let manager = SqliteConnectionManager::file(path);
        Self::from_manager(manager, 8)
    }

    /// In-memory store for tests. Single pooled connection so every caller
    /// sees the same database.
    pub fn in_memory() -> Result<Self> {
        Self::from_manager(SqliteConnectionManager::memory(), 1)
    }

    fn from_manager(manager: SqliteConnectionManager, max_size: u32) -> Result<Self> {
        let pool = Pool::builder().max_size(max_size).build(manager)?;
        {
            let conn = pool.get()?;
            run_migrations(&conn)?;
        }
        Ok(Self { pool })
    }

    /// SHA-256 hex digest of a JSON value with stable key order.
    #[must_use]
    pub fn hash_params(params: &Value) -> String {
        let canonical = canonicalize(params).to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        format!("{digest:x}")
    }

    // ─────────────────────────────────────────────────────────────────────
    // Audit log
    // ─────────────────────────────────────────────────────────────────────

    /// Insert an audit entry. Returns the new row id.
    #[instrument(skip_all, fields(action = record.action.as_str(), tool = record.tool_name))]
    pub fn log_action(&self, record: &ActionRecord<'_>) -> Result<i64> {
        let conn = self.pool.get()?;
        let now = chrono::Utc::now().to_rfc3339();
        let params_hash = record.params.map(Self::hash_params);
        let _ = conn.execute(
            "INSERT INTO audit_log
               (tenant_id, timestamp, session_id, user_id, channel, action,
                tool_name, params_hash, result_summary, confirmation_id,
                provider, model, latency_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.tenant_id,
                now,
                record.session_id,
                record.user_id,
                record.channel,
                record.action.as_str(),
                record.tool_name,
                params_hash,
                record.result_summary,
                record.confirmation_id,
                record.provider,
                record.model,
                record.latency_ms,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, "audit entry written");
        Ok(id)
    }

    /// Most recent audit entries for a tenant, newest first.
    pub fn recent_actions(&self, tenant_id: &str, limit: u32) -> Result<Vec<AuditRow>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, timestamp, session_id, action, tool_name,
                    params_hash, result_summary, confirmation_id, provider, latency_ms
             FROM audit_log WHERE tenant_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![tenant_id, limit], |row| {
            Ok(AuditRow {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                timestamp: row.get(2)?,
                session_id: row.get(3)?,
                action: row.get(4)?,
                tool_name: row.get(5)?,
                params_hash: row.get(6)?,
                result_summary: row.get(7)?,
                confirmation_id: row.get(8)?,
                provider: row.get(9)?,
                latency_ms: row.get(10)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Escalations
    // ─────────────────────────────────────────────────────────────────────

    /// Insert an escalation linked to an audit entry. Returns its id.
    #[instrument(skip(self))]
    pub fn log_escalation(
        &self,
        tenant_id: &str,
        audit_log_id: i64,
        escalated_to: &str,
        reason: Option<&str>,
    ) -> Result<i64> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO escalations (tenant_id, audit_log_id, escalated_to, reason)
             VALUES (?1, ?2, ?3, ?4)",
            params![tenant_id, audit_log_id, escalated_to, reason],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Append a resolution to an escalation. Returns false if the id is
    /// unknown. Resolution fields are the only mutable state in this store.
    #[instrument(skip(self))]
    pub fn resolve_escalation(
        &self,
        escalation_id: i64,
        resolved_by: &str,
        resolution: &str,
    ) -> Result<bool> {
        let conn = self.pool.get()?;
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE escalations SET resolved_at = ?1, resolved_by = ?2, resolution = ?3
             WHERE id = ?4 AND resolved_at IS NULL",
            params![now, resolved_by, resolution, escalation_id],
        )?;
        Ok(changed > 0)
    }

    /// Fetch a single escalation.
    pub fn get_escalation(&self, escalation_id: i64) -> Result<Option<EscalationRow>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, tenant_id, audit_log_id, escalated_to, reason,
                    resolved_at, resolved_by, resolution
             FROM escalations WHERE id = ?1",
            params![escalation_id],
            |row| {
                Ok(EscalationRow {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    audit_log_id: row.get(2)?,
                    escalated_to: row.get(3)?,
                    reason: row.get(4)?,
                    resolved_at: row.get(5)?,
                    resolved_by: row.get(6)?,
                    resolution: row.get(7)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Clinical facts
    // ─────────────────────────────────────────────────────────────────────

    /// Append a clinical fact. Facts are never updated or deleted.
    #[instrument(skip_all, fields(patient = %fact.patient_id, kind = fact.kind.as_str()))]
    pub fn insert_fact(&self, fact: &ClinicalFact) -> Result<i64> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO clinical_facts
               (session_id, tenant_id, patient_id, fact_type, fact_data,
                source_tool, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                fact.session_id,
                fact.tenant_id,
                fact.patient_id,
                fact.kind.as_str(),
                fact.data.to_string(),
                fact.source_tool,
                fact.recorded_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent facts for a patient, newest first.
    pub fn facts_for_patient(
        &self,
        patient_id: &str,
        tenant_id: &str,
        limit: u32,
    ) -> Result<Vec<ClinicalFact>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, tenant_id, patient_id, fact_type, fact_data,
                    source_tool, recorded_at
             FROM clinical_facts
             WHERE patient_id = ?1 AND tenant_id = ?2
             ORDER BY id DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![patient_id, tenant_id, limit], |row| {
            let fact_type: String = row.get(3)?;
            let fact_data: String = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                fact_type,
                fact_data,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut facts = Vec::new();
        for row in rows {
            let (session_id, tenant, patient, fact_type, fact_data, source_tool, recorded_at) =
                row?;
            let kind: FactKind = serde_json::from_value(Value::String(fact_type))?;
            facts.push(ClinicalFact {
                kind,
                data: serde_json::from_str(&fact_data)?,
                patient_id: patient,
                source_tool: source_tool.unwrap_or_default(),
                session_id,
                tenant_id: tenant,
                recorded_at,
            });
        }
        Ok(facts)
    }
}

/// Sort object keys recursively so equal params always hash equal.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by_key(|(k, _)| k.as_str().to_owned());
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
