//! Database schema and migrations.
//!
//! `run_migrations` is idempotent (every statement is `IF NOT EXISTS`) and
//! runs on store open, so a fresh database file is usable immediately.

use rusqlite::Connection;

use crate::errors::Result;

/// Schema DDL, applied in order.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS audit_log (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id       TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    session_id      TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    channel         TEXT NOT NULL,
    action          TEXT NOT NULL,
    tool_name       TEXT,
    params_hash     TEXT,
    result_summary  TEXT,
    confirmation_id TEXT,
    provider        TEXT,
    model           TEXT,
    latency_ms      INTEGER
);

CREATE INDEX IF NOT EXISTS idx_audit_tenant_time
    ON audit_log (tenant_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_session
    ON audit_log (session_id);

CREATE TABLE IF NOT EXISTS escalations (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id    TEXT NOT NULL,
    audit_log_id INTEGER NOT NULL REFERENCES audit_log (id),
    escalated_to TEXT NOT NULL,
    reason       TEXT,
    resolved_at  TEXT,
    resolved_by  TEXT,
    resolution   TEXT
);

CREATE INDEX IF NOT EXISTS idx_escalations_tenant
    ON escalations (tenant_id);

CREATE TABLE IF NOT EXISTS clinical_facts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id  TEXT NOT NULL,
    tenant_id   TEXT NOT NULL,
    patient_id  TEXT NOT NULL,
    fact_type   TEXT NOT NULL,
    fact_data   TEXT NOT NULL,
    source_tool TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_facts_patient
    ON clinical_facts (tenant_id, patient_id, recorded_at);
";

/// Apply the schema to a connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('audit_log', 'escalations', 'clinical_facts')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }
}
