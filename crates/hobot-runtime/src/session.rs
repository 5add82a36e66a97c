//! JSONL-backed session state.
//!
//! Each session is one append-only event log under
//! `<sessions_dir>/<tenant>/<session_id>.jsonl`: a metadata record on the
//! first line, then `message` and `consolidation` events in order. Loading
//! replays the log; messages folded by the latest consolidation are dropped
//! from the working list so they are never re-sent or re-summarized.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use hobot_core::messages::{ChatMessage, Role};

use crate::errors::{SessionError, SessionResult};

/// One conversation with its working state.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub channel: String,
    pub created_at: String,
    pub messages: Vec<ChatMessage>,
    pub active_patients: BTreeSet<String>,
    pub summary: String,
    /// Messages before this index have been folded into `summary`.
    pub last_consolidated: usize,
    path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct Metadata {
    session_id: String,
    tenant_id: String,
    user_id: String,
    channel: String,
    created_at: String,
    last_consolidated: usize,
    summary: String,
    active_patients: Vec<String>,
}

impl Session {
    fn new(
        id: String,
        tenant_id: String,
        user_id: String,
        channel: String,
        path: PathBuf,
    ) -> Self {
        Self {
            id,
            tenant_id,
            user_id,
            channel,
            created_at: chrono::Utc::now().to_rfc3339(),
            messages: Vec::new(),
            active_patients: BTreeSet::new(),
            summary: String::new(),
            last_consolidated: 0,
            path,
        }
    }

    fn metadata(&self) -> Metadata {
        Metadata {
            session_id: self.id.clone(),
            tenant_id: self.tenant_id.clone(),
            user_id: self.user_id.clone(),
            channel: self.channel.clone(),
            created_at: self.created_at.clone(),
            last_consolidated: self.last_consolidated,
            summary: self.summary.clone(),
            active_patients: self.active_patients.iter().cloned().collect(),
        }
    }

    fn append_line(&self, line: &serde_json::Value) -> SessionResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn persist_new(&self) -> SessionResult<()> {
        let mut value = serde_json::to_value(self.metadata())?;
        value["type"] = json!("metadata");
        self.append_line(&value)
    }

    /// Rewrite line 0 with current metadata. Message/consolidation events
    /// after it are untouched.
    fn rewrite_metadata(&self) -> SessionResult<()> {
        let text = fs::read_to_string(&self.path)?;
        let mut lines: Vec<&str> = text.lines().collect();
        let mut value = serde_json::to_value(self.metadata())?;
        value["type"] = json!("metadata");
        let meta_line = value.to_string();
        if lines.is_empty() {
            lines.push(&meta_line);
        } else {
            lines[0] = &meta_line;
        }
        fs::write(&self.path, format!("{}\n", lines.join("\n")))?;
        Ok(())
    }

    /// Append a message, persisting it synchronously.
    pub fn append_message(&mut self, role: Role, content: String) -> SessionResult<()> {
        let message = ChatMessage::now(role, content);
        self.append_line(&json!({
            "type": "message",
            "role": message.role,
            "content": message.content,
            "timestamp": message.timestamp,
        }))?;
        self.messages.push(message);
        Ok(())
    }

    /// Recent context for a provider: rolling summary (when present) plus the
    /// last `max_messages` messages.
    #[must_use]
    pub fn context(&self, max_messages: usize) -> Vec<ChatMessage> {
        let start = self.messages.len().saturating_sub(max_messages);
        let recent = self.messages[start..].iter().cloned();
        if self.summary.is_empty() {
            recent.collect()
        } else {
            std::iter::once(ChatMessage::transient(
                Role::System,
                format!("[Conversation summary]: {}", self.summary),
            ))
            .chain(recent)
            .collect()
        }
    }

    /// Persist a consolidation: record the event, update the summary, trim
    /// the folded prefix from the working list, and reset the pointer.
    #[instrument(skip(self, summary), fields(session = %self.id))]
    pub fn save_consolidation(&mut self, summary: String, fold_end: usize) -> SessionResult<()> {
        debug_assert!(fold_end <= self.messages.len());
        self.append_line(&json!({
            "type": "consolidation",
            "summary": summary,
            "pointer": fold_end,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))?;
        self.summary = summary;
        let _ = self.messages.drain(..fold_end.min(self.messages.len()));
        self.last_consolidated = 0;
        self.rewrite_metadata()?;
        info!(kept = self.messages.len(), "consolidated session history");
        Ok(())
    }

    /// Messages appended since the last consolidation.
    #[must_use]
    pub fn unconsolidated(&self) -> usize {
        self.messages.len().saturating_sub(self.last_consolidated)
    }

    fn load(path: &Path) -> SessionResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        let mut lines = text.lines();
        let Some(first) = lines.next() else {
            return Ok(None);
        };
        let head: serde_json::Value = serde_json::from_str(first)?;
        if head["type"] != "metadata" {
            return Err(SessionError::MissingMetadata);
        }
        let meta: Metadata = serde_json::from_value(head)?;

        let mut session = Self {
            id: meta.session_id,
            tenant_id: meta.tenant_id,
            user_id: meta.user_id,
            channel: meta.channel,
            created_at: meta.created_at,
            messages: Vec::new(),
            active_patients: meta.active_patients.into_iter().collect(),
            summary: meta.summary,
            last_consolidated: meta.last_consolidated,
            path: path.to_path_buf(),
        };

        let mut pointer = session.last_consolidated;
        for line in lines {
            let event: serde_json::Value = serde_json::from_str(line)?;
            match event["type"].as_str() {
                Some("message") => {
                    let message: ChatMessage = serde_json::from_value(event)?;
                    session.messages.push(message);
                }
                Some("consolidation") => {
                    // Last one wins on replay.
                    if let Some(summary) = event["summary"].as_str() {
                        session.summary = summary.to_owned();
                    }
                    if let Some(p) = event["pointer"].as_u64() {
                        pointer = usize::try_from(p).unwrap_or(usize::MAX);
                    }
                }
                _ => {}
            }
        }

        // Drop the folded prefix: it lives in the summary now.
        let _ = session.messages.drain(..pointer.min(session.messages.len()));
        session.last_consolidated = 0;
        Ok(Some(session))
    }
}

/// Shared handle to one session. The async mutex serializes turns so two
/// concurrent requests on the same session cannot interleave the event log.
pub type SessionHandle = Arc<Mutex<Session>>;

/// In-memory map over the on-disk session logs. Keyed by (tenant, session id)
/// so tenants sharing a session id never share state.
pub struct SessionStore {
    dir: PathBuf,
    sessions: SyncMutex<HashMap<(String, String), SessionHandle>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sessions: SyncMutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, tenant_id: &str, session_id: &str) -> PathBuf {
        self.dir.join(tenant_id).join(format!("{session_id}.jsonl"))
    }

    /// Existing session (memory, then disk) or a fresh one.
    ///
    /// Both ids arrive from requests and become path components, so they are
    /// validated before any filesystem access.
    #[instrument(skip(self))]
    pub fn get_or_create(
        &self,
        session_id: Option<&str>,
        tenant_id: &str,
        user_id: &str,
        channel: &str,
    ) -> SessionResult<SessionHandle> {
        validate_id("tenant_id", tenant_id)?;
        if let Some(id) = session_id {
            validate_id("session_id", id)?;
        }

        if let Some(id) = session_id {
            let key = (tenant_id.to_owned(), id.to_owned());
            if let Some(handle) = self.sessions.lock().get(&key) {
                return Ok(handle.clone());
            }
            let path = self.path_for(tenant_id, id);
            if let Some(session) = Session::load(&path)? {
                debug!(session = %id, "replayed session from disk");
                let handle = Arc::new(Mutex::new(session));
                let _ = self.sessions.lock().insert(key, handle.clone());
                return Ok(handle);
            }
        }

        let id = session_id.map_or_else(|| Uuid::now_v7().to_string(), str::to_owned);
        let path = self.path_for(tenant_id, &id);
        let session = Session::new(
            id.clone(),
            tenant_id.to_owned(),
            user_id.to_owned(),
            channel.to_owned(),
            path,
        );
        session.persist_new()?;
        let handle = Arc::new(Mutex::new(session));
        let _ = self
            .sessions
            .lock()
            .insert((tenant_id.to_owned(), id), handle.clone());
        Ok(handle)
    }

    /// Session already in memory, if any.
    #[must_use]
    pub fn get(&self, tenant_id: &str, session_id: &str) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .get(&(tenant_id.to_owned(), session_id.to_owned()))
            .cloned()
    }
}

const MAX_ID_LEN: usize = 128;

/// Ids may only contain alphanumerics, `-` and `_`, which rules out path
/// separators and `..` traversal.
fn validate_id(what: &'static str, value: &str) -> SessionResult<()> {
    let ok = !value.is_empty()
        && value.len() <= MAX_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(SessionError::InvalidId {
            what,
            value: value.to_owned(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
