//! Request handlers for the gateway HTTP surface.

use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tracing::{instrument, warn};

use hobot_runtime::{RuntimeError, SessionError};
use hobot_tools::ToolError;

use crate::state::AppState;

/// Per-backend timeout for health pings.
const HEALTH_PING_TIMEOUT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────────────────────
// Request / response types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub user_id: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
}

fn default_channel() -> String {
    "webchat".into()
}

fn default_tenant() -> String {
    "default".into()
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolved_by: String,
    pub resolution: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP-facing error. Internal detail stays in logs; the body carries a
/// single `error` string.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Upstream(m)
            | ApiError::Internal(m) => (self.status(), m.clone()),
        };
        if status.is_server_error() {
            warn!(%status, %message, "request failed");
        }
        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<ToolError> for ApiError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::ConfirmationNotFound(_) => ApiError::NotFound(err.to_string()),
            ToolError::Validation { .. } | ToolError::UnknownTool(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ToolError::BackendStatus { .. } | ToolError::BackendUnreachable(_) => {
                ApiError::Upstream(err.to_string())
            }
            ToolError::Audit(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Tool(tool) => tool.into(),
            RuntimeError::Session(session) => session.into(),
            RuntimeError::Audit(audit) => audit.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidId { .. } => ApiError::BadRequest(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<hobot_audit::AuditError> for ApiError {
    fn from(err: hobot_audit::AuditError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `POST /chat`: one full agent turn, response as a single body.
#[instrument(skip_all, fields(channel = %request.channel, tenant = %request.tenant_id))]
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let handle = state.sessions.get_or_create(
        request.session_id.as_deref(),
        &request.tenant_id,
        &request.user_id,
        &request.channel,
    )?;
    let response = state.engine.run(&request.message, &handle).await?;
    let session_id = handle.lock().await.id.clone();
    Ok(Json(ChatResponse {
        response,
        session_id,
    }))
}

/// `POST /chat/stream`: the same turn surfaced as SSE events, ending in
/// `done`.
#[instrument(skip_all, fields(channel = %request.channel, tenant = %request.tenant_id))]
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.sessions.get_or_create(
        request.session_id.as_deref(),
        &request.tenant_id,
        &request.user_id,
        &request.channel,
    )?;
    let events = state.engine.run_stream(request.message, handle);
    let stream = events.map(|event| Event::default().json_data(&event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `POST /confirm/{confirmation_id}`: execute a staged critical tool.
#[instrument(skip(state))]
pub async fn confirm(
    State(state): State<AppState>,
    Path(confirmation_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let outcome = state.engine.executor().confirm(&confirmation_id).await?;
    Ok(Json(json!({"result": outcome.into_payload()})))
}

/// `POST /escalations/{escalation_id}/resolve`: append a resolution.
#[instrument(skip(state, request))]
pub async fn resolve_escalation(
    State(state): State<AppState>,
    Path(escalation_id): Path<i64>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<Value>, ApiError> {
    let resolved =
        state
            .audit
            .resolve_escalation(escalation_id, &request.resolved_by, &request.resolution)?;
    if resolved {
        Ok(Json(json!({
            "status": "resolved",
            "escalation_id": escalation_id,
        })))
    } else {
        Err(ApiError::NotFound(
            "escalation not found or already resolved".into(),
        ))
    }
}

/// `GET /health`: ping every configured backend, report ok/degraded.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let checks: [(&str, &str, &str); 8] = [
        ("monitoring", &state.backends.monitoring, "/health"),
        ("ehr", &state.backends.ehr, "/fhir/metadata"),
        ("lis", &state.backends.lis, "/health"),
        ("pharmacy", &state.backends.pharmacy, "/health"),
        ("radiology", &state.backends.radiology, "/system"),
        ("bloodbank", &state.backends.bloodbank, "/health"),
        ("erp", &state.backends.erp, "/health"),
        (
            "patient_services",
            &state.backends.patient_services,
            "/health",
        ),
    ];

    let mut statuses = serde_json::Map::new();
    for (name, base, path) in checks {
        let status = match state
            .http
            .get(format!("{base}{path}"))
            .timeout(HEALTH_PING_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => "ok".to_owned(),
            Ok(resp) => format!("status={}", resp.status().as_u16()),
            Err(err) => format!("unreachable: {err}"),
        };
        let _ = statuses.insert(name.to_owned(), Value::String(status));
    }

    let all_ok = statuses.values().all(|s| s == "ok");
    Json(json!({
        "status": if all_ok { "ok" } else { "degraded" },
        "service": "hobot-gateway",
        "backends": statuses,
    }))
}

/// `GET /metrics`: Prometheus text exposition, when a recorder is installed.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
