//! Tool execution: validation, the confirmation gate, dispatch, and the
//! gateway-level escalate tool, with audit entries at each safety boundary.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use hobot_audit::{ActionKind, ActionRecord, AuditStore};
use hobot_core::phi;
use hobot_core::text::payload_snippet;

use crate::dispatch::{Dispatcher, ToolReply};
use crate::errors::{Result, ToolError};
use crate::gate::{ConfirmationGate, PendingConfirmation};
use crate::registry::{Registry, ToolKind};

/// Max bytes of result summary carried into the audit log.
const SUMMARY_MAX: usize = 200;

/// Who is asking. Threaded through to every audit entry.
#[derive(Clone, Debug)]
pub struct CallerContext {
    pub session_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub channel: String,
}

/// How a tool call ended.
#[derive(Clone, Debug)]
pub enum ToolOutcome {
    /// Live backend result.
    Completed(Value),
    /// Cached payload served because the backend was unreachable.
    Degraded { payload: Value, staleness: Duration },
    /// Critical tool staged; nothing executed yet.
    AwaitingConfirmation {
        confirmation_id: String,
        message: String,
    },
    /// Escalation recorded and acknowledged.
    Escalated(Value),
}

impl ToolOutcome {
    /// Wire payload fed back to the model (and to HTTP clients). Degraded
    /// results always carry an explicit warning with their staleness.
    #[must_use]
    pub fn into_payload(self) -> Value {
        match self {
            ToolOutcome::Completed(payload) | ToolOutcome::Escalated(payload) => payload,
            ToolOutcome::Degraded { payload, staleness } => json!({
                "data": payload,
                "warning": format!(
                    "DEGRADED MODE: serving cached data ({:.1}s stale). Live backend unreachable.",
                    staleness.as_secs_f64()
                ),
            }),
            ToolOutcome::AwaitingConfirmation {
                confirmation_id,
                message,
            } => json!({
                "status": "awaiting_confirmation",
                "confirmation_id": confirmation_id,
                "message": message,
            }),
        }
    }
}

/// Orchestrates one tool call end to end.
pub struct ToolExecutor {
    registry: Registry,
    dispatcher: Dispatcher,
    gate: ConfirmationGate,
    audit: Arc<AuditStore>,
}

impl ToolExecutor {
    #[must_use]
    pub fn new(registry: Registry, dispatcher: Dispatcher, audit: Arc<AuditStore>) -> Self {
        Self {
            registry,
            dispatcher,
            gate: ConfirmationGate::new(),
            audit,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Execute a tool call. Critical tools are staged, not executed.
    #[instrument(skip(self, params, ctx), fields(session = %ctx.session_id))]
    pub async fn call_tool(
        &self,
        tool_name: &str,
        params: &Value,
        ctx: &CallerContext,
    ) -> Result<ToolOutcome> {
        let descriptor = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_owned()))?;

        let violations = descriptor.validate(params);
        if !violations.is_empty() {
            counter!("hobot_tool_validation_failures_total", "tool" => descriptor.name)
                .increment(1);
            return Err(ToolError::Validation { violations });
        }

        if descriptor.kind == ToolKind::Escalate {
            return self.escalate(params, ctx);
        }

        if descriptor.critical {
            return self.stage_critical(descriptor.name, params, ctx);
        }

        let reply = self.dispatcher.dispatch(descriptor, params).await?;
        Ok(reply_outcome(reply))
    }

    /// Execute a previously staged critical tool. The caller context audited
    /// here is the one captured at staging time.
    #[instrument(skip(self))]
    pub async fn confirm(&self, confirmation_id: &str) -> Result<ToolOutcome> {
        let ticket = self
            .gate
            .take(confirmation_id)
            .ok_or_else(|| ToolError::ConfirmationNotFound(confirmation_id.to_owned()))?;

        let descriptor = self
            .registry
            .get(&ticket.tool)
            .ok_or_else(|| ToolError::UnknownTool(ticket.tool.clone()))?;

        info!(tool = %ticket.tool, "confirmed critical tool, dispatching");
        let reply = self.dispatcher.dispatch(descriptor, &ticket.params).await?;

        let summary = redacted_summary(&reply.payload);
        let mut record = ActionRecord::new(
            &ticket.tenant_id,
            &ticket.session_id,
            &ticket.user_id,
            &ticket.channel,
            ActionKind::CriticalToolConfirmed,
        );
        record.tool_name = Some(&ticket.tool);
        record.params = Some(&ticket.params);
        record.result_summary = Some(&summary);
        record.confirmation_id = Some(&ticket.id);
        let _ = self.audit.log_action(&record)?;
        counter!("hobot_critical_confirmed_total", "tool" => descriptor.name).increment(1);

        Ok(reply_outcome(reply))
    }

    fn stage_critical(
        &self,
        tool_name: &'static str,
        params: &Value,
        ctx: &CallerContext,
    ) -> Result<ToolOutcome> {
        let confirmation_id = ConfirmationGate::mint_id();

        // Audit first. If the gated entry cannot be written, nothing is
        // staged and the caller sees the failure.
        let mut record = ActionRecord::new(
            &ctx.tenant_id,
            &ctx.session_id,
            &ctx.user_id,
            &ctx.channel,
            ActionKind::CriticalToolGated,
        );
        record.tool_name = Some(tool_name);
        record.params = Some(params);
        record.confirmation_id = Some(&confirmation_id);
        let _ = self.audit.log_action(&record)?;

        self.gate.stage(PendingConfirmation {
            id: confirmation_id.clone(),
            tool: tool_name.to_owned(),
            params: params.clone(),
            session_id: ctx.session_id.clone(),
            tenant_id: ctx.tenant_id.clone(),
            user_id: ctx.user_id.clone(),
            channel: ctx.channel.clone(),
        });
        counter!("hobot_critical_gated_total", "tool" => tool_name).increment(1);

        let message = format!(
            "Critical action '{tool_name}' requires confirmation. \
             POST /confirm/{confirmation_id} to execute."
        );
        Ok(ToolOutcome::AwaitingConfirmation {
            confirmation_id,
            message,
        })
    }

    fn escalate(&self, params: &Value, ctx: &CallerContext) -> Result<ToolOutcome> {
        let patient_id = params["patient_id"].as_str().unwrap_or("unknown");
        let reason = params["reason"].as_str().unwrap_or("");
        let escalated_to = params["escalate_to"].as_str().unwrap_or("on_call_physician");

        warn!(patient = %patient_id, to = %escalated_to, "escalating to human");

        let summary = format!("Escalated to {escalated_to} for patient {patient_id}");
        let mut record = ActionRecord::new(
            &ctx.tenant_id,
            &ctx.session_id,
            &ctx.user_id,
            &ctx.channel,
            ActionKind::Escalate,
        );
        record.tool_name = Some("escalate");
        record.params = Some(params);
        record.result_summary = Some(&summary);
        let audit_id = self.audit.log_action(&record)?;

        let escalation_id = self.audit.log_escalation(
            &ctx.tenant_id,
            audit_id,
            escalated_to,
            (!reason.is_empty()).then_some(reason),
        )?;
        counter!("hobot_escalations_total").increment(1);

        Ok(ToolOutcome::Escalated(json!({
            "status": "escalated",
            "escalation_id": escalation_id,
            "escalated_to": escalated_to,
            "message": format!(
                "Escalation logged. {escalated_to} has been notified regarding patient {patient_id}."
            ),
        })))
    }
}

fn reply_outcome(reply: ToolReply) -> ToolOutcome {
    match reply.staleness {
        Some(staleness) => ToolOutcome::Degraded {
            payload: reply.payload,
            staleness,
        },
        None => ToolOutcome::Completed(reply.payload),
    }
}

/// Redacted, clipped payload summary for the audit log.
fn redacted_summary(payload: &Value) -> String {
    let snippet = payload_snippet(payload, SUMMARY_MAX);
    phi::redact(&snippet).text
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{method as http_method, path as http_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::cache::DegradedCache;
    use hobot_settings::BackendSettings;

    fn executor_for(server: &MockServer) -> ToolExecutor {
        executor_with_base(server.uri())
    }

    fn executor_with_base(url: String) -> ToolExecutor {
        let backends = BackendSettings {
            monitoring: url.clone(),
            ehr: url.clone(),
            lis: url.clone(),
            pharmacy: url.clone(),
            radiology: url.clone(),
            bloodbank: url.clone(),
            erp: url.clone(),
            patient_services: url,
            timeout_secs: 5,
        };
        let dispatcher = Dispatcher::new(
            backends,
            reqwest::Client::new(),
            Arc::new(DegradedCache::default()),
        );
        ToolExecutor::new(
            Registry::load().unwrap(),
            dispatcher,
            Arc::new(AuditStore::in_memory().unwrap()),
        )
    }

    fn ctx() -> CallerContext {
        CallerContext {
            session_id: "sess_1".into(),
            tenant_id: "default".into(),
            user_id: "nurse_7".into(),
            channel: "webchat".into(),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_not_a_validation_failure() {
        let executor = executor_with_base("http://127.0.0.1:1".into());
        let err = executor
            .call_tool("format_disk", &json!({}), &ctx())
            .await
            .unwrap_err();
        assert_matches!(err, ToolError::UnknownTool(name) if name == "format_disk");
    }

    #[tokio::test]
    async fn invalid_params_never_dispatch() {
        // Backend is unreachable; a dispatch attempt would surface as
        // BackendUnreachable, so Validation proves nothing was sent.
        let executor = executor_with_base("http://127.0.0.1:1".into());
        let err = executor
            .call_tool("get_vitals", &json!({}), &ctx())
            .await
            .unwrap_err();
        assert_matches!(err, ToolError::Validation { violations } => {
            assert_eq!(violations.len(), 1);
        });
    }

    #[tokio::test]
    async fn non_critical_tool_dispatches_immediately() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(http_path("/vitals/P001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"heart_rate": 72})))
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let outcome = executor
            .call_tool("get_vitals", &json!({"patient_id": "P001"}), &ctx())
            .await
            .unwrap();
        assert_matches!(outcome, ToolOutcome::Completed(payload) => {
            assert_eq!(payload["heart_rate"], 72);
        });
    }

    #[tokio::test]
    async fn critical_tool_is_gated_then_confirmed_once() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(http_path("/dispense"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "dispensed"})))
            .expect(1)
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let params = json!({"patient_id": "P001", "medication": "morphine"});

        let outcome = executor
            .call_tool("dispense_medication", &params, &ctx())
            .await
            .unwrap();
        let confirmation_id = assert_matches!(
            outcome,
            ToolOutcome::AwaitingConfirmation { confirmation_id, message } => {
                assert!(message.contains(&confirmation_id));
                confirmation_id
            }
        );

        // Nothing executed yet (expect(1) above covers only the confirm).
        let confirmed = executor.confirm(&confirmation_id).await.unwrap();
        assert_matches!(confirmed, ToolOutcome::Completed(payload) => {
            assert_eq!(payload["status"], "dispensed");
        });

        // Second confirm finds nothing.
        let err = executor.confirm(&confirmation_id).await.unwrap_err();
        assert_matches!(err, ToolError::ConfirmationNotFound(_));
    }

    #[tokio::test]
    async fn gating_writes_audit_before_staging() {
        let executor = executor_with_base("http://127.0.0.1:1".into());
        let params = json!({"patient_id": "P001", "location": "ICU-A bed 3"});
        let _ = executor
            .call_tool("initiate_code_blue", &params, &ctx())
            .await
            .unwrap();

        let rows = executor.audit.recent_actions("default", 10).unwrap();
        assert_eq!(rows[0].action, "critical_tool_gated");
        assert_eq!(rows[0].tool_name.as_deref(), Some("initiate_code_blue"));
        assert!(rows[0].confirmation_id.is_some());
        // Raw params never stored, only the hash.
        assert!(rows[0].params_hash.as_deref().unwrap().len() == 64);
    }

    #[tokio::test]
    async fn confirm_audits_with_redacted_summary() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(http_path("/dispense"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "dispensed", "patient_id": "P001"
            })))
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let params = json!({"patient_id": "P001", "medication": "morphine"});
        let outcome = executor
            .call_tool("dispense_medication", &params, &ctx())
            .await
            .unwrap();
        let ToolOutcome::AwaitingConfirmation { confirmation_id, .. } = outcome else {
            panic!("expected staged outcome");
        };
        let _ = executor.confirm(&confirmation_id).await.unwrap();

        let rows = executor.audit.recent_actions("default", 10).unwrap();
        assert_eq!(rows[0].action, "critical_tool_confirmed");
        let summary = rows[0].result_summary.as_deref().unwrap();
        assert!(!summary.contains("P001"), "summary leaked PHI: {summary}");
    }

    #[tokio::test]
    async fn escalate_records_audit_and_escalation_row() {
        let executor = executor_with_base("http://127.0.0.1:1".into());
        let outcome = executor
            .call_tool(
                "escalate",
                &json!({
                    "patient_id": "P001",
                    "reason": "unresponsive to medication",
                    "escalate_to": "icu_consultant",
                }),
                &ctx(),
            )
            .await
            .unwrap();

        let payload = outcome.into_payload();
        assert_eq!(payload["status"], "escalated");
        assert_eq!(payload["escalated_to"], "icu_consultant");
        let escalation_id = payload["escalation_id"].as_i64().unwrap();

        let row = executor.audit.get_escalation(escalation_id).unwrap().unwrap();
        assert_eq!(row.escalated_to, "icu_consultant");
        assert_eq!(row.reason.as_deref(), Some("unresponsive to medication"));
    }

    #[tokio::test]
    async fn degraded_payload_carries_warning_and_staleness() {
        let outcome = ToolOutcome::Degraded {
            payload: json!({"heart_rate": 72}),
            staleness: Duration::from_secs(42),
        };
        let payload = outcome.into_payload();
        assert_eq!(payload["data"]["heart_rate"], 72);
        let warning = payload["warning"].as_str().unwrap();
        assert!(warning.contains("DEGRADED MODE"));
        assert!(warning.contains("42.0s stale"));
    }
}
