//! The agent loop: provider-routed tool calling with a keyword fallback.
//!
//! One turn is an explicit state machine. `CallProvider` asks the model for
//! the next step; a parsed tool call loops back through dispatch; plain text
//! ends the turn; the iteration budget ends it with a fixed message; losing
//! the provider mid-turn drops to the keyword path. The streaming and
//! non-streaming endpoints drive the same loop through an event sink, so
//! their side effects are identical by construction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde_json::{Value, json};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, instrument, warn};

use hobot_audit::{ActionKind, ActionRecord, AuditStore};
use hobot_core::facts::{ClinicalFact, extract_facts};
use hobot_core::messages::{ChatMessage, Role};
use hobot_core::phi;
use hobot_core::text::payload_snippet;
use hobot_llm::{ChatProvider, ProviderRouter};
use hobot_settings::AgentSettings;
use hobot_tools::{CallerContext, ToolError, ToolExecutor};

use crate::consolidate::maybe_consolidate;
use crate::errors::Result;
use crate::events::{AgentEvent, EventSink};
use crate::intent::detect_intent;
use crate::parse::{ToolCall, parse_tool_call};
use crate::session::{Session, SessionHandle};

const SYSTEM_PROMPT: &str = "You are Hobot, a clinical AI assistant for hospital staff.
You have access to the following tools to query hospital systems.
When you need data, call a tool. Never fabricate clinical data.
Always cite which tool provided the data.
For critical actions (marked critical), the system will require human confirmation before execution.

Available tools:
{tools}

Respond concisely and professionally. Use structured formatting when presenting clinical data.";

const BUDGET_MESSAGE: &str =
    "I've reached the maximum number of steps for this request. Please try a more specific query.";

const HELP_MESSAGE: &str = "I couldn't determine what you're looking for. \
Try asking about vitals, medications, allergies, lab results, \
ward patients, blood availability, or inventory.";

/// Max bytes of result summary carried into the audit log.
const SUMMARY_MAX: usize = 200;

/// States of one agent turn.
enum TurnState {
    /// Ask the provider for the next step.
    CallProvider,
    /// The provider asked for a tool; `content` is its full reply.
    ToolCallParsed { call: ToolCall, content: String },
    /// The provider answered in plain text.
    FinalText(String),
    /// Iteration budget spent.
    BudgetExhausted,
    /// Provider failed mid-turn; keyword fallback takes over.
    ProviderLost,
}

/// Drives agent turns against a session.
pub struct AgentEngine {
    router: Arc<ProviderRouter>,
    executor: Arc<ToolExecutor>,
    audit: Arc<AuditStore>,
    settings: AgentSettings,
}

impl AgentEngine {
    #[must_use]
    pub fn new(
        router: Arc<ProviderRouter>,
        executor: Arc<ToolExecutor>,
        audit: Arc<AuditStore>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            router,
            executor,
            audit,
            settings,
        }
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// One turn, discarding intermediate events.
    pub async fn run(&self, user_message: &str, handle: &SessionHandle) -> Result<String> {
        let mut sink = |_: AgentEvent| {};
        self.run_turn(user_message, handle, &mut sink).await
    }

    /// One turn as an event stream. A turn that fails internally still ends
    /// with `text` and `done` events so clients are never left hanging.
    #[must_use]
    pub fn run_stream(
        self: &Arc<Self>,
        user_message: String,
        handle: SessionHandle,
    ) -> UnboundedReceiverStream<AgentEvent> {
        let engine = self.clone();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let _ = tokio::spawn(async move {
            let event_tx = tx.clone();
            let mut sink = move |event: AgentEvent| {
                let _ = event_tx.send(event);
            };
            if let Err(err) = engine.run_turn(&user_message, &handle, &mut sink).await {
                warn!(error = %err, "agent turn failed");
                let session_id = handle.lock().await.id.clone();
                let _ = tx.send(AgentEvent::Text {
                    content: format!("Internal error: {err}"),
                });
                let _ = tx.send(AgentEvent::Done { session_id });
            }
        });
        UnboundedReceiverStream::new(rx)
    }

    /// Run one turn to completion, emitting events along the way.
    #[instrument(skip_all)]
    pub async fn run_turn(
        &self,
        user_message: &str,
        handle: &SessionHandle,
        sink: EventSink<'_>,
    ) -> Result<String> {
        let started = Instant::now();
        // Holding the session lock for the whole turn serializes concurrent
        // requests on the same session.
        let mut session = handle.lock().await;
        session.append_message(Role::User, user_message.to_owned())?;

        let provider = match self.router.select(None) {
            Ok(p) => p.is_available().await.then_some(p),
            Err(_) => None,
        };

        let (reply, provider_label, model) = match provider {
            Some(provider) => {
                maybe_consolidate(&mut session, &provider, &self.settings).await?;
                let reply = self
                    .run_with_provider(user_message, &mut session, &provider, sink)
                    .await?;
                (
                    reply,
                    provider.name().to_owned(),
                    Some(provider.model().to_owned()),
                )
            }
            None => {
                info!("no provider available, using keyword fallback");
                let reply = self
                    .run_with_keywords(user_message, &mut session, sink)
                    .await?;
                (reply, "keyword_fallback".to_owned(), None)
            }
        };

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut record = ActionRecord::new(
            &session.tenant_id,
            &session.id,
            &session.user_id,
            &session.channel,
            ActionKind::ChatResponse,
        );
        record.provider = Some(&provider_label);
        record.model = model.as_deref();
        record.latency_ms = Some(latency_ms);
        let _ = self.audit.log_action(&record)?;

        session.append_message(Role::Assistant, reply.clone())?;
        sink(AgentEvent::Text {
            content: reply.clone(),
        });
        sink(AgentEvent::Done {
            session_id: session.id.clone(),
        });

        counter!("hobot_agent_turns_total", "provider" => provider_label).increment(1);
        histogram!("hobot_agent_turn_latency_ms").record(latency_ms as f64);
        Ok(reply)
    }

    async fn run_with_provider(
        &self,
        user_message: &str,
        session: &mut Session,
        provider: &Arc<dyn ChatProvider>,
        sink: EventSink<'_>,
    ) -> Result<String> {
        let mut messages = self.build_context(session)?;

        // Mapping for one provider round trip; grows as tool results are
        // redacted. One token per identifier for the whole turn, so the model
        // never sees the same patient under two names. Never persisted.
        let mut phi_map: Option<HashMap<String, String>> = None;
        if !provider.phi_safe() {
            let mut combined = HashMap::new();
            for message in &mut messages {
                message.content = phi::redact_with(&message.content, &mut combined);
            }
            phi_map = Some(combined);
        }

        let mut iterations = 0u32;
        let mut state = TurnState::CallProvider;
        loop {
            state = match state {
                TurnState::CallProvider => {
                    if iterations >= self.settings.max_iterations {
                        TurnState::BudgetExhausted
                    } else {
                        iterations += 1;
                        match provider.chat(&messages).await {
                            Ok(mut content) => {
                                if let Some(mapping) = &phi_map {
                                    content = phi::restore(&content, mapping);
                                }
                                match parse_tool_call(&content) {
                                    Some(call) => TurnState::ToolCallParsed { call, content },
                                    None => TurnState::FinalText(content),
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "provider failed mid-turn");
                                TurnState::ProviderLost
                            }
                        }
                    }
                }
                TurnState::ToolCallParsed { call, content } => {
                    if let Some(pid) = call.params["patient_id"].as_str() {
                        let _ = session.active_patients.insert(pid.to_owned());
                    }
                    sink(AgentEvent::ToolCall {
                        tool: call.tool.clone(),
                        status: "started",
                    });
                    let payload = self.execute_tool(&call.tool, &call.params, session).await?;
                    sink(AgentEvent::ToolResult {
                        tool: call.tool.clone(),
                        data: payload.clone(),
                    });

                    messages.push(ChatMessage::transient(Role::Assistant, content));
                    let mut tool_msg =
                        format!("Tool result for {}:\n{}", call.tool, pretty(&payload));
                    if let Some(mapping) = &mut phi_map {
                        tool_msg = phi::redact_with(&tool_msg, mapping);
                    }
                    messages.push(ChatMessage::transient(Role::User, tool_msg));
                    TurnState::CallProvider
                }
                TurnState::FinalText(text) => return Ok(text),
                TurnState::BudgetExhausted => {
                    counter!("hobot_agent_budget_exhausted_total").increment(1);
                    return Ok(BUDGET_MESSAGE.to_owned());
                }
                TurnState::ProviderLost => {
                    return self.run_with_keywords(user_message, session, sink).await;
                }
            };
        }
    }

    /// Deterministic fallback: keyword intent straight to one tool call.
    /// This path never talks to a provider and never redacts.
    async fn run_with_keywords(
        &self,
        user_message: &str,
        session: &mut Session,
        sink: EventSink<'_>,
    ) -> Result<String> {
        let Some((tool, params)) = detect_intent(user_message) else {
            return Ok(HELP_MESSAGE.to_owned());
        };

        if let Some(pid) = params["patient_id"].as_str() {
            let _ = session.active_patients.insert(pid.to_owned());
        }

        sink(AgentEvent::ToolCall {
            tool: tool.to_owned(),
            status: "started",
        });
        let payload = self.execute_tool(tool, &params, session).await?;
        sink(AgentEvent::ToolResult {
            tool: tool.to_owned(),
            data: payload.clone(),
        });

        if let Some(error) = payload["error"].as_str() {
            return Ok(format!("Error from {tool}: {error}"));
        }
        if payload["status"] == "awaiting_confirmation" {
            return Ok(format!(
                "This is a critical action ({tool}) that requires confirmation.\n\
                 Confirmation ID: {}\n{}",
                payload["confirmation_id"].as_str().unwrap_or_default(),
                payload["message"].as_str().unwrap_or_default(),
            ));
        }
        Ok(format!("**{tool}** result:\n```json\n{}\n```", pretty(&payload)))
    }

    /// Dispatch one tool and run the shared post-tool hooks. Tool failures
    /// become error payloads for the model; audit failures abort the turn.
    async fn execute_tool(
        &self,
        tool: &str,
        params: &Value,
        session: &Session,
    ) -> Result<Value> {
        let ctx = CallerContext {
            session_id: session.id.clone(),
            tenant_id: session.tenant_id.clone(),
            user_id: session.user_id.clone(),
            channel: session.channel.clone(),
        };
        let payload = match self.executor.call_tool(tool, params, &ctx).await {
            Ok(outcome) => outcome.into_payload(),
            Err(ToolError::Audit(err)) => return Err(err.into()),
            Err(err) => json!({"error": err.to_string()}),
        };
        self.post_tool_hooks(tool, params, &payload, session)?;
        Ok(payload)
    }

    /// Shared by the provider and keyword paths: store extracted clinical
    /// facts and write the `tool_call` audit entry with a redacted summary.
    fn post_tool_hooks(
        &self,
        tool: &str,
        params: &Value,
        payload: &Value,
        session: &Session,
    ) -> Result<()> {
        let patient_id = params["patient_id"].as_str().unwrap_or_default();
        if !patient_id.is_empty() {
            for (kind, data) in extract_facts(tool, payload) {
                let _ = self.audit.insert_fact(&ClinicalFact {
                    kind,
                    data,
                    patient_id: patient_id.to_owned(),
                    source_tool: tool.to_owned(),
                    session_id: session.id.clone(),
                    tenant_id: session.tenant_id.clone(),
                    recorded_at: chrono::Utc::now().to_rfc3339(),
                })?;
            }
        }

        let summary = phi::redact(&payload_snippet(payload, SUMMARY_MAX)).text;
        let mut record = ActionRecord::new(
            &session.tenant_id,
            &session.id,
            &session.user_id,
            &session.channel,
            ActionKind::ToolCall,
        );
        record.tool_name = Some(tool);
        record.params = Some(params);
        record.result_summary = Some(&summary);
        let _ = self.audit.log_action(&record)?;
        Ok(())
    }

    /// System prompt (tool catalog plus known facts for active patients) and
    /// the recent conversation window.
    fn build_context(&self, session: &Session) -> Result<Vec<ChatMessage>> {
        let mut tool_lines = String::new();
        for descriptor in self.executor.registry().descriptors() {
            tool_lines.push_str("- ");
            tool_lines.push_str(descriptor.name);
            if descriptor.critical {
                tool_lines.push_str(" [CRITICAL]");
            }
            tool_lines.push('\n');
        }
        let mut system = SYSTEM_PROMPT.replace("{tools}", tool_lines.trim_end());

        for patient_id in &session.active_patients {
            let facts = self
                .audit
                .facts_for_patient(patient_id, &session.tenant_id, 10)?;
            if facts.is_empty() {
                continue;
            }
            system.push_str(&format!("\nKnown facts for {patient_id}:\n"));
            for fact in &facts {
                system.push_str(&format!("  - [{}] {}\n", fact.kind.as_str(), fact.data));
            }
        }

        let mut messages = vec![ChatMessage::transient(Role::System, system)];
        messages.extend(session.context(self.settings.context_messages));
        Ok(messages)
    }
}

fn pretty(payload: &Value) -> String {
    serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
