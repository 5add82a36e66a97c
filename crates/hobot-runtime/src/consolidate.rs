//! Rolling-summary consolidation of long session histories.

use std::sync::Arc;

use tracing::{instrument, warn};

use hobot_core::messages::{ChatMessage, Role};
use hobot_llm::ChatProvider;
use hobot_settings::AgentSettings;

use crate::errors::SessionResult;
use crate::session::Session;

const CONSOLIDATION_PROMPT: &str = "Summarize this clinical conversation history concisely.
Preserve: patient IDs, diagnoses, key vitals, medications, pending actions, and clinical decisions.
If there is an existing summary, integrate new information into it.

Existing summary: {existing_summary}

Messages to consolidate:
{messages}

Provide a concise clinical summary:";

/// Fold old messages into the rolling summary once the unconsolidated count
/// reaches the threshold. The most recent `retain_recent` messages stay
/// verbatim. When the provider cannot summarize, the prior summary is kept
/// rather than losing folded content.
#[instrument(skip_all, fields(session = %session.id))]
pub async fn maybe_consolidate(
    session: &mut Session,
    provider: &Arc<dyn ChatProvider>,
    settings: &AgentSettings,
) -> SessionResult<()> {
    if session.unconsolidated() < settings.consolidation_threshold {
        return Ok(());
    }
    let fold_end = session.messages.len().saturating_sub(settings.retain_recent);
    if fold_end <= session.last_consolidated {
        return Ok(());
    }

    let to_fold = &session.messages[session.last_consolidated..fold_end];
    let mut summary = session.summary.clone();
    match provider
        .chat(&[ChatMessage::transient(
            Role::User,
            render_prompt(&session.summary, to_fold),
        )])
        .await
    {
        Ok(fresh) if !fresh.is_empty() => summary = fresh,
        Ok(_) => {}
        Err(err) => {
            warn!(error = %err, "consolidation summary failed, keeping prior summary");
        }
    }

    session.save_consolidation(summary, fold_end)
}

fn render_prompt(existing_summary: &str, messages: &[ChatMessage]) -> String {
    let rendered: Vec<String> = messages
        .iter()
        .map(|m| format!("[{}] {}", m.role.as_str(), m.content))
        .collect();
    CONSOLIDATION_PROMPT
        .replace(
            "{existing_summary}",
            if existing_summary.is_empty() {
                "(none)"
            } else {
                existing_summary
            },
        )
        .replace("{messages}", &rendered.join("\n"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
