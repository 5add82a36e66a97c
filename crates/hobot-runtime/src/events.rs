//! Turn events shared by the streaming and non-streaming agent paths.

use serde::Serialize;
use serde_json::Value;

/// One event in an agent turn. The streaming endpoint serializes these as
/// SSE data payloads; the non-streaming path drives the same loop with a
/// discarding sink, so both produce identical side effects.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A tool dispatch is starting.
    ToolCall { tool: String, status: &'static str },
    /// A tool finished; `data` is the payload fed back to the model.
    ToolResult { tool: String, data: Value },
    /// Final user-facing text for the turn.
    Text { content: String },
    /// Turn complete.
    Done { session_id: String },
}

/// Event sink driven by the agent loop.
pub type EventSink<'a> = &'a mut (dyn FnMut(AgentEvent) + Send);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = AgentEvent::ToolCall {
            tool: "get_vitals".into(),
            status: "started",
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "tool_call", "tool": "get_vitals", "status": "started"}));

        let done = AgentEvent::Done {
            session_id: "sess_1".into(),
        };
        assert_eq!(
            serde_json::to_value(&done).unwrap(),
            json!({"type": "done", "session_id": "sess_1"})
        );
    }
}
