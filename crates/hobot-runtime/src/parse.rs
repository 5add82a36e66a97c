//! Tool-call extraction from model output.
//!
//! Model text is an unreliable external protocol. The expected grammar is a
//! JSON object `{"tool": ..., "params": {...}}`, either inside a ```json
//! fence or inline. Candidates are parsed with a stream deserializer so
//! nested braces and trailing prose cannot truncate the object; the first
//! well-formed match wins. Anything that fails to parse is treated as final
//! text for the user, never as an error.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("valid regex"));
static INLINE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{\s*"tool"\s*:"#).expect("valid regex"));

/// A parsed tool invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub params: Value,
}

/// Extract a tool call from model output, if one is present.
#[must_use]
pub fn parse_tool_call(content: &str) -> Option<ToolCall> {
    // Fenced blocks first: the explicit form the system prompt asks for.
    for caps in FENCE.captures_iter(content) {
        if let Some(m) = caps.get(1)
            && let Some(call) = tool_call_at(m.as_str().trim_start())
        {
            return Some(call);
        }
    }
    // Then bare objects anywhere in the text.
    for m in INLINE_START.find_iter(content) {
        if let Some(call) = tool_call_at(&content[m.start()..]) {
            return Some(call);
        }
    }
    None
}

/// Parse one JSON value at the start of `s`, ignoring whatever follows.
fn tool_call_at(s: &str) -> Option<ToolCall> {
    let mut stream = serde_json::Deserializer::from_str(s).into_iter::<Value>();
    let data = stream.next()?.ok()?;
    let tool = data["tool"].as_str()?;
    let params = data
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    Some(ToolCall {
        tool: tool.to_owned(),
        params,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_block_parses() {
        let content = "Let me check.\n```json\n{\"tool\": \"get_vitals\", \"params\": {\"patient_id\": \"P001\"}}\n```";
        let call = parse_tool_call(content).unwrap();
        assert_eq!(call.tool, "get_vitals");
        assert_eq!(call.params, json!({"patient_id": "P001"}));
    }

    #[test]
    fn inline_object_with_nested_params_parses() {
        let content = r#"I'll run {"tool": "dispense_medication", "params": {"patient_id": "P001", "medication": "morphine"}} now."#;
        let call = parse_tool_call(content).unwrap();
        assert_eq!(call.tool, "dispense_medication");
        assert_eq!(call.params["medication"], "morphine");
    }

    #[test]
    fn missing_params_defaults_to_empty_object() {
        let content = r#"{"tool": "list_doctors"}"#;
        let call = parse_tool_call(content).unwrap();
        assert_eq!(call.params, json!({}));
    }

    #[test]
    fn plain_text_is_final() {
        assert!(parse_tool_call("Heart rate is 72 bpm, within normal range.").is_none());
    }

    #[test]
    fn malformed_json_is_final_text_not_error() {
        let content = "```json\n{\"tool\": \"get_vitals\", params: oops}\n```";
        assert!(parse_tool_call(content).is_none());
    }

    #[test]
    fn json_without_tool_key_is_ignored() {
        let content = "```json\n{\"vitals\": {\"heart_rate\": 72}}\n```";
        assert!(parse_tool_call(content).is_none());
    }

    #[test]
    fn first_well_formed_match_wins() {
        let content = concat!(
            "```json\n{\"tool\": \"get_vitals\", \"params\": {\"patient_id\": \"P001\"}}\n```\n",
            "```json\n{\"tool\": \"get_medications\", \"params\": {\"patient_id\": \"P001\"}}\n```",
        );
        assert_eq!(parse_tool_call(content).unwrap().tool, "get_vitals");
    }

    #[test]
    fn malformed_fence_falls_through_to_inline() {
        let content = concat!(
            "```json\n{broken\n```\n",
            "then {\"tool\": \"get_allergies\", \"params\": {\"patient_id\": \"P002\"}} inline",
        );
        assert_eq!(parse_tool_call(content).unwrap().tool, "get_allergies");
    }

    #[test]
    fn trailing_prose_after_object_is_ignored() {
        let content = "{\"tool\": \"list_wards\"} Fetching the ward list for you.";
        assert_eq!(parse_tool_call(content).unwrap().tool, "list_wards");
    }
}
