//! Wire-format helpers shared by provider implementations.

use serde_json::{Value, json};

use hobot_core::messages::ChatMessage;

/// Convert history to the `[{role, content}]` shape both provider APIs use.
/// Timestamps are session bookkeeping and never leave the gateway.
#[must_use]
pub fn wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect()
}
