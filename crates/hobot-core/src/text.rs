//! UTF-8–safe snippet helpers for audit summaries and staged-action messages.
//!
//! Byte-indexed truncation panics mid-character in Rust; these helpers snap
//! to the nearest char boundary so clipping backend payloads is always safe.

use serde_json::Value;

/// Longest prefix of `s` with byte length ≤ `max_bytes` on a char boundary.
#[inline]
#[must_use]
pub fn clip_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Compact one-line summary of a JSON payload, clipped to `max_bytes`.
///
/// Used for audit `result_summary` fields; long payloads are clipped, never
/// stored whole.
#[must_use]
pub fn payload_snippet(payload: &Value, max_bytes: usize) -> String {
    let rendered = payload.to_string();
    if rendered.len() <= max_bytes {
        return rendered;
    }
    clip_utf8(&rendered, max_bytes).to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
