//! Keyword intent fallback.
//!
//! When no provider is reachable the gateway still answers a fixed set of
//! phrasings by pattern-matching the message straight to one tool call.
//! Patterns are ordered most-specific first so "vitals history" is not
//! swallowed by the plain "vitals" rule.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Value, json};

type Extract = fn(&Captures<'_>) -> Value;

struct IntentRule {
    pattern: Regex,
    tool: &'static str,
    extract: Extract,
}

fn rule(pattern: &str, tool: &'static str, extract: Extract) -> IntentRule {
    IntentRule {
        pattern: Regex::new(pattern).expect("valid regex"),
        tool,
        extract,
    }
}

fn patient_arg(caps: &Captures<'_>) -> Value {
    json!({"patient_id": &caps[1]})
}

fn no_args(_caps: &Captures<'_>) -> Value {
    json!({})
}

static RULES: LazyLock<Vec<IntentRule>> = LazyLock::new(|| {
    vec![
        rule(r"(?i)vitals?\s+history\s+(?:for\s+)?(\w+)", "get_vitals_history", patient_arg),
        rule(r"(?i)vitals?\s+(?:for\s+)?(\w+)", "get_vitals", patient_arg),
        rule(r"(?i)medications?\s+(?:for\s+)?(\w+)", "get_medications", patient_arg),
        rule(r"(?i)allergies\s+(?:for\s+)?(\w+)", "get_allergies", patient_arg),
        rule(r"(?i)lab\s+results?\s+(?:for\s+)?(\w+)", "get_lab_results", patient_arg),
        rule(
            r"(?i)patient\s+(?:info|details?|record)?\s*(?:for\s+)?(\w+)",
            "get_patient",
            patient_arg,
        ),
        rule(r"(?i)(?:list|show)\s+wards?", "list_wards", no_args),
        rule(r"(?i)(?:list|show)\s+doctors?", "list_doctors", no_args),
        rule(r"(?i)ward\s+patients?\s+(?:for\s+)?(\w+)", "get_ward_patients", |caps| {
            json!({"ward_id": &caps[1]})
        }),
        rule(r"(?i)doctor\s+patients?\s+(?:for\s+)?(\w+)", "get_doctor_patients", |caps| {
            json!({"doctor_id": &caps[1]})
        }),
        rule(r"(?i)blood\s+availability", "get_blood_availability", no_args),
        rule(r"(?i)inventory", "get_inventory", no_args),
        rule(r"(?i)studies\s+(?:for\s+)?(\w+)", "get_studies", patient_arg),
        rule(r"(?i)code\s+blue\s+(?:for\s+)?(\w+)", "initiate_code_blue", patient_arg),
        rule(r"(?i)escalate\s+(\w+)\s+(?:to\s+)?(.+)", "escalate", |caps| {
            json!({
                "patient_id": &caps[1],
                "escalate_to": caps[2].trim(),
                "reason": "User-requested escalation",
            })
        }),
    ]
});

/// Map a message to a tool call by keyword, if any rule matches.
#[must_use]
pub fn detect_intent(message: &str) -> Option<(&'static str, Value)> {
    RULES.iter().find_map(|rule| {
        rule.pattern
            .captures(message)
            .map(|caps| (rule.tool, (rule.extract)(&caps)))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
