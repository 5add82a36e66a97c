//! PHI redaction and re-injection for providers not certified to see
//! patient-identifying information.
//!
//! [`redact`] replaces every distinct matched identifier with a fresh opaque
//! token and returns the token→original mapping; [`restore`] re-injects the
//! originals. The mapping is scoped to a single provider round trip and must
//! never be persisted or logged.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Identifier patterns, in match-priority order.
///
/// Order matters: a date of birth also matches the phone pattern, so the
/// DATE rule must claim the value first (dedup is by matched value).
static PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // Patient IDs: P001-style and UHID-prefixed
        (Regex::new(r"\b(P\d{3,})\b").expect("valid regex"), "PATIENT_ID"),
        (Regex::new(r"\b(UHID\d+)\b").expect("valid regex"), "PATIENT_ID"),
        // Medical record numbers
        (Regex::new(r"\b(MRN\d+)\b").expect("valid regex"), "MRN"),
        // Dates of birth: YYYY-MM-DD
        (Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid regex"), "DATE"),
        // Phone numbers, loosely
        (Regex::new(r"\b(\+?\d[\d\-\s]{8,14}\d)\b").expect("valid regex"), "PHONE"),
    ]
});

/// Result of a redaction pass.
#[derive(Clone, Debug, Default)]
pub struct Redaction {
    /// Input text with every matched identifier replaced by its token.
    pub text: String,
    /// Token → original value. Never persist or log this.
    pub mapping: HashMap<String, String>,
}

/// Replace PHI patterns with opaque tokens.
///
/// Every distinct matched value gets exactly one token; all occurrences of
/// that value are replaced. Values already present in the text more than once
/// therefore redact consistently, which keeps the model's view coherent.
#[must_use]
pub fn redact(text: &str) -> Redaction {
    let mut assigned = HashMap::new();
    let found = assign_tokens(text, &mut assigned);

    let mut result = text.to_string();
    let mut mapping = HashMap::new();
    for original in found {
        let token = &assigned[&original];
        result = result.replace(&original, token);
        let _ = mapping.insert(token.clone(), original);
    }
    Redaction { text: result, mapping }
}

/// Redact `text`, reusing tokens from `mapping` for values already seen in
/// this round trip. Fresh values get fresh tokens, added to `mapping`, so the
/// same identifier carries one token across every message of a turn.
#[must_use]
pub fn redact_with(text: &str, mapping: &mut HashMap<String, String>) -> String {
    let mut assigned: HashMap<String, String> = mapping
        .iter()
        .map(|(token, original)| (original.clone(), token.clone()))
        .collect();
    let found = assign_tokens(text, &mut assigned);

    let mut result = text.to_string();
    for original in found {
        let token = assigned[&original].clone();
        result = result.replace(&original, &token);
        let _ = mapping.insert(token, original);
    }
    result
}

/// Scan for identifiers, minting tokens for values not yet in `assigned`
/// (original → token). Returns the distinct values found in `text`, longest
/// first, so an identifier that is a prefix of another cannot corrupt the
/// longer one. Scan first, replace after: replacement must not shift later
/// matches.
fn assign_tokens(text: &str, assigned: &mut HashMap<String, String>) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for (pattern, label) in PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let original = caps[1].to_string();
            if found.contains(&original) {
                continue;
            }
            if !assigned.contains_key(&original) {
                let _ = assigned.insert(original.clone(), fresh_token(label));
            }
            found.push(original);
        }
    }
    found.sort_by_key(|v| std::cmp::Reverse(v.len()));
    found
}

/// Re-inject original values from a redaction mapping.
#[must_use]
pub fn restore(text: &str, mapping: &HashMap<String, String>) -> String {
    let mut result = text.to_string();
    for (token, original) in mapping {
        result = result.replace(token, original);
    }
    result
}

fn fresh_token(label: &str) -> String {
    let suffix: u32 = rand::random::<u32>() & 0x00ff_ffff;
    format!("[{label}_{suffix:06x}]")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn patient_id_redacted_and_restored() {
        let input = "Vitals for P001 look stable. Recheck P001 in an hour.";
        let r = redact(input);
        assert!(!r.text.contains("P001"));
        assert_eq!(r.mapping.len(), 1);
        assert_eq!(restore(&r.text, &r.mapping), input);
    }

    #[test]
    fn repeated_value_gets_single_token() {
        let r = redact("P123 and P123 and P123");
        assert_eq!(r.mapping.len(), 1);
        let token = r.mapping.keys().next().unwrap();
        assert_eq!(r.text.matches(token.as_str()).count(), 3);
    }

    #[test]
    fn distinct_values_get_distinct_tokens() {
        let r = redact("Compare P001 against P002.");
        assert_eq!(r.mapping.len(), 2);
        let originals: Vec<_> = r.mapping.values().cloned().collect();
        assert!(originals.contains(&"P001".to_string()));
        assert!(originals.contains(&"P002".to_string()));
    }

    #[test]
    fn all_pattern_kinds_matched() {
        let input = "P001 MRN55501 born 1985-03-12, phone +1 555-010-4477";
        let r = redact(input);
        assert!(!r.text.contains("P001"));
        assert!(!r.text.contains("MRN55501"));
        assert!(!r.text.contains("1985-03-12"));
        assert!(!r.text.contains("555-010-4477"));
        assert_eq!(restore(&r.text, &r.mapping), input);
    }

    #[test]
    fn uhid_counts_as_patient_id() {
        let r = redact("Record UHID88123 admitted.");
        let token = r.mapping.keys().next().unwrap();
        assert!(token.starts_with("[PATIENT_ID_"));
    }

    #[test]
    fn date_claims_value_before_phone_pattern() {
        // "1985-03-12" also satisfies the phone regex; the DATE rule wins.
        let r = redact("DOB 1985-03-12");
        let token = r.mapping.keys().next().unwrap();
        assert!(token.starts_with("[DATE_"), "got token {token}");
    }

    #[test]
    fn prefix_identifiers_do_not_corrupt_each_other() {
        let input = "P100 differs from P1001";
        let r = redact(input);
        assert_eq!(r.mapping.len(), 2);
        assert_eq!(restore(&r.text, &r.mapping), input);
    }

    #[test]
    fn text_without_phi_passes_through() {
        let r = redact("list all wards");
        assert_eq!(r.text, "list all wards");
        assert!(r.mapping.is_empty());
    }

    #[test]
    fn restore_with_empty_mapping_is_identity() {
        assert_eq!(restore("no tokens here", &HashMap::new()), "no tokens here");
    }

    #[test]
    fn redact_with_keeps_tokens_stable_across_messages() {
        let mut mapping = HashMap::new();
        let first = redact_with("Vitals requested for P001.", &mut mapping);
        let second = redact_with("Tool result: P001 stable, compare with P002.", &mut mapping);

        let token = mapping
            .iter()
            .find(|(_, original)| original.as_str() == "P001")
            .map(|(token, _)| token.clone())
            .unwrap();
        assert!(first.contains(&token));
        assert!(second.contains(&token));
        assert!(!second.contains("P001"));
        assert_eq!(mapping.len(), 2);
    }

    proptest! {
        /// restore(redact(T)) == T for text with embedded identifiers.
        /// Separators guarantee the word boundaries the patterns require.
        #[test]
        fn redact_restore_roundtrip(
            prefix in "[a-zA-Z ,.]{0,30}",
            pid in 100u32..10_000,
            mrn in 1000u32..100_000,
            middle in "[a-zA-Z ,.]{0,30}",
        ) {
            let input = format!("{prefix} P{pid} with MRN{mrn} {middle}");
            let needle = format!("P{pid}");
            let r = redact(&input);
            prop_assert!(!r.text.contains(&needle));
            prop_assert_eq!(restore(&r.text, &r.mapping), input);
        }
    }
}
