//! Clinical fact types: structured, patient-scoped data extracted from tool
//! results.
//!
//! Facts are append-only: they are never mutated or deleted, and are used
//! only to enrich future prompt context for patients active in a session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of a clinical fact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Vitals,
    Medication,
    Allergy,
    LabResult,
    LabOrder,
    Demographics,
    Order,
    ImagingStudy,
    RadiologyReport,
    BloodInventory,
    Crossmatch,
}

impl FactKind {
    /// Stable name used in storage and prompt context.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FactKind::Vitals => "vitals",
            FactKind::Medication => "medication",
            FactKind::Allergy => "allergy",
            FactKind::LabResult => "lab_result",
            FactKind::LabOrder => "lab_order",
            FactKind::Demographics => "demographics",
            FactKind::Order => "order",
            FactKind::ImagingStudy => "imaging_study",
            FactKind::RadiologyReport => "radiology_report",
            FactKind::BloodInventory => "blood_inventory",
            FactKind::Crossmatch => "crossmatch",
        }
    }
}

/// A typed, patient-scoped datum with provenance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClinicalFact {
    /// Fact category.
    pub kind: FactKind,
    /// The datum itself (backend payload fragment).
    pub data: Value,
    /// Patient the fact belongs to.
    pub patient_id: String,
    /// Tool that produced the fact.
    pub source_tool: String,
    /// Session in which the fact was observed.
    pub session_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// ISO 8601 observation time (UTC).
    pub recorded_at: String,
}

/// Extract clinical facts from a tool result.
///
/// Each supported read tool has a fixed extraction rule; tools without a rule
/// (or results without a patient) yield nothing. Returned pairs are
/// `(kind, data)`; the caller supplies provenance.
#[must_use]
pub fn extract_facts(tool_name: &str, result: &Value) -> Vec<(FactKind, Value)> {
    match tool_name {
        "get_vitals" | "get_vitals_history" => extract_vitals(result),
        "get_medications" => extract_list(result, "medications", FactKind::Medication),
        "get_allergies" => extract_list(result, "allergies", FactKind::Allergy),
        "get_lab_results" => extract_list(result, "results", FactKind::LabResult),
        "get_lab_order" => vec![(FactKind::LabOrder, result.clone())],
        "get_patient" => vec![(FactKind::Demographics, result.clone())],
        "get_orders" => extract_list(result, "orders", FactKind::Order),
        "get_studies" | "get_latest_study" => {
            extract_list(result, "studies", FactKind::ImagingStudy)
        }
        "get_report" => vec![(FactKind::RadiologyReport, result.clone())],
        "get_blood_availability" => vec![(FactKind::BloodInventory, result.clone())],
        "get_crossmatch_status" => vec![(FactKind::Crossmatch, result.clone())],
        _ => Vec::new(),
    }
}

/// Vitals results are either a single snapshot or a `history` list.
fn extract_vitals(result: &Value) -> Vec<(FactKind, Value)> {
    let mut facts = Vec::new();
    if result.get("heart_rate").is_some() || result.get("bp_systolic").is_some() {
        facts.push((FactKind::Vitals, result.clone()));
    }
    if let Some(history) = result.get("history").and_then(Value::as_array) {
        for entry in history {
            facts.push((FactKind::Vitals, entry.clone()));
        }
    }
    facts
}

/// Generic extractor for list-valued results (medications, allergies, etc.).
///
/// Falls back to the FHIR-style `entry` array, then to the whole payload.
fn extract_list(result: &Value, key: &str, kind: FactKind) -> Vec<(FactKind, Value)> {
    let items = result
        .get(key)
        .or_else(|| result.get("entry"))
        .and_then(Value::as_array);
    match items {
        Some(list) => list.iter().map(|item| (kind, item.clone())).collect(),
        None => vec![(kind, result.clone())],
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vitals_snapshot_yields_one_fact() {
        let result = json!({"heart_rate": 72, "bp_systolic": 120, "spo2": 98});
        let facts = extract_facts("get_vitals", &result);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].0, FactKind::Vitals);
    }

    #[test]
    fn vitals_history_yields_one_fact_per_entry() {
        let result = json!({"history": [
            {"heart_rate": 70}, {"heart_rate": 75}, {"heart_rate": 80}
        ]});
        let facts = extract_facts("get_vitals_history", &result);
        assert_eq!(facts.len(), 3);
        assert!(facts.iter().all(|(k, _)| *k == FactKind::Vitals));
    }

    #[test]
    fn medications_extracted_from_list() {
        let result = json!({"medications": [{"name": "metformin"}, {"name": "aspirin"}]});
        let facts = extract_facts("get_medications", &result);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].0, FactKind::Medication);
        assert_eq!(facts[0].1["name"], "metformin");
    }

    #[test]
    fn fhir_entry_fallback() {
        let result = json!({"entry": [{"resource": {"code": "penicillin"}}]});
        let facts = extract_facts("get_allergies", &result);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].0, FactKind::Allergy);
    }

    #[test]
    fn scalar_result_stored_whole() {
        let result = json!({"status": "no known allergies"});
        let facts = extract_facts("get_allergies", &result);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].1, result);
    }

    #[test]
    fn unknown_tool_yields_nothing() {
        let result = json!({"anything": true});
        assert!(extract_facts("place_supply_order", &result).is_empty());
        assert!(extract_facts("initiate_code_blue", &result).is_empty());
    }

    #[test]
    fn fact_kind_names_are_snake_case() {
        assert_eq!(FactKind::LabResult.as_str(), "lab_result");
        assert_eq!(
            serde_json::to_string(&FactKind::ImagingStudy).unwrap(),
            "\"imaging_study\""
        );
    }

    #[test]
    fn clinical_fact_serde_roundtrip() {
        let fact = ClinicalFact {
            kind: FactKind::Vitals,
            data: json!({"heart_rate": 88}),
            patient_id: "P001".into(),
            source_tool: "get_vitals".into(),
            session_id: "sess_1".into(),
            tenant_id: "default".into(),
            recorded_at: "2026-08-24T10:00:00Z".into(),
        };
        let json = serde_json::to_string(&fact).unwrap();
        let back: ClinicalFact = serde_json::from_str(&json).unwrap();
        assert_eq!(fact, back);
    }
}
