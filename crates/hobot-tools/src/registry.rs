//! Closed tool registry.
//!
//! Every tool the gateway can execute is declared here as a descriptor:
//! backend, HTTP method, path template, parameter schema, and criticality.
//! The registry is validated once at load (placeholders must be declared
//! required params, patterns must compile); dispatch never resolves a tool
//! name that is not in this table.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

use hobot_settings::BackendSettings;

/// Error building the registry. Any variant is a programming error in the
/// catalog, caught at startup rather than mid-dispatch.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{tool}': invalid pattern for param '{param}': {source}")]
    BadPattern {
        tool: &'static str,
        param: &'static str,
        source: regex::Error,
    },

    #[error("tool '{tool}': path placeholder '{{{placeholder}}}' is not a declared required param")]
    UndeclaredPlaceholder {
        tool: &'static str,
        placeholder: String,
    },

    #[error("duplicate tool name '{0}'")]
    Duplicate(&'static str),
}

/// Which hospital system serves a tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Monitoring,
    Ehr,
    Lis,
    Pharmacy,
    Radiology,
    BloodBank,
    Erp,
    PatientServices,
}

impl Backend {
    /// Configured base URL for this backend.
    #[must_use]
    pub fn base_url<'a>(self, settings: &'a BackendSettings) -> &'a str {
        match self {
            Backend::Monitoring => &settings.monitoring,
            Backend::Ehr => &settings.ehr,
            Backend::Lis => &settings.lis,
            Backend::Pharmacy => &settings.pharmacy,
            Backend::Radiology => &settings.radiology,
            Backend::BloodBank => &settings.bloodbank,
            Backend::Erp => &settings.erp,
            Backend::PatientServices => &settings.patient_services,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Monitoring => "monitoring",
            Backend::Ehr => "ehr",
            Backend::Lis => "lis",
            Backend::Pharmacy => "pharmacy",
            Backend::Radiology => "radiology",
            Backend::BloodBank => "bloodbank",
            Backend::Erp => "erp",
            Backend::PatientServices => "patient_services",
        }
    }
}

/// HTTP method for a backend tool. GET dispatches participate in the
/// degraded-mode cache; POST dispatches never serve stale data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Expected parameter type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
}

/// Validation rules for one parameter.
#[derive(Debug)]
pub struct ParamRule {
    pub name: &'static str,
    pub required: bool,
    pub param_type: ParamType,
    pub one_of: Option<&'static [&'static str]>,
    pub pattern: Option<Regex>,
}

/// How a tool executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
    /// HTTP call to a hospital backend.
    Backend {
        backend: Backend,
        method: Method,
        path: &'static str,
    },
    /// Handled inside the gateway: logs an escalation, calls no backend.
    Escalate,
}

/// One registered tool.
#[derive(Debug)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub kind: ToolKind,
    pub critical: bool,
    pub params: Vec<ParamRule>,
}

impl ToolDescriptor {
    /// Validate `params` against this descriptor's schema.
    ///
    /// Collects every violation rather than stopping at the first, so the
    /// model (or human) can fix the whole call in one pass.
    #[must_use]
    pub fn validate(&self, params: &serde_json::Value) -> Vec<String> {
        let mut violations = Vec::new();
        for rule in &self.params {
            let value = params.get(rule.name);
            let Some(value) = value.filter(|v| !v.is_null()) else {
                if rule.required {
                    violations.push(format!("missing required param '{}'", rule.name));
                }
                continue;
            };
            match rule.param_type {
                ParamType::String if !value.is_string() => {
                    violations.push(format!("'{}' must be a string", rule.name));
                }
                ParamType::Number if !value.is_number() => {
                    violations.push(format!("'{}' must be a number", rule.name));
                }
                _ => {}
            }
            if let Some(allowed) = rule.one_of
                && let Some(s) = value.as_str()
                && !allowed.contains(&s)
            {
                violations.push(format!("'{}' must be one of {allowed:?}", rule.name));
            }
            if let Some(pattern) = &rule.pattern
                && let Some(s) = value.as_str()
                && !pattern.is_match(s)
            {
                violations.push(format!(
                    "'{}' does not match pattern '{}'",
                    rule.name,
                    pattern.as_str()
                ));
            }
        }
        violations
    }
}

/// The closed registry.
pub struct Registry {
    tools: HashMap<&'static str, ToolDescriptor>,
    order: Vec<&'static str>,
}

impl Registry {
    /// Build and verify the full catalog.
    pub fn load() -> Result<Self, RegistryError> {
        let mut tools = HashMap::new();
        let mut order = Vec::new();
        for descriptor in catalog()? {
            let name = descriptor.name;
            verify_placeholders(&descriptor)?;
            if tools.insert(name, descriptor).is_some() {
                return Err(RegistryError::Duplicate(name));
            }
            order.push(name);
        }
        Ok(Self { tools, order })
    }

    /// Look up a descriptor.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Tool names in catalog order.
    #[must_use]
    pub fn names(&self) -> &[&'static str] {
        &self.order
    }

    /// All descriptors in catalog order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }
}

fn verify_placeholders(descriptor: &ToolDescriptor) -> Result<(), RegistryError> {
    let ToolKind::Backend { path, .. } = descriptor.kind else {
        return Ok(());
    };
    for placeholder in crate::dispatch::placeholders(path) {
        let declared = descriptor
            .params
            .iter()
            .any(|rule| rule.name == placeholder && rule.required);
        if !declared {
            return Err(RegistryError::UndeclaredPlaceholder {
                tool: descriptor.name,
                placeholder: placeholder.to_owned(),
            });
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

const BLOOD_TYPES: &[&str] = &["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];

/// Patient identifiers accepted by backends.
const PATIENT_ID_PATTERN: &str = r"^(?:P\d{3,}|UHID\d+)$";

struct RuleSpec {
    name: &'static str,
    required: bool,
    param_type: ParamType,
    one_of: Option<&'static [&'static str]>,
    pattern: Option<&'static str>,
}

fn required_str(name: &'static str) -> RuleSpec {
    RuleSpec {
        name,
        required: true,
        param_type: ParamType::String,
        one_of: None,
        pattern: None,
    }
}

fn optional_str(name: &'static str) -> RuleSpec {
    RuleSpec {
        required: false,
        ..required_str(name)
    }
}

fn patient_id() -> RuleSpec {
    RuleSpec {
        pattern: Some(PATIENT_ID_PATTERN),
        ..required_str("patient_id")
    }
}

fn build(
    tool: &'static str,
    kind: ToolKind,
    critical: bool,
    rules: Vec<RuleSpec>,
) -> Result<ToolDescriptor, RegistryError> {
    let mut params = Vec::with_capacity(rules.len());
    for spec in rules {
        let pattern = match spec.pattern {
            Some(raw) => Some(Regex::new(raw).map_err(|source| RegistryError::BadPattern {
                tool,
                param: spec.name,
                source,
            })?),
            None => None,
        };
        params.push(ParamRule {
            name: spec.name,
            required: spec.required,
            param_type: spec.param_type,
            one_of: spec.one_of,
            pattern,
        });
    }
    Ok(ToolDescriptor {
        name: tool,
        kind,
        critical,
        params,
    })
}

fn get(backend: Backend, path: &'static str) -> ToolKind {
    ToolKind::Backend {
        backend,
        method: Method::Get,
        path,
    }
}

fn post(backend: Backend, path: &'static str) -> ToolKind {
    ToolKind::Backend {
        backend,
        method: Method::Post,
        path,
    }
}

#[allow(clippy::too_many_lines)]
fn catalog() -> Result<Vec<ToolDescriptor>, RegistryError> {
    use Backend::{BloodBank, Ehr, Erp, Lis, Monitoring, PatientServices, Pharmacy, Radiology};
    Ok(vec![
        // ── Monitoring ──
        build(
            "get_vitals",
            get(Monitoring, "/vitals/{patient_id}"),
            false,
            vec![patient_id()],
        )?,
        build(
            "get_vitals_history",
            get(Monitoring, "/vitals/{patient_id}/history"),
            false,
            vec![patient_id()],
        )?,
        build("list_wards", get(Monitoring, "/wards"), false, vec![])?,
        build("list_doctors", get(Monitoring, "/doctors"), false, vec![])?,
        build(
            "get_ward_patients",
            get(Monitoring, "/wards/{ward_id}/patients"),
            false,
            vec![required_str("ward_id")],
        )?,
        build(
            "get_doctor_patients",
            get(Monitoring, "/doctors/{doctor_id}/patients"),
            false,
            vec![required_str("doctor_id")],
        )?,
        build(
            "get_patient_events",
            get(Monitoring, "/patients/{patient_id}/events"),
            false,
            vec![
                patient_id(),
                RuleSpec {
                    param_type: ParamType::Number,
                    ..optional_str("hours")
                },
            ],
        )?,
        build(
            "get_event_vitals",
            get(Monitoring, "/events/{event_id}/vitals"),
            false,
            vec![required_str("event_id")],
        )?,
        build(
            "get_event_ecg",
            get(Monitoring, "/events/{event_id}/ecg"),
            false,
            vec![required_str("event_id")],
        )?,
        build(
            "initiate_code_blue",
            post(Monitoring, "/code-blue"),
            true,
            vec![patient_id(), optional_str("location")],
        )?,
        // ── EHR ──
        build(
            "get_patient",
            get(Ehr, "/fhir/Patient?identifier={patient_id}"),
            false,
            vec![patient_id()],
        )?,
        build(
            "get_medications",
            get(Ehr, "/fhir/MedicationRequest?patient={patient_id}"),
            false,
            vec![patient_id()],
        )?,
        build(
            "get_allergies",
            get(Ehr, "/fhir/AllergyIntolerance?patient={patient_id}"),
            false,
            vec![patient_id()],
        )?,
        build(
            "get_orders",
            get(Ehr, "/fhir/ServiceRequest?patient={patient_id}"),
            false,
            vec![patient_id()],
        )?,
        build(
            "write_order",
            post(Ehr, "/fhir/ServiceRequest"),
            true,
            vec![patient_id(), required_str("order_type"), optional_str("notes")],
        )?,
        // ── Radiology ──
        build(
            "get_studies",
            get(Radiology, "/dicom-web/studies?PatientID={patient_id}"),
            false,
            vec![patient_id()],
        )?,
        build(
            "get_report",
            get(Radiology, "/dicom-web/studies/{study_id}/report"),
            false,
            vec![required_str("study_id")],
        )?,
        build(
            "get_latest_study",
            get(Radiology, "/dicom-web/studies?PatientID={patient_id}&limit=1"),
            false,
            vec![patient_id()],
        )?,
        // ── LIS ──
        build(
            "get_lab_results",
            get(Lis, "/results/{patient_id}"),
            false,
            vec![patient_id()],
        )?,
        build(
            "get_lab_order",
            get(Lis, "/orders/{order_id}"),
            false,
            vec![required_str("order_id")],
        )?,
        build(
            "order_lab",
            post(Lis, "/orders"),
            false,
            vec![patient_id(), required_str("test_code")],
        )?,
        build(
            "get_order_status",
            get(Lis, "/orders/{order_id}/status"),
            false,
            vec![required_str("order_id")],
        )?,
        // ── Pharmacy ──
        build(
            "check_drug_interactions",
            post(Pharmacy, "/interactions"),
            false,
            vec![patient_id(), required_str("medication")],
        )?,
        build(
            "dispense_medication",
            post(Pharmacy, "/dispense"),
            true,
            vec![patient_id(), required_str("medication"), optional_str("dose")],
        )?,
        // ── Blood bank ──
        build(
            "get_blood_availability",
            get(BloodBank, "/availability"),
            false,
            vec![RuleSpec {
                one_of: Some(BLOOD_TYPES),
                ..optional_str("blood_type")
            }],
        )?,
        build(
            "order_blood_crossmatch",
            post(BloodBank, "/crossmatch"),
            true,
            vec![
                patient_id(),
                RuleSpec {
                    one_of: Some(BLOOD_TYPES),
                    ..required_str("blood_type")
                },
                RuleSpec {
                    param_type: ParamType::Number,
                    ..optional_str("units")
                },
            ],
        )?,
        build(
            "get_crossmatch_status",
            get(BloodBank, "/crossmatch/{request_id}"),
            false,
            vec![required_str("request_id")],
        )?,
        // ── ERP ──
        build(
            "get_inventory",
            get(Erp, "/inventory"),
            false,
            vec![optional_str("category")],
        )?,
        build(
            "get_equipment_status",
            get(Erp, "/equipment/{equipment_id}"),
            false,
            vec![required_str("equipment_id")],
        )?,
        build(
            "place_supply_order",
            post(Erp, "/supply-order"),
            false,
            vec![
                required_str("item"),
                RuleSpec {
                    param_type: ParamType::Number,
                    ..required_str("quantity")
                },
            ],
        )?,
        // ── Patient services ──
        build(
            "request_housekeeping",
            post(PatientServices, "/housekeeping"),
            false,
            vec![
                required_str("location"),
                RuleSpec {
                    one_of: Some(&["routine", "urgent"]),
                    ..optional_str("priority")
                },
            ],
        )?,
        build(
            "order_diet",
            post(PatientServices, "/diet-order"),
            false,
            vec![patient_id(), required_str("diet_type")],
        )?,
        build(
            "request_ambulance",
            post(PatientServices, "/transport"),
            true,
            vec![patient_id(), required_str("destination")],
        )?,
        build(
            "get_request_status",
            get(PatientServices, "/request/{request_id}"),
            false,
            vec![required_str("request_id")],
        )?,
        // ── Gateway-level ──
        build(
            "escalate",
            ToolKind::Escalate,
            false,
            vec![
                optional_str("patient_id"),
                optional_str("reason"),
                optional_str("escalate_to"),
            ],
        )?,
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
