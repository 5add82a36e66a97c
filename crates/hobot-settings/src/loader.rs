//! Layered settings loading: defaults → config file → environment.

use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::errors::Result;
use crate::types::GatewaySettings;

/// Load settings from an optional config file path, with env overrides.
///
/// A missing file is not an error; defaults plus env overrides are used,
/// matching a container started without a mounted config.
pub fn load_settings(path: Option<&Path>) -> Result<GatewaySettings> {
    match path {
        Some(p) if p.exists() => load_settings_from_path(p),
        Some(p) => {
            warn!(path = %p.display(), "settings file not found, using defaults");
            Ok(apply_env_overrides(GatewaySettings::default()))
        }
        None => Ok(apply_env_overrides(GatewaySettings::default())),
    }
}

/// Load settings from a specific file, deep-merged over defaults, then apply
/// env overrides.
pub fn load_settings_from_path(path: &Path) -> Result<GatewaySettings> {
    let raw = std::fs::read_to_string(path)?;
    let file_value: Value = serde_json::from_str(&raw)?;
    let defaults = serde_json::to_value(GatewaySettings::default())?;
    let merged = deep_merge(defaults, file_value);
    let mut settings: GatewaySettings = serde_json::from_value(merged)?;
    resolve_api_key_refs(&mut settings);
    Ok(apply_env_overrides(settings))
}

/// Recursively merge `overlay` onto `base`. Objects merge key-by-key; any
/// other value in the overlay replaces the base value.
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Resolve `${ENV_VAR}` references in provider API keys.
fn resolve_api_key_refs(settings: &mut GatewaySettings) {
    for provider in &mut settings.providers.entries {
        if let Some(var) = provider
            .api_key
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            provider.api_key = std::env::var(var).unwrap_or_default();
        }
    }
}

/// Apply `HOBOT_*` environment overrides (highest priority).
fn apply_env_overrides(mut settings: GatewaySettings) -> GatewaySettings {
    if let Some(port) = env_parse::<u16>("HOBOT_PORT") {
        settings.server.port = port;
    }
    if let Some(threshold) = env_parse::<usize>("HOBOT_CONSOLIDATION_THRESHOLD") {
        settings.agent.consolidation_threshold = threshold;
    }
    if let Some(max) = env_parse::<u32>("HOBOT_MAX_ITERATIONS") {
        settings.agent.max_iterations = max;
    }
    if let Ok(dir) = std::env::var("HOBOT_SESSIONS_DIR") {
        settings.storage.sessions_dir = dir;
    }
    if let Ok(db) = std::env::var("HOBOT_AUDIT_DB") {
        settings.storage.audit_db = db;
    }
    for (var, target) in [
        ("HOBOT_MONITORING_BASE", &mut settings.backends.monitoring),
        ("HOBOT_EHR_BASE", &mut settings.backends.ehr),
        ("HOBOT_LIS_BASE", &mut settings.backends.lis),
        ("HOBOT_PHARMACY_BASE", &mut settings.backends.pharmacy),
        ("HOBOT_RADIOLOGY_BASE", &mut settings.backends.radiology),
        ("HOBOT_BLOODBANK_BASE", &mut settings.backends.bloodbank),
        ("HOBOT_ERP_BASE", &mut settings.backends.erp),
        (
            "HOBOT_PATIENT_SERVICES_BASE",
            &mut settings.backends.patient_services,
        ),
    ] {
        if let Ok(value) = std::env::var(var) {
            *target = value;
        }
    }
    settings
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.parse().ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
