//! Settings schema: server, agent, providers, backends, and storage.

use serde::{Deserialize, Serialize};

/// Top-level gateway settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Agent-loop knobs.
    pub agent: AgentSettings,
    /// LLM provider registry.
    pub providers: ProvidersSettings,
    /// Backend base URLs, one per hospital system.
    pub backends: BackendSettings,
    /// Storage paths.
    pub storage: StorageSettings,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            agent: AgentSettings::default(),
            providers: ProvidersSettings::default(),
            backends: BackendSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Listen port for the gateway API.
    pub port: u16,
    /// Bind address.
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8090,
            bind: "0.0.0.0".into(),
        }
    }
}

/// Agent-loop knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Maximum provider iterations per turn before the step budget message.
    pub max_iterations: u32,
    /// Unconsolidated-message count that triggers consolidation.
    pub consolidation_threshold: usize,
    /// Most recent messages kept verbatim (never consolidated).
    pub retain_recent: usize,
    /// Recent messages included when building provider context.
    pub context_messages: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            consolidation_threshold: 30,
            retain_recent: 10,
            context_messages: 10,
        }
    }
}

/// Provider registry settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersSettings {
    /// Name of the default provider, if any.
    pub default: Option<String>,
    /// Registered providers, in registration order.
    pub entries: Vec<ProviderSettings>,
}

/// Wire protocol a provider speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Ollama-native `/api/chat`.
    Ollama,
    /// OpenAI-compatible `/v1/chat/completions`.
    OpenaiCompatible,
}

/// One LLM provider entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    /// Provider name (selection key).
    pub name: String,
    /// Wire protocol.
    pub kind: ProviderKind,
    /// Base URL, e.g. `http://ollama:11434`.
    pub base_url: String,
    /// API key. `${ENV_VAR}` references are resolved at load time.
    #[serde(default)]
    pub api_key: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Whether this provider is certified to receive PHI unredacted.
    #[serde(default)]
    pub phi_safe: bool,
    /// Chat request timeout in seconds.
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    60
}

/// Base URLs for the eight hospital backends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    pub monitoring: String,
    pub ehr: String,
    pub lis: String,
    pub pharmacy: String,
    pub radiology: String,
    pub bloodbank: String,
    pub erp: String,
    pub patient_services: String,
    /// Backend request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            monitoring: "http://synthetic-monitoring:8000".into(),
            ehr: "http://synthetic-ehr:8080".into(),
            lis: "http://synthetic-lis:8000".into(),
            pharmacy: "http://synthetic-pharmacy:8000".into(),
            radiology: "http://synthetic-radiology:8042".into(),
            bloodbank: "http://synthetic-bloodbank:8000".into(),
            erp: "http://synthetic-erp:8000".into(),
            patient_services: "http://synthetic-patient-services:8000".into(),
            timeout_secs: 15,
        }
    }
}

/// Storage paths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Directory holding per-session JSONL event logs.
    pub sessions_dir: String,
    /// SQLite file for the audit log and clinical facts.
    pub audit_db: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sessions_dir: "/data/sessions".into(),
            audit_db: "/data/audit/clinic.db".into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
