//! Shared application state and bootstrap wiring.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tracing::info;

use hobot_audit::AuditStore;
use hobot_llm::ProviderRouter;
use hobot_runtime::{AgentEngine, SessionStore};
use hobot_settings::{BackendSettings, GatewaySettings};
use hobot_tools::{DegradedCache, Dispatcher, Registry, RegistryError, ToolExecutor};

/// Failures while assembling the gateway from settings.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("audit store: {0}")]
    Audit(#[from] hobot_audit::AuditError),

    #[error("tool registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AgentEngine>,
    pub sessions: Arc<SessionStore>,
    pub audit: Arc<AuditStore>,
    pub backends: BackendSettings,
    pub http: reqwest::Client,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire up the full gateway: audit store, tool layer, provider router,
    /// session store, and the agent engine.
    pub fn bootstrap(
        settings: &GatewaySettings,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, BootstrapError> {
        let audit = Arc::new(AuditStore::open(Path::new(&settings.storage.audit_db))?);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.backends.timeout_secs))
            .build()?;

        let dispatcher = Dispatcher::new(
            settings.backends.clone(),
            http.clone(),
            Arc::new(DegradedCache::default()),
        );
        let executor = Arc::new(ToolExecutor::new(
            Registry::load()?,
            dispatcher,
            Arc::clone(&audit),
        ));

        let router = Arc::new(ProviderRouter::from_settings(&settings.providers, http.clone()));
        info!(
            providers = router.providers().len(),
            "provider router initialized"
        );

        let sessions = Arc::new(SessionStore::new(settings.storage.sessions_dir.clone()));
        let engine = Arc::new(AgentEngine::new(
            router,
            executor,
            Arc::clone(&audit),
            settings.agent.clone(),
        ));

        Ok(Self {
            engine,
            sessions,
            audit,
            backends: settings.backends.clone(),
            http,
            metrics,
        })
    }
}
