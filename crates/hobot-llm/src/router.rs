//! Provider selection.

use std::sync::Arc;

use tracing::{info, instrument};

use hobot_settings::{ProviderKind, ProvidersSettings};

use crate::errors::{ProviderError, Result};
use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::provider::ChatProvider;

/// Routes chat requests to a configured provider.
///
/// Selection order: explicitly requested name, then the configured default,
/// then the first configured provider. An explicit name that matches nothing
/// is an error rather than a silent fallback.
pub struct ProviderRouter {
    providers: Vec<Arc<dyn ChatProvider>>,
    default: Option<String>,
}

impl ProviderRouter {
    /// Build all configured providers over one shared HTTP client.
    #[must_use]
    pub fn from_settings(settings: &ProvidersSettings, client: reqwest::Client) -> Self {
        let providers: Vec<Arc<dyn ChatProvider>> = settings
            .entries
            .iter()
            .map(|entry| -> Arc<dyn ChatProvider> {
                match entry.kind {
                    ProviderKind::Ollama => {
                        Arc::new(OllamaProvider::new(entry.clone(), client.clone()))
                    }
                    ProviderKind::OpenaiCompatible => {
                        Arc::new(OpenAiCompatProvider::new(entry.clone(), client.clone()))
                    }
                }
            })
            .collect();
        info!(count = providers.len(), default = ?settings.default, "provider router ready");
        Self {
            providers,
            default: settings.default.clone(),
        }
    }

    /// Direct construction, used by tests and custom wiring.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn ChatProvider>>, default: Option<String>) -> Self {
        Self { providers, default }
    }

    /// All configured providers, in configuration order.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn ChatProvider>] {
        &self.providers
    }

    /// Resolve a provider by the selection order.
    #[instrument(skip(self))]
    pub fn select(&self, requested: Option<&str>) -> Result<Arc<dyn ChatProvider>> {
        if let Some(name) = requested {
            return self
                .providers
                .iter()
                .find(|p| p.name() == name)
                .cloned()
                .ok_or_else(|| ProviderError::UnknownProvider(name.to_owned()));
        }
        if let Some(default) = &self.default
            && let Some(provider) = self.providers.iter().find(|p| p.name() == *default)
        {
            return Ok(provider.clone());
        }
        self.providers
            .first()
            .cloned()
            .ok_or(ProviderError::NoneConfigured)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hobot_core::messages::ChatMessage;

    struct FakeProvider {
        name: &'static str,
    }

    #[async_trait]
    impl ChatProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn model(&self) -> &str {
            "fake"
        }
        fn phi_safe(&self) -> bool {
            true
        }
        async fn chat(&self, _messages: &[ChatMessage]) -> crate::errors::Result<String> {
            Ok("ok".into())
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    fn router(default: Option<&str>) -> ProviderRouter {
        ProviderRouter::new(
            vec![
                Arc::new(FakeProvider { name: "alpha" }),
                Arc::new(FakeProvider { name: "beta" }),
            ],
            default.map(str::to_owned),
        )
    }

    #[test]
    fn explicit_name_wins() {
        let r = router(Some("alpha"));
        assert_eq!(r.select(Some("beta")).unwrap().name(), "beta");
    }

    #[test]
    fn unknown_explicit_name_is_an_error() {
        let r = router(None);
        assert!(matches!(
            r.select(Some("gamma")),
            Err(ProviderError::UnknownProvider(name)) if name == "gamma"
        ));
    }

    #[test]
    fn default_used_when_nothing_requested() {
        let r = router(Some("beta"));
        assert_eq!(r.select(None).unwrap().name(), "beta");
    }

    #[test]
    fn first_provider_when_no_default() {
        let r = router(None);
        assert_eq!(r.select(None).unwrap().name(), "alpha");
    }

    #[test]
    fn missing_default_falls_through_to_first() {
        let r = router(Some("gone"));
        assert_eq!(r.select(None).unwrap().name(), "alpha");
    }

    #[test]
    fn empty_router_reports_none_configured() {
        let r = ProviderRouter::new(vec![], None);
        assert!(matches!(r.select(None), Err(ProviderError::NoneConfigured)));
    }
}
