//! Ollama provider: `/api/chat` completions, `/api/tags` health.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use hobot_core::messages::ChatMessage;
use hobot_settings::ProviderSettings;

use crate::errors::{ProviderError, Result};
use crate::provider::{ChatProvider, HEALTH_PROBE_TIMEOUT, HealthCache};
use crate::wire::wire_messages;

/// Chat provider for a local or remote Ollama instance. No auth.
pub struct OllamaProvider {
    settings: ProviderSettings,
    client: reqwest::Client,
    health: HealthCache,
}

impl OllamaProvider {
    /// Build from settings with a shared HTTP client.
    #[must_use]
    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self {
            settings,
            client,
            health: HealthCache::default(),
        }
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.settings.base_url.trim_end_matches('/'));
        let result = self
            .client
            .get(&url)
            .timeout(HEALTH_PROBE_TIMEOUT)
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn phi_safe(&self) -> bool {
        self.settings.phi_safe
    }

    #[instrument(skip_all, fields(provider = %self.settings.name, model = %self.settings.model))]
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/api/chat", self.settings.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.settings.model,
            "messages": wire_messages(messages),
            "stream": false,
        });

        debug!(message_count = messages.len(), "sending ollama chat request");

        let result = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "ollama request failed, marking unhealthy");
                self.health.invalidate();
                return Err(ProviderError::Http(err));
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.health.invalidate();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response.json().await.map_err(ProviderError::Http)?;
        payload["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| {
                ProviderError::Malformed("ollama reply missing message.content".into())
            })
    }

    async fn is_available(&self) -> bool {
        if let Some(cached) = self.health.get() {
            return cached;
        }
        let healthy = self.probe().await;
        self.health.set(healthy);
        healthy
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hobot_core::messages::Role;
    use hobot_settings::ProviderKind;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: String) -> ProviderSettings {
        ProviderSettings {
            name: "local".into(),
            kind: ProviderKind::Ollama,
            base_url,
            api_key: String::new(),
            model: "llama3.2".into(),
            phi_safe: true,
            timeout_secs: 5,
        }
    }

    fn user_message(content: &str) -> ChatMessage {
        ChatMessage::now(Role::User, content)
    }

    #[tokio::test]
    async fn chat_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3.2",
                "stream": false,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "Heart rate is 72."}
            })))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(settings(server.uri()), reqwest::Client::new());
        let reply = provider.chat(&[user_message("vitals for P001?")]).await.unwrap();
        assert_eq!(reply, "Heart rate is 72.");
    }

    #[tokio::test]
    async fn chat_error_status_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(settings(server.uri()), reqwest::Client::new());
        let err = provider.chat(&[user_message("hi")]).await.unwrap_err();
        assert_matches!(err, ProviderError::Api { status: 500, .. });
    }

    #[tokio::test]
    async fn health_probe_hits_tags_and_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(settings(server.uri()), reqwest::Client::new());
        assert!(provider.is_available().await);
        // Second check inside the TTL must not re-probe (expect(1) above).
        assert!(provider.is_available().await);
    }

    #[tokio::test]
    async fn chat_failure_invalidates_cached_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(settings(server.uri()), reqwest::Client::new());
        assert!(provider.is_available().await);

        let _ = provider.chat(&[user_message("hi")]).await.unwrap_err();
        // Cache was dropped; availability is re-probed, not served stale.
        assert_eq!(provider.health.get(), None);
    }

    #[tokio::test]
    async fn unreachable_host_is_unavailable() {
        let provider = OllamaProvider::new(
            settings("http://127.0.0.1:1".into()),
            reqwest::Client::new(),
        );
        assert!(!provider.is_available().await);
    }
}
