//! OpenAI-compatible provider: `/v1/chat/completions` with Bearer auth,
//! `/v1/models` health. Covers OpenAI itself, vLLM, LM Studio, and similar
//! API-compatible servers.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use hobot_core::messages::ChatMessage;
use hobot_settings::ProviderSettings;

use crate::errors::{ProviderError, Result};
use crate::provider::{ChatProvider, HEALTH_PROBE_TIMEOUT, HealthCache};
use crate::wire::wire_messages;

/// Chat provider for any OpenAI-compatible endpoint.
pub struct OpenAiCompatProvider {
    settings: ProviderSettings,
    client: reqwest::Client,
    health: HealthCache,
}

impl OpenAiCompatProvider {
    /// Build from settings with a shared HTTP client.
    #[must_use]
    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self {
            settings,
            client,
            health: HealthCache::default(),
        }
    }

    fn bearer(&self) -> Option<String> {
        if self.settings.api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", self.settings.api_key))
        }
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/v1/models", self.settings.base_url.trim_end_matches('/'));
        let mut request = self.client.get(&url).timeout(HEALTH_PROBE_TIMEOUT);
        if let Some(auth) = self.bearer() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
        matches!(request.send().await, Ok(resp) if resp.status().is_success())
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
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
        let url = format!(
            "{}/v1/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.settings.model,
            "messages": wire_messages(messages),
        });

        debug!(message_count = messages.len(), "sending chat completion request");

        let mut request = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .json(&body);
        if let Some(auth) = self.bearer() {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "chat completion request failed, marking unhealthy");
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
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| {
                ProviderError::Malformed("completion reply missing choices[0].message.content".into())
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
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: String, api_key: &str) -> ProviderSettings {
        ProviderSettings {
            name: "cloud".into(),
            kind: ProviderKind::OpenaiCompatible,
            base_url,
            api_key: api_key.into(),
            model: "gpt-4o-mini".into(),
            phi_safe: false,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn chat_sends_bearer_and_parses_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Done."}}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(
            settings(server.uri(), "sk-test"),
            reqwest::Client::new(),
        );
        let reply = provider
            .chat(&[ChatMessage::now(Role::User, "hello")])
            .await
            .unwrap();
        assert_eq!(reply, "Done.");
    }

    #[tokio::test]
    async fn empty_api_key_sends_no_auth_header() {
        let provider = OpenAiCompatProvider::new(
            settings("http://localhost".into(), ""),
            reqwest::Client::new(),
        );
        assert!(provider.bearer().is_none());
    }

    #[tokio::test]
    async fn malformed_reply_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(
            settings(server.uri(), "sk-test"),
            reqwest::Client::new(),
        );
        let err = provider
            .chat(&[ChatMessage::now(Role::User, "hello")])
            .await
            .unwrap_err();
        assert_matches!(err, ProviderError::Malformed(_));
    }

    #[tokio::test]
    async fn health_uses_models_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": []
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(
            settings(server.uri(), "sk-test"),
            reqwest::Client::new(),
        );
        assert!(provider.is_available().await);
    }

    #[tokio::test]
    async fn auth_rejection_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(
            settings(server.uri(), "bad-key"),
            reqwest::Client::new(),
        );
        assert!(!provider.is_available().await);
    }
}
