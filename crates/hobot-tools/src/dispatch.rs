//! HTTP dispatch to hospital backends.
//!
//! A descriptor's path template names its placeholders (`{patient_id}`);
//! remaining params travel as query string on GET and as the JSON body on
//! POST. GET dispatches fall back to the degraded cache when the backend is
//! unreachable, times out, or answers non-2xx; POST dispatches fail hard
//! rather than replay stale state.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use metrics::counter;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use hobot_core::text::clip_utf8;
use hobot_settings::BackendSettings;

use crate::cache::DegradedCache;
use crate::errors::{Result, ToolError};
use crate::registry::{Method, ToolDescriptor, ToolKind};

/// Max bytes of backend error body carried into a `BackendStatus`.
const ERROR_DETAIL_MAX: usize = 500;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("valid regex"));

/// Placeholder names in a path template, in order.
pub fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

/// Substitute placeholders; return the path and the params not consumed.
fn build_path(template: &str, params: &Value) -> (String, Map<String, Value>) {
    let mut used = Vec::new();
    let path = PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            used.push(key.to_owned());
            match params.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            }
        })
        .into_owned();
    let remaining = params
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(k, v)| !used.contains(k) && !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    (path, remaining)
}

/// A completed dispatch. `staleness` is set only when the payload came from
/// the degraded cache.
#[derive(Clone, Debug)]
pub struct ToolReply {
    pub payload: Value,
    pub staleness: Option<Duration>,
}

/// Sends backend tool calls over a shared client.
pub struct Dispatcher {
    client: reqwest::Client,
    backends: BackendSettings,
    cache: Arc<DegradedCache>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(backends: BackendSettings, client: reqwest::Client, cache: Arc<DegradedCache>) -> Self {
        Self {
            client,
            backends,
            cache,
        }
    }

    /// Execute a backend tool call.
    #[instrument(skip_all, fields(tool = descriptor.name))]
    pub async fn dispatch(&self, descriptor: &ToolDescriptor, params: &Value) -> Result<ToolReply> {
        let ToolKind::Backend {
            backend,
            method,
            path,
        } = descriptor.kind
        else {
            return Err(ToolError::UnknownTool(descriptor.name.to_owned()));
        };

        let base = backend.base_url(&self.backends).trim_end_matches('/');
        let (path, remaining) = build_path(path, params);
        let url = format!("{base}{path}");
        let timeout = Duration::from_secs(self.backends.timeout_secs);
        counter!("hobot_tool_dispatch_total", "tool" => descriptor.name, "backend" => backend.as_str())
            .increment(1);

        match method {
            Method::Get => {
                let cache_key = cache_key(descriptor, params);
                let mut request = self.client.get(&url).timeout(timeout);
                if !remaining.is_empty() {
                    let query: Vec<(String, String)> = remaining
                        .iter()
                        .map(|(k, v)| (k.clone(), query_value(v)))
                        .collect();
                    request = request.query(&query);
                }
                match self.send(request).await {
                    Ok(payload) => {
                        self.cache.record(&cache_key, payload.clone());
                        Ok(ToolReply {
                            payload,
                            staleness: None,
                        })
                    }
                    Err(err) => match self.cache.fetch(&cache_key) {
                        Some((payload, staleness)) => {
                            warn!(key = %cache_key, ?staleness, "backend unavailable, serving cached payload");
                            counter!("hobot_tool_degraded_total", "tool" => descriptor.name)
                                .increment(1);
                            Ok(ToolReply {
                                payload,
                                staleness: Some(staleness),
                            })
                        }
                        None => Err(err),
                    },
                }
            }
            Method::Post => {
                let body = if remaining.is_empty() {
                    params.clone()
                } else {
                    Value::Object(remaining)
                };
                let request = self.client.post(&url).timeout(timeout).json(&body);
                let payload = self.send(request).await?;
                Ok(ToolReply {
                    payload,
                    staleness: None,
                })
            }
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ToolError::BackendStatus {
                status: status.as_u16(),
                detail: clip_utf8(&detail, ERROR_DETAIL_MAX).to_owned(),
            });
        }
        let payload = response.json().await?;
        debug!("backend dispatch ok");
        Ok(payload)
    }
}

/// Cache key: tool name plus its placeholder values, so distinct resources
/// never shadow each other.
fn cache_key(descriptor: &ToolDescriptor, params: &Value) -> String {
    let ToolKind::Backend { path, .. } = descriptor.kind else {
        return descriptor.name.to_owned();
    };
    let mut key = descriptor.name.to_owned();
    for name in placeholders(path) {
        key.push(':');
        match params.get(name) {
            Some(Value::String(s)) => key.push_str(s),
            Some(other) => key.push_str(&other.to_string()),
            None => key.push('_'),
        }
    }
    key
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
