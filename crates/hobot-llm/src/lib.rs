//! # hobot-llm
//!
//! Chat providers and provider routing.
//!
//! Two wire protocols are supported: Ollama's native `/api/chat` and the
//! OpenAI-compatible `/v1/chat/completions` family. Both implement the
//! [`provider::ChatProvider`] trait; health probes are cached for 30 seconds
//! and invalidated the moment a chat call fails.
//!
//! Providers carry a `phi_safe` flag from configuration. The agent loop
//! consults it before sending history: a provider that is not PHI-safe only
//! ever sees redacted text.

#![deny(unsafe_code)]

pub mod errors;
pub mod ollama;
pub mod openai_compat;
pub mod provider;
pub mod router;
pub mod wire;

pub use errors::{ProviderError, Result};
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ChatProvider, HEALTH_CACHE_TTL, HealthCache};
pub use router::ProviderRouter;
