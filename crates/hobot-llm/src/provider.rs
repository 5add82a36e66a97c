//! The [`ChatProvider`] trait and the shared health cache.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use hobot_core::messages::ChatMessage;

use crate::errors::Result;

/// How long a health probe result is trusted before re-probing.
pub const HEALTH_CACHE_TTL: Duration = Duration::from_secs(30);

/// Timeout for health probes. Deliberately short: an unhealthy provider must
/// not stall the turn it is being considered for.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A chat completion backend.
///
/// Implementations cache health probes for [`HEALTH_CACHE_TTL`] and must
/// invalidate the cached flag immediately when a `chat` call fails, so the
/// router stops offering a provider that just broke.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Configured provider name (router key).
    fn name(&self) -> &str;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Whether raw PHI may be sent to this provider. When false, the caller
    /// redacts before `chat` and restores tokens in the reply.
    fn phi_safe(&self) -> bool;

    /// One chat completion over the full message history.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Whether the provider currently answers its health endpoint.
    async fn is_available(&self) -> bool;
}

/// TTL-cached health flag shared by provider implementations.
pub struct HealthCache {
    state: Mutex<Option<(bool, Instant)>>,
    ttl: Duration,
}

impl HealthCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(None),
            ttl,
        }
    }

    /// Cached value if still fresh.
    pub fn get(&self) -> Option<bool> {
        let state = self.state.lock();
        match *state {
            Some((healthy, checked_at)) if checked_at.elapsed() < self.ttl => Some(healthy),
            _ => None,
        }
    }

    /// Record a probe result.
    pub fn set(&self, healthy: bool) {
        *self.state.lock() = Some((healthy, Instant::now()));
    }

    /// Drop the cached value so the next check probes again.
    pub fn invalidate(&self) {
        *self.state.lock() = None;
    }
}

impl Default for HealthCache {
    fn default() -> Self {
        Self::new(HEALTH_CACHE_TTL)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
