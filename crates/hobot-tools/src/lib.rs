//! # hobot-tools
//!
//! The gateway's tool layer: a closed registry of tool descriptors, parameter
//! validation, HTTP dispatch to the eight hospital backends, a degraded-mode
//! cache for read tools, the confirm-before-execute gate for critical tools,
//! and the gateway-level escalate tool.
//!
//! Safety boundaries live here: a critical tool can only execute through
//! [`executor::ToolExecutor::confirm`], every gate transition writes an audit
//! entry, and read tools degrade to cached data (explicitly flagged, with
//! staleness) when a backend is down.

#![deny(unsafe_code)]

pub mod cache;
pub mod dispatch;
pub mod errors;
pub mod executor;
pub mod gate;
pub mod registry;

pub use cache::DegradedCache;
pub use dispatch::{Dispatcher, ToolReply};
pub use errors::{Result, ToolError};
pub use executor::{CallerContext, ToolExecutor, ToolOutcome};
pub use gate::{ConfirmationGate, PendingConfirmation};
pub use registry::{Backend, Method, Registry, RegistryError, ToolDescriptor, ToolKind};
