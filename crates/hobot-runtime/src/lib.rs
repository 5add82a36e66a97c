//! # hobot-runtime
//!
//! The conversation runtime: JSONL-backed sessions with rolling-summary
//! consolidation, tool-call parsing of model output, the keyword intent
//! fallback, and the agent loop that ties providers, tools, and audit
//! together into one turn.

#![deny(unsafe_code)]

pub mod agent;
pub mod consolidate;
pub mod errors;
pub mod events;
pub mod intent;
pub mod parse;
pub mod session;

pub use agent::AgentEngine;
pub use errors::{Result, RuntimeError, SessionError, SessionResult};
pub use events::{AgentEvent, EventSink};
pub use session::{Session, SessionHandle, SessionStore};
