//! # hobot-server
//!
//! The gateway's HTTP surface: chat (plain and SSE), confirmation of staged
//! critical tools, escalation resolution, health, and metrics, plus the
//! bootstrap wiring that assembles the whole gateway from settings.

#![deny(unsafe_code)]

pub mod routes;
pub mod server;
pub mod state;

pub use server::{build_router, serve};
pub use state::{AppState, BootstrapError};
