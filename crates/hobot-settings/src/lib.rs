//! # hobot-settings
//!
//! Configuration management with layered sources for the Hobot gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`GatewaySettings::default()`]
//! 2. **Config file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `HOBOT_*` overrides (highest priority)
//!
//! There is no global singleton: the server binary loads settings once and
//! passes them into the components that need them, so multiple isolated
//! gateway instances can coexist in one process (and in tests).

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path};
pub use types::*;
