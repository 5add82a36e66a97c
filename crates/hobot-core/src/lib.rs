//! # hobot-core
//!
//! Foundation types and utilities for the Hobot clinical gateway.
//!
//! This crate provides the shared vocabulary that all other Hobot crates
//! depend on:
//!
//! - **Messages**: [`messages::ChatMessage`] with role, content, and timestamp
//! - **Clinical facts**: [`facts::ClinicalFact`], typed, patient-scoped data
//!   with provenance
//! - **PHI redaction**: [`phi::redact`] / [`phi::restore`] for text leaving
//!   the trust boundary
//! - **Text**: UTF-8–safe snippet helpers for audit summaries
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other hobot crates.

#![deny(unsafe_code)]

pub mod facts;
pub mod messages;
pub mod phi;
pub mod text;
