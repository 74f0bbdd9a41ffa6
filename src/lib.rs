//! Modgate — content-moderation gateway.
//!
//! Sits in front of a fleet of independent moderation analyzers (policy,
//! toxicity, bias, PII, secrets, jailbreak, brand, format, gibberish) and
//! exposes one unified endpoint. Per request it decides which analyzers to
//! run, fans the calls out concurrently under per-call and request-wide
//! deadlines with a circuit breaker per analyzer, merges the verdicts into
//! one decision, and sanitizes the text with the chosen mitigation action.
//!
//! ```text
//! normalizer → router → fan-out executor → aggregator/sanitizer → response
//!                            │
//!                     breaker registry (only cross-request state)
//! ```
//!
//! # Modules
//!
//! - [`config`] — environment-sourced configuration, immutable after startup
//! - [`domain`] — analyzers, actions, verdicts, spans
//! - [`application`] — normalization, routing, aggregation, sanitization
//! - [`infrastructure`] — breakers, analyzer HTTP client, adapters, executor
//! - [`presentation`] — axum routes, handlers, DTOs

mod app;

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod presentation;

pub use app::{AppHandle, create_app};
pub use config::Config;
pub use logging::init_tracing;
