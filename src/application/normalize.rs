//! Request normalization.
//!
//! Turns the raw inbound JSON into a [`NormalizedRequest`] or rejects it.
//! Pure and deterministic: no I/O happens here, and absent `checks` flags
//! stay absent so the router can apply its default policy.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use utoipa::ToSchema;

use crate::config::LimitsConfig;
use crate::domain::{Action, Analyzer};

use super::errors::GatewayError;

/// Wire shape of the moderation request body.
///
/// Unknown top-level fields are ignored for forward compatibility;
/// `action_on_fail` stays a free string here so that unrecognised values can
/// be rejected with `INVALID_INPUT` instead of a generic deserialize error.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct RawValidateRequest {
    pub text: String,
    /// Per-analyzer opt-in/opt-out. Keys the gateway does not recognise are
    /// dropped.
    #[schema(value_type = Option<Object>)]
    pub checks: Option<HashMap<String, bool>>,
    pub action_on_fail: Option<String>,
    pub return_spans: Option<bool>,
    /// Entity types forwarded verbatim to the PII analyzer only.
    pub entities: Option<Vec<String>>,
}

/// A validated, normalized moderation request.
#[derive(Debug, Clone)]
pub struct NormalizedRequest {
    pub text: String,
    /// Explicit caller selections. Analyzers absent from this map are left
    /// to the router's heuristics.
    pub checks: BTreeMap<Analyzer, bool>,
    pub action: Action,
    pub return_spans: bool,
    pub entities: Option<Vec<String>>,
}

/// Validate and normalize an inbound request body.
pub fn normalize(
    raw: RawValidateRequest,
    limits: &LimitsConfig,
) -> Result<NormalizedRequest, GatewayError> {
    if raw.text.trim().is_empty() {
        return Err(GatewayError::invalid("text must be a non-empty string"));
    }
    if raw.text.len() > limits.max_text_bytes {
        return Err(GatewayError::invalid(format!(
            "text exceeds the maximum of {} bytes",
            limits.max_text_bytes
        )));
    }

    let action = match raw.action_on_fail.as_deref() {
        None => Action::default(),
        Some(name) => Action::parse(name).ok_or_else(|| {
            GatewayError::invalid(format!(
                "unrecognised action_on_fail {name:?}; expected one of pass, mask, filter, refrain, reask"
            ))
        })?,
    };

    let checks = raw
        .checks
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, enabled)| Analyzer::parse(&name).map(|a| (a, enabled)))
        .collect();

    Ok(NormalizedRequest {
        text: raw.text,
        checks,
        action,
        return_spans: raw.return_spans.unwrap_or(false),
        entities: raw.entities,
    })
}
