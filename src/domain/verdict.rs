//! Normalized per-analyzer results.
//!
//! Every analyzer call (or refusal to call) produces exactly one [`Verdict`].
//! Adapters normalize each upstream's own vocabulary into this shape so the
//! aggregation and sanitization stages never see upstream field names.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Analyzer;

/// Highest severity an analyzer can report; verdicts at this level block the
/// request outright.
pub const SEVERITY_BLOCK: u8 = 4;

/// How an analyzer call concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Analyzer ran and found nothing.
    Pass,
    /// Analyzer ran and flagged content.
    Flagged,
    /// Call failed: transport error, bad status, malformed body, or timeout.
    Error,
    /// Analyzer was in the plan but deliberately not invoked.
    Skipped,
    /// Breaker refused admission; no outbound call was made.
    ShortCircuited,
}

/// A flagged region of the original text.
///
/// `start..end` is half-open and indexed by UTF-8 code points of the original
/// request text, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

impl Span {
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
            replacement: None,
        }
    }

    pub fn with_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = Some(replacement.into());
        self
    }
}

/// Normalized result of one analyzer for one request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Verdict {
    pub name: Analyzer,
    pub outcome: Outcome,
    /// 0 = informational, 4 = must-block. Meaningful only for `Flagged`
    /// outcomes; every other constructor leaves it at 0.
    pub severity: u8,
    pub reasons: Vec<String>,
    pub spans: Vec<Span>,
    /// Upstream response body, verbatim, for debugging.
    #[schema(value_type = Object)]
    pub raw: serde_json::Value,
}

impl Verdict {
    pub fn pass(name: Analyzer, raw: serde_json::Value) -> Self {
        Self {
            name,
            outcome: Outcome::Pass,
            severity: 0,
            reasons: Vec::new(),
            spans: Vec::new(),
            raw,
        }
    }

    pub fn flagged(
        name: Analyzer,
        severity: u8,
        reasons: Vec<String>,
        spans: Vec<Span>,
        raw: serde_json::Value,
    ) -> Self {
        Self {
            name,
            outcome: Outcome::Flagged,
            severity: severity.min(SEVERITY_BLOCK),
            reasons,
            spans: merge_overlapping(spans),
            raw,
        }
    }

    pub fn error(name: Analyzer, reason: impl Into<String>) -> Self {
        Self {
            name,
            outcome: Outcome::Error,
            severity: 0,
            reasons: vec![reason.into()],
            spans: Vec::new(),
            raw: serde_json::Value::Null,
        }
    }

    /// Verdict for a planned analyzer that was deliberately not invoked.
    pub fn skipped(name: Analyzer, reason: impl Into<String>) -> Self {
        Self {
            name,
            outcome: Outcome::Skipped,
            severity: 0,
            reasons: vec![reason.into()],
            spans: Vec::new(),
            raw: serde_json::Value::Null,
        }
    }

    /// Benign verdict synthesised when the breaker denies admission.
    pub fn short_circuited(name: Analyzer) -> Self {
        Self {
            name,
            outcome: Outcome::ShortCircuited,
            severity: 0,
            reasons: vec![format!("{} unavailable, check skipped", name)],
            spans: Vec::new(),
            raw: serde_json::Value::Null,
        }
    }

    /// Whether this verdict contributes to a non-pass status. Only flagged
    /// verdicts qualify; a breaker short-circuit is always benign (the
    /// policy fallback upgrades to `Flagged` when it fires).
    pub fn is_finding(&self) -> bool {
        self.outcome == Outcome::Flagged
    }

    /// Whether this verdict forces the whole request to block.
    pub fn is_blocking(&self) -> bool {
        self.is_finding() && self.severity >= SEVERITY_BLOCK
    }
}

/// Merge overlapping or touching spans from a single analyzer.
///
/// Upstreams occasionally emit overlapping hits (regex and ML engines over
/// the same region); within one verdict they are unioned so consumers can
/// assume disjoint spans. On overlap the earlier-starting span's label and
/// replacement win.
pub fn merge_overlapping(mut spans: Vec<Span>) -> Vec<Span> {
    if spans.len() < 2 {
        return spans;
    }
    spans.sort_by_key(|s| (s.start, s.end));

    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => {
                last.end = last.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}
