//! Verdict aggregation: fold per-analyzer verdicts into one decision.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Analyzer, Outcome, Verdict};

/// Overall moderation status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing flagged; the text passes unchanged.
    Pass,
    /// Something flagged; a mitigation action was applied.
    Fixed,
    /// A must-block verdict; the text is withheld entirely.
    Blocked,
    /// Every planned analyzer failed and no fallback fired.
    Error,
}

/// Aggregated outcome of one fan-out, before sanitization.
#[derive(Debug, Clone)]
pub struct Decision {
    pub status: Status,
    /// Analyzers that contributed to a non-pass status, priority-ordered.
    pub blocked_categories: Vec<Analyzer>,
    /// De-duplicated reasons in analyzer-priority order.
    pub reasons: Vec<String>,
}

/// Whether a verdict is strong enough to warrant mitigation: a flag with
/// concrete spans, or one at severity 2 and above. Weaker flags are
/// informational and do not change the text.
fn warrants_mitigation(verdict: &Verdict) -> bool {
    verdict.outcome == Outcome::Flagged && (!verdict.spans.is_empty() || verdict.severity >= 2)
}

fn contributes(verdict: &Verdict) -> bool {
    verdict.is_blocking() || warrants_mitigation(verdict)
}

/// Merge the verdict map into an overall decision.
///
/// The verdict map is keyed in analyzer-priority order, so every collection
/// built here is deterministic for identical inputs.
pub fn aggregate(verdicts: &BTreeMap<Analyzer, Verdict>) -> Decision {
    let any_blocking = verdicts.values().any(Verdict::is_blocking);
    let any_mitigation = verdicts.values().any(warrants_mitigation);
    let all_errored = !verdicts.is_empty()
        && verdicts.values().all(|v| v.outcome == Outcome::Error);

    let status = if any_blocking {
        Status::Blocked
    } else if any_mitigation {
        Status::Fixed
    } else if all_errored {
        Status::Error
    } else {
        Status::Pass
    };

    let blocked_categories: Vec<Analyzer> = verdicts
        .values()
        .filter(|v| contributes(v))
        .map(|v| v.name)
        .collect();

    let reasons = match status {
        Status::Pass => vec!["Content complies with all policies".to_string()],
        Status::Error => collect_reasons(verdicts.values()),
        Status::Fixed | Status::Blocked => {
            collect_reasons(verdicts.values().filter(|v| contributes(v)))
        }
    };

    Decision {
        status,
        blocked_categories,
        reasons,
    }
}

/// Concatenate reasons in iteration (priority) order, de-duplicating while
/// preserving first occurrence. Verdicts without reasons of their own get
/// the analyzer's stock phrasing.
fn collect_reasons<'a>(verdicts: impl Iterator<Item = &'a Verdict>) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut reasons = Vec::new();
    for verdict in verdicts {
        if verdict.reasons.is_empty() {
            push_unique(&mut reasons, &mut seen, verdict.name.default_reason().to_string());
        } else {
            for reason in &verdict.reasons {
                push_unique(&mut reasons, &mut seen, reason.clone());
            }
        }
    }
    reasons
}

fn push_unique(
    reasons: &mut Vec<String>,
    seen: &mut std::collections::BTreeSet<String>,
    reason: String,
) {
    if seen.insert(reason.clone()) {
        reasons.push(reason);
    }
}
