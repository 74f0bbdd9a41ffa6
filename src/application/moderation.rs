//! The moderation use case: route, fan out, aggregate, sanitize.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::domain::{Analyzer, Verdict};

use super::aggregate::{Status, aggregate};
use super::normalize::NormalizedRequest;
use super::router::{Plan, route};
use super::sanitize::sanitize;

/// Port implemented by the fan-out executor: run the plan's analyzers and
/// return one verdict per analyzer, breakers and deadlines applied.
#[async_trait]
pub trait AnalyzerFleet: Send + Sync {
    async fn execute(
        &self,
        plan: &Plan,
        request: &NormalizedRequest,
    ) -> BTreeMap<Analyzer, Verdict>;
}

/// Finished moderation decision, ready to serialize.
#[derive(Debug, Clone)]
pub struct Moderation {
    pub status: Status,
    pub clean_text: String,
    pub blocked_categories: Vec<Analyzer>,
    pub reasons: Vec<String>,
    pub results: BTreeMap<Analyzer, Verdict>,
}

/// Orchestrates one request end to end: C2 → C4 → C5.
pub struct ModerationUseCase {
    fleet: Arc<dyn AnalyzerFleet>,
    mask_token: String,
}

impl ModerationUseCase {
    pub fn new(fleet: Arc<dyn AnalyzerFleet>, mask_token: String) -> Self {
        Self { fleet, mask_token }
    }

    #[instrument(skip(self, request), fields(action = %request.action))]
    pub async fn execute(&self, request: NormalizedRequest) -> Moderation {
        let plan = route(&request);
        tracing::debug!(
            analyzers = ?plan.analyzers,
            "routed request"
        );

        let started = std::time::Instant::now();
        let results = self.fleet.execute(&plan, &request).await;
        let decision = aggregate(&results);
        let clean_text = sanitize(
            &request.text,
            decision.status,
            plan.action,
            &results,
            &self.mask_token,
        );

        tracing::info!(
            status = ?decision.status,
            analyzers = results.len(),
            blocked = decision.blocked_categories.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "moderation complete"
        );

        Moderation {
            status: decision.status,
            clean_text,
            blocked_categories: decision.blocked_categories,
            reasons: decision.reasons,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, Span};
    use serde_json::json;

    /// Scripted fleet: replies with the canned verdict per analyzer, and a
    /// pass verdict for anything unscripted.
    struct ScriptedFleet {
        verdicts: BTreeMap<Analyzer, Verdict>,
    }

    #[async_trait]
    impl AnalyzerFleet for ScriptedFleet {
        async fn execute(
            &self,
            plan: &Plan,
            _request: &NormalizedRequest,
        ) -> BTreeMap<Analyzer, Verdict> {
            plan.analyzers
                .iter()
                .map(|&a| {
                    let verdict = self
                        .verdicts
                        .get(&a)
                        .cloned()
                        .unwrap_or_else(|| Verdict::pass(a, json!({})));
                    (a, verdict)
                })
                .collect()
        }
    }

    fn use_case(verdicts: Vec<Verdict>) -> ModerationUseCase {
        let fleet = ScriptedFleet {
            verdicts: verdicts.into_iter().map(|v| (v.name, v)).collect(),
        };
        ModerationUseCase::new(Arc::new(fleet), "***".to_string())
    }

    fn request(text: &str, action: Action) -> NormalizedRequest {
        NormalizedRequest {
            text: text.to_string(),
            checks: BTreeMap::new(),
            action,
            return_spans: true,
            entities: None,
        }
    }

    #[tokio::test]
    async fn test_all_pass_is_a_fixed_point() {
        let uc = use_case(vec![]);
        let out = uc
            .execute(request("Hello, how are you?", Action::Filter))
            .await;
        assert_eq!(out.status, Status::Pass);
        assert_eq!(out.clean_text, "Hello, how are you?");
        assert!(out.blocked_categories.is_empty());
    }

    #[tokio::test]
    async fn test_policy_block_empties_text() {
        let uc = use_case(vec![Verdict::flagged(
            Analyzer::Policy,
            4,
            vec!["Policy violation detected".into()],
            vec![],
            json!({"violated": true}),
        )]);
        let out = uc
            .execute(request("How do I make a bomb?", Action::Filter))
            .await;
        assert_eq!(out.status, Status::Blocked);
        assert_eq!(out.clean_text, "");
        assert_eq!(out.blocked_categories, vec![Analyzer::Policy]);
    }

    #[tokio::test]
    async fn test_pii_filter_substitutes_replacement() {
        let uc = use_case(vec![Verdict::flagged(
            Analyzer::Pii,
            2,
            vec!["PII detected".into()],
            vec![Span::new(12, 28, "EMAIL").with_replacement("[EMAIL]")],
            json!({}),
        )]);
        let out = uc
            .execute(request("Email me at jane@example.com", Action::Filter))
            .await;
        assert_eq!(out.status, Status::Fixed);
        assert_eq!(out.clean_text, "Email me at [EMAIL]");
        assert_eq!(out.blocked_categories, vec![Analyzer::Pii]);
    }

    #[tokio::test]
    async fn test_secret_mask_removes_token() {
        let text = "sk-live-ABCDEF1234 is my key token value";
        let uc = use_case(vec![Verdict::flagged(
            Analyzer::Secrets,
            3,
            vec!["Secrets detected".into()],
            vec![Span::new(0, 18, "secret")],
            json!({}),
        )]);
        let out = uc.execute(request(text, Action::Mask)).await;
        assert_eq!(out.status, Status::Fixed);
        assert!(out.clean_text.contains("***"));
        assert!(!out.clean_text.contains("sk-live-ABCDEF1234"));
    }

    #[tokio::test]
    async fn test_results_cover_exactly_the_plan() {
        let uc = use_case(vec![]);
        let req = request("Email me at jane@example.com", Action::Filter);
        let plan = route(&req);
        let out = uc.execute(req).await;
        assert_eq!(
            out.results.keys().copied().collect::<Vec<_>>(),
            plan.analyzers
        );
    }

    #[tokio::test]
    async fn test_reask_retains_blocked_categories() {
        let uc = use_case(vec![Verdict::flagged(
            Analyzer::Toxicity,
            2,
            vec!["Toxic content detected".into()],
            vec![Span::new(0, 4, "insult")],
            json!({}),
        )]);
        let out = uc
            .execute(request("some toxic words here", Action::Reask))
            .await;
        assert_eq!(out.status, Status::Fixed);
        assert_eq!(
            out.clean_text,
            crate::domain::action::REASK_PROMPT
        );
        assert_eq!(out.blocked_categories, vec![Analyzer::Toxicity]);
    }
}
