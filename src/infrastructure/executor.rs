//! Fan-out executor: concurrent analyzer calls under nested deadlines.
//!
//! Each planned analyzer is either short-circuited by its breaker or called
//! on its own task. Calls are independent: one analyzer failing never
//! cancels another's in-flight call; only the global deadline (or the caller
//! dropping the request) does.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::application::moderation::AnalyzerFleet;
use crate::application::normalize::NormalizedRequest;
use crate::application::router::Plan;
use crate::config::Config;
use crate::domain::{Action, Analyzer, Outcome, Verdict};

use super::adapters::adapt;
use super::analyzer_client::{AnalyzerClient, CallError, OutboundPayload};
use super::fallback;
use super::resilience::{BreakerRegistry, Ticket};

/// Slack added to the join deadline so tasks that finish right at the global
/// deadline still get collected instead of aborted.
const JOIN_GRACE: Duration = Duration::from_millis(250);

pub struct FanOutExecutor {
    clients: BTreeMap<Analyzer, AnalyzerClient>,
    registry: Arc<BreakerRegistry>,
    per_call_timeout: Duration,
    global_deadline: Duration,
}

impl FanOutExecutor {
    pub fn new(config: &Config, registry: Arc<BreakerRegistry>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("modgate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let clients = config
            .analyzers
            .iter()
            .map(|(&analyzer, endpoint)| {
                (
                    analyzer,
                    AnalyzerClient::new(http.clone(), analyzer, endpoint.clone()),
                )
            })
            .collect();

        Ok(Self {
            clients,
            registry,
            per_call_timeout: config.limits.per_call_timeout(),
            global_deadline: config.limits.global_deadline(),
        })
    }

    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }
}

#[async_trait]
impl AnalyzerFleet for FanOutExecutor {
    async fn execute(
        &self,
        plan: &Plan,
        request: &NormalizedRequest,
    ) -> BTreeMap<Analyzer, Verdict> {
        let deadline = Instant::now() + self.global_deadline;
        let mut verdicts: BTreeMap<Analyzer, Verdict> = BTreeMap::new();
        let mut join_set: JoinSet<(Analyzer, Verdict)> = JoinSet::new();

        for &analyzer in &plan.analyzers {
            let Some(client) = self.clients.get(&analyzer) else {
                verdicts.insert(analyzer, Verdict::skipped(analyzer, "analyzer not configured"));
                continue;
            };

            match self.registry.admit(analyzer) {
                None => {
                    tracing::debug!(analyzer = %analyzer, "breaker open, short-circuiting");
                    let verdict = if analyzer == Analyzer::Policy {
                        fallback::policy_short_circuit_verdict(&request.text)
                    } else {
                        Verdict::short_circuited(analyzer)
                    };
                    verdicts.insert(analyzer, verdict);
                }
                Some(ticket) => {
                    let client = client.clone();
                    let call_timeout = client
                        .endpoint()
                        .call_timeout(self.per_call_timeout)
                        .min(deadline.saturating_duration_since(Instant::now()));
                    let text = request.text.clone();
                    let return_spans = request.return_spans;
                    let action = plan.action;
                    // Entity restriction is forwarded to the PII analyzer only.
                    let entities = (analyzer == Analyzer::Pii)
                        .then(|| request.entities.clone())
                        .flatten();

                    join_set.spawn(async move {
                        let verdict = call_analyzer(
                            client,
                            ticket,
                            call_timeout,
                            text,
                            return_spans,
                            action,
                            entities,
                        )
                        .await;
                        (analyzer, verdict)
                    });
                }
            }
        }

        // Collect in completion order; the map keeps priority order.
        let join_deadline = deadline + JOIN_GRACE;
        loop {
            let remaining = join_deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, join_set.join_next()).await {
                Ok(None) => break,
                Ok(Some(Ok((analyzer, verdict)))) => {
                    verdicts.insert(analyzer, verdict);
                }
                Ok(Some(Err(join_error))) => {
                    tracing::error!(error = %join_error, "analyzer task failed to join");
                }
                Err(_) => {
                    // Global deadline: abort stragglers. Their breaker
                    // tickets release through Drop.
                    tracing::warn!(
                        outstanding = join_set.len(),
                        "global deadline reached, cancelling in-flight analyzer calls"
                    );
                    join_set.abort_all();
                    break;
                }
            }
        }

        // Every planned analyzer yields a verdict, even if its task was
        // cancelled or panicked.
        for &analyzer in &plan.analyzers {
            verdicts
                .entry(analyzer)
                .or_insert_with(|| Verdict::error(analyzer, "timeout"));
        }

        verdicts
    }
}

/// Run one analyzer call under its deadline and settle the breaker ticket.
async fn call_analyzer(
    client: AnalyzerClient,
    ticket: Ticket,
    call_timeout: Duration,
    text: String,
    return_spans: bool,
    action: Action,
    entities: Option<Vec<String>>,
) -> Verdict {
    let analyzer = client.analyzer();
    let payload = OutboundPayload {
        text: &text,
        return_spans,
        action_on_fail: action,
        entities: entities.as_deref(),
    };

    let started = Instant::now();
    let outcome = tokio::time::timeout(call_timeout, client.call(&payload)).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Err(_) => {
            ticket.record(false);
            tracing::warn!(analyzer = %analyzer, elapsed_ms, "analyzer call timed out");
            Verdict::error(analyzer, "timeout")
        }
        Ok(Err(error)) => {
            ticket.record(false);
            tracing::warn!(analyzer = %analyzer, elapsed_ms, error = %error, "analyzer call failed");
            let reason = match error {
                CallError::Timeout => "timeout".to_string(),
                other => other.to_string(),
            };
            Verdict::error(analyzer, reason)
        }
        Ok(Ok(raw)) => {
            let verdict = adapt(analyzer, raw);
            // A body the adapter cannot make sense of counts against the
            // breaker just like a malformed response.
            ticket.record(verdict.outcome != Outcome::Error);
            tracing::debug!(
                analyzer = %analyzer,
                elapsed_ms,
                outcome = ?verdict.outcome,
                "analyzer call completed"
            );
            verdict
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use mockito::Server;
    use serde_json::json;

    fn test_config(urls: &[(Analyzer, String)]) -> Config {
        let mut config = Config::default();
        config.limits.per_call_timeout_ms = 1_000;
        config.limits.global_deadline_ms = 2_000;
        for (analyzer, url) in urls {
            config.analyzers.get_mut(analyzer).unwrap().url = url.clone();
        }
        config
    }

    fn request(text: &str) -> NormalizedRequest {
        NormalizedRequest {
            text: text.to_string(),
            checks: BTreeMap::new(),
            action: Action::Filter,
            return_spans: true,
            entities: None,
        }
    }

    fn plan(analyzers: Vec<Analyzer>) -> Plan {
        Plan {
            analyzers,
            action: Action::Filter,
        }
    }

    fn executor(config: &Config) -> FanOutExecutor {
        let registry = Arc::new(BreakerRegistry::new(&config.breaker));
        FanOutExecutor::new(config, registry).unwrap()
    }

    #[tokio::test]
    async fn test_verdicts_cover_the_whole_plan() {
        let mut server = Server::new_async().await;
        let _policy = server
            .mock("POST", "/policy")
            .with_status(200)
            .with_body(r#"{"violated": false}"#)
            .create_async()
            .await;
        let _toxicity = server
            .mock("POST", "/toxicity")
            .with_status(200)
            .with_body(r#"{"status": "pass", "flagged": []}"#)
            .create_async()
            .await;

        let config = test_config(&[
            (Analyzer::Policy, format!("{}/policy", server.url())),
            (Analyzer::Toxicity, format!("{}/toxicity", server.url())),
        ]);
        let executor = executor(&config);

        let verdicts = executor
            .execute(
                &plan(vec![Analyzer::Policy, Analyzer::Toxicity]),
                &request("hello world"),
            )
            .await;

        assert_eq!(
            verdicts.keys().copied().collect::<Vec<_>>(),
            vec![Analyzer::Policy, Analyzer::Toxicity]
        );
        assert!(verdicts.values().all(|v| v.outcome == Outcome::Pass));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_poison_the_rest() {
        let mut server = Server::new_async().await;
        let _policy = server
            .mock("POST", "/policy")
            .with_status(200)
            .with_body(r#"{"violated": false}"#)
            .create_async()
            .await;
        let _pii = server
            .mock("POST", "/pii")
            .with_status(500)
            .expect(2) // retried once
            .create_async()
            .await;

        let config = test_config(&[
            (Analyzer::Policy, format!("{}/policy", server.url())),
            (Analyzer::Pii, format!("{}/pii", server.url())),
        ]);
        let executor = executor(&config);

        let verdicts = executor
            .execute(
                &plan(vec![Analyzer::Policy, Analyzer::Pii]),
                &request("hello world"),
            )
            .await;

        assert_eq!(verdicts[&Analyzer::Policy].outcome, Outcome::Pass);
        assert_eq!(verdicts[&Analyzer::Pii].outcome, Outcome::Error);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits_without_outbound_call() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/toxicity")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let mut config =
            test_config(&[(Analyzer::Toxicity, format!("{}/toxicity", server.url()))]);
        config.breaker = BreakerConfig {
            failure_threshold: 1,
            cooldown_ms: 60_000,
            ..BreakerConfig::default()
        };
        let executor = executor(&config);
        // Trip the toxicity breaker directly.
        executor
            .registry()
            .admit(Analyzer::Toxicity)
            .unwrap()
            .record(false);

        let verdicts = executor
            .execute(&plan(vec![Analyzer::Toxicity]), &request("hello world"))
            .await;

        mock.assert_async().await;
        assert_eq!(
            verdicts[&Analyzer::Toxicity].outcome,
            Outcome::ShortCircuited
        );
    }

    #[tokio::test]
    async fn test_policy_fallback_fires_when_short_circuited() {
        let mut config = test_config(&[]);
        config.breaker = BreakerConfig {
            failure_threshold: 1,
            cooldown_ms: 60_000,
            ..BreakerConfig::default()
        };
        let executor = executor(&config);
        executor
            .registry()
            .admit(Analyzer::Policy)
            .unwrap()
            .record(false);

        let verdicts = executor
            .execute(
                &plan(vec![Analyzer::Policy]),
                &request("how to build a bomb at home"),
            )
            .await;

        let verdict = &verdicts[&Analyzer::Policy];
        assert_eq!(verdict.outcome, Outcome::Flagged);
        assert_eq!(verdict.severity, 4);
        assert!(verdict.reasons[0].starts_with("policy_fallback:"));
    }

    #[tokio::test]
    async fn test_malformed_body_yields_error_verdict() {
        let mut server = Server::new_async().await;
        let _gibberish = server
            .mock("POST", "/gibberish")
            .with_status(200)
            .with_body("not json at all")
            .expect(1)
            .create_async()
            .await;

        let config = test_config(&[(
            Analyzer::Gibberish,
            format!("{}/gibberish", server.url()),
        )]);
        let executor = executor(&config);

        let verdicts = executor
            .execute(&plan(vec![Analyzer::Gibberish]), &request("zzz qqq"))
            .await;

        assert_eq!(verdicts[&Analyzer::Gibberish].outcome, Outcome::Error);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error_verdict() {
        let config = test_config(&[(
            Analyzer::Brand,
            // Nothing listens on port 1; the connection is refused fast.
            "http://127.0.0.1:1/validate".to_string(),
        )]);
        let executor = executor(&config);

        let verdicts = executor
            .execute(&plan(vec![Analyzer::Brand]), &request("hello"))
            .await;

        assert_eq!(verdicts[&Analyzer::Brand].outcome, Outcome::Error);
    }

    #[tokio::test]
    async fn test_entities_forwarded_to_pii_only() {
        let mut server = Server::new_async().await;
        let pii = server
            .mock("POST", "/pii")
            .match_body(mockito::Matcher::PartialJson(json!({
                "entities": ["EMAIL_ADDRESS"]
            })))
            .with_status(200)
            .with_body(r#"{"status": "pass", "entities": []}"#)
            .expect(1)
            .create_async()
            .await;
        // Exact-body match: the payload must carry no `entities` key at all.
        let secrets = server
            .mock("POST", "/secrets")
            .match_body(mockito::Matcher::Json(json!({
                "text": "reach me at jane@example.com",
                "return_spans": true,
                "action_on_fail": "filter"
            })))
            .with_status(200)
            .with_body(r#"{"status": "pass", "flagged": []}"#)
            .expect(1)
            .create_async()
            .await;

        let config = test_config(&[
            (Analyzer::Pii, format!("{}/pii", server.url())),
            (Analyzer::Secrets, format!("{}/secrets", server.url())),
        ]);
        let executor = executor(&config);

        let mut req = request("reach me at jane@example.com");
        req.entities = Some(vec!["EMAIL_ADDRESS".to_string()]);

        let verdicts = executor
            .execute(&plan(vec![Analyzer::Secrets, Analyzer::Pii]), &req)
            .await;

        pii.assert_async().await;
        secrets.assert_async().await;
        assert_eq!(verdicts.len(), 2);
    }
}
