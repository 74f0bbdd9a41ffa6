//! HTTP client for upstream analyzer calls.

use serde::Serialize;

use crate::config::AnalyzerEndpoint;
use crate::domain::{Action, Analyzer};

/// How an analyzer call failed, before adaptation into a verdict.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Connection-level failure (DNS, refused, reset). Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response. Retryable only for 5xx.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// 2xx response whose body is not JSON.
    #[error("malformed response body: {0}")]
    Malformed(String),

    /// The per-call deadline fired. Never retried.
    #[error("timeout")]
    Timeout,
}

impl CallError {
    /// Only transport errors and 5xx responses warrant the single retry:
    /// a 4xx means the upstream rejected the input, and a timeout has
    /// already used up the call's deadline.
    pub fn retryable(&self) -> bool {
        match self {
            CallError::Transport(_) => true,
            CallError::Status(status) => *status >= 500,
            CallError::Malformed(_) | CallError::Timeout => false,
        }
    }
}

/// Body POSTed to every analyzer.
#[derive(Debug, Serialize)]
pub struct OutboundPayload<'a> {
    pub text: &'a str,
    pub return_spans: bool,
    pub action_on_fail: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<&'a [String]>,
}

/// Client for one analyzer endpoint. Analyzer calls are side-effect free,
/// which is what makes the single immediate retry safe.
#[derive(Debug, Clone)]
pub struct AnalyzerClient {
    http: reqwest::Client,
    analyzer: Analyzer,
    endpoint: AnalyzerEndpoint,
}

impl AnalyzerClient {
    pub fn new(http: reqwest::Client, analyzer: Analyzer, endpoint: AnalyzerEndpoint) -> Self {
        Self {
            http,
            analyzer,
            endpoint,
        }
    }

    pub fn analyzer(&self) -> Analyzer {
        self.analyzer
    }

    pub fn endpoint(&self) -> &AnalyzerEndpoint {
        &self.endpoint
    }

    /// Issue the call, retrying at most once on a retryable error. The
    /// caller enforces the per-call deadline around this whole sequence.
    pub async fn call(&self, payload: &OutboundPayload<'_>) -> Result<serde_json::Value, CallError> {
        match self.attempt(payload).await {
            Err(error) if error.retryable() => {
                tracing::debug!(
                    analyzer = %self.analyzer,
                    error = %error,
                    "retrying analyzer call"
                );
                self.attempt(payload).await
            }
            other => other,
        }
    }

    async fn attempt(&self, payload: &OutboundPayload<'_>) -> Result<serde_json::Value, CallError> {
        let mut request = self.http.post(&self.endpoint.url).json(payload);
        if let Some(key) = &self.endpoint.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CallError::Timeout
            } else {
                CallError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallError::Status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| CallError::Malformed(e.to_string()))
    }
}
