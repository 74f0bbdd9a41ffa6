//! Configuration management.
//!
//! The whole configuration surface is environment variables with defaults
//! (`GATEWAY_*`, `BREAKER_*`, and one `<ANALYZER>_URL` / `<ANALYZER>_API_KEY`
//! / `<ANALYZER>_TIMEOUT_MS` triple per analyzer). Everything is read once at
//! startup and treated as immutable afterwards.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Analyzer;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {variable}: {message}")]
    Invalid {
        variable: &'static str,
        message: String,
    },

    #[error("configuration validation error: {0}")]
    Validation(String),
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Whether to expose interactive API docs (Swagger UI).
    pub enable_docs: bool,
    /// Outer request timeout applied at the HTTP layer, in seconds.
    pub request_timeout_seconds: u64,
    /// Allowed CORS origins. `["*"]` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8010,
            enable_docs: true,
            request_timeout_seconds: 30,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Inbound authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secrets accepted in the `X-API-Key` header. An empty list
    /// rejects every request; the gateway refuses to run open.
    pub api_keys: Vec<String>,
}

/// Request-path limits and deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Reject `text` larger than this many bytes.
    pub max_text_bytes: usize,
    /// Default per-outbound-call deadline in milliseconds.
    pub per_call_timeout_ms: u64,
    /// Request-wide fan-out deadline in milliseconds.
    pub global_deadline_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_text_bytes: 16_384,
            per_call_timeout_ms: 4_000,
            global_deadline_ms: 8_000,
        }
    }
}

impl LimitsConfig {
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn global_deadline(&self) -> Duration {
        Duration::from_millis(self.global_deadline_ms)
    }
}

/// Sanitizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Token substituted for flagged spans under the `mask` action.
    pub mask_token: String,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            mask_token: "***".to_string(),
        }
    }
}

/// Circuit breaker tuning, shared by every analyzer's breaker cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures in the trailing window that open the circuit.
    pub failure_threshold: u32,
    /// Size of the trailing completion window.
    pub window: usize,
    /// Failure ratio over the window that opens the circuit.
    pub ratio_threshold: f64,
    /// Completions required before the ratio rule applies.
    pub minimum_samples: usize,
    /// How long an open circuit waits before probing, in milliseconds.
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: 20,
            ratio_threshold: 0.5,
            minimum_samples: 10,
            cooldown_ms: 30_000,
        }
    }
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// One upstream analyzer endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerEndpoint {
    pub url: String,
    /// Shared secret forwarded to the analyzer.
    pub api_key: Option<String>,
    /// Per-analyzer override of the per-call timeout, in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl AnalyzerEndpoint {
    /// Effective per-call timeout given the gateway default.
    pub fn call_timeout(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

/// Default endpoint for an analyzer, matching the in-cluster service names
/// the fleet is deployed under.
fn default_endpoint(analyzer: Analyzer) -> AnalyzerEndpoint {
    let url = match analyzer {
        Analyzer::Pii => "http://pii-service:8000/validate",
        Analyzer::Toxicity => "http://toxicity-service:8001/validate",
        Analyzer::Policy => "http://policy-service:8002/validate",
        Analyzer::Bias => "http://bias-service:8003/validate",
        Analyzer::Brand => "http://ban-service:8004/validate",
        Analyzer::Secrets => "http://secrets-service:8005/validate",
        Analyzer::Format => "http://format-service:8006/validate",
        Analyzer::Gibberish => "http://gibberish-service:8007/validate",
        // The jailbreak service exposes /detect rather than /validate.
        Analyzer::Jailbreak => "http://jailbreak-service:5004/detect",
    };
    AnalyzerEndpoint {
        url: url.to_string(),
        api_key: None,
        timeout_ms: None,
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub limits: LimitsConfig,
    pub sanitizer: SanitizerConfig,
    pub breaker: BreakerConfig,
    pub logging: LoggingConfig,
    pub analyzers: BTreeMap<Analyzer, AnalyzerEndpoint>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            limits: LimitsConfig::default(),
            sanitizer: SanitizerConfig::default(),
            breaker: BreakerConfig::default(),
            logging: LoggingConfig::default(),
            analyzers: Analyzer::ALL
                .into_iter()
                .map(|a| (a, default_endpoint(a)))
                .collect(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let env: BTreeMap<String, String> = std::env::vars().collect();
        Self::from_kv(&env)
    }

    /// Build configuration from a key/value view of the environment.
    /// Split out from [`Config::load`] so tests can drive it without
    /// mutating process state.
    pub fn from_kv(kv: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(host) = non_empty(kv.get("GATEWAY_HOST")) {
            config.server.host = host.to_string();
        }
        config.server.port = parse_num(kv.get("GATEWAY_PORT"), config.server.port, "GATEWAY_PORT")?;
        if let Some(flag) = non_empty(kv.get("GATEWAY_ENABLE_DOCS")) {
            config.server.enable_docs = parse_bool(flag, "GATEWAY_ENABLE_DOCS")?;
        }
        if let Some(origins) = non_empty(kv.get("GATEWAY_ALLOWED_ORIGINS")) {
            config.server.allowed_origins = parse_csv(origins);
        }

        config.auth.api_keys = parse_csv(kv.get("GATEWAY_API_KEYS").map(String::as_str).unwrap_or(""));

        config.limits.max_text_bytes = parse_num(
            kv.get("MAX_TEXT_BYTES"),
            config.limits.max_text_bytes,
            "MAX_TEXT_BYTES",
        )?;
        config.limits.per_call_timeout_ms = parse_num(
            kv.get("PER_CALL_TIMEOUT_MS"),
            config.limits.per_call_timeout_ms,
            "PER_CALL_TIMEOUT_MS",
        )?;
        config.limits.global_deadline_ms = parse_num(
            kv.get("GLOBAL_DEADLINE_MS"),
            config.limits.global_deadline_ms,
            "GLOBAL_DEADLINE_MS",
        )?;

        if let Some(token) = kv.get("MASK_TOKEN").filter(|t| !t.is_empty()) {
            config.sanitizer.mask_token = token.to_string();
        }

        config.breaker.failure_threshold = parse_num(
            kv.get("BREAKER_FAILURE_THRESHOLD"),
            config.breaker.failure_threshold,
            "BREAKER_FAILURE_THRESHOLD",
        )?;
        config.breaker.window = parse_num(
            kv.get("BREAKER_WINDOW"),
            config.breaker.window,
            "BREAKER_WINDOW",
        )?;
        config.breaker.ratio_threshold = parse_num(
            kv.get("BREAKER_RATIO_THRESHOLD"),
            config.breaker.ratio_threshold,
            "BREAKER_RATIO_THRESHOLD",
        )?;
        config.breaker.minimum_samples = parse_num(
            kv.get("BREAKER_MINIMUM_SAMPLES"),
            config.breaker.minimum_samples,
            "BREAKER_MINIMUM_SAMPLES",
        )?;
        config.breaker.cooldown_ms = parse_num(
            kv.get("BREAKER_COOLDOWN_MS"),
            config.breaker.cooldown_ms,
            "BREAKER_COOLDOWN_MS",
        )?;

        if let Some(level) = non_empty(kv.get("GATEWAY_LOG_LEVEL")) {
            config.logging.level = level.to_string();
        }
        if let Some(format) = non_empty(kv.get("GATEWAY_LOG_FORMAT")) {
            config.logging.format = format.to_string();
        }

        for analyzer in Analyzer::ALL {
            let prefix = analyzer.as_str().to_uppercase();
            let endpoint = config
                .analyzers
                .get_mut(&analyzer)
                .expect("every analyzer has a default endpoint");

            if let Some(url) = non_empty(kv.get(&format!("{prefix}_URL"))) {
                endpoint.url = url.to_string();
            }
            if let Some(key) = non_empty(kv.get(&format!("{prefix}_API_KEY"))) {
                endpoint.api_key = Some(key.to_string());
            }
            if let Some(timeout) = non_empty(kv.get(&format!("{prefix}_TIMEOUT_MS"))) {
                let parsed: u64 = timeout.parse().map_err(|e| ConfigError::Invalid {
                    variable: "<ANALYZER>_TIMEOUT_MS",
                    message: format!("{prefix}_TIMEOUT_MS: {e}"),
                })?;
                endpoint.timeout_ms = Some(parsed);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Sanity-check the loaded configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_text_bytes == 0 {
            return Err(ConfigError::Validation(
                "MAX_TEXT_BYTES must be positive".to_string(),
            ));
        }
        if self.limits.per_call_timeout_ms == 0 || self.limits.global_deadline_ms == 0 {
            return Err(ConfigError::Validation(
                "timeouts must be positive".to_string(),
            ));
        }
        if self.breaker.window == 0 {
            return Err(ConfigError::Validation(
                "BREAKER_WINDOW must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.breaker.ratio_threshold) {
            return Err(ConfigError::Validation(
                "BREAKER_RATIO_THRESHOLD must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).map(str::trim).filter(|v| !v.is_empty())
}

fn parse_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(s: &str, variable: &'static str) -> Result<bool, ConfigError> {
    match s {
        "1" | "true" | "True" | "TRUE" => Ok(true),
        "0" | "false" | "False" | "FALSE" => Ok(false),
        other => Err(ConfigError::Invalid {
            variable,
            message: format!("expected boolean, got {other:?}"),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(
    value: Option<&String>,
    default: T,
    variable: &'static str,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match non_empty(value) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            variable,
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_cover_every_analyzer() {
        let config = Config::default();
        assert_eq!(config.analyzers.len(), Analyzer::ALL.len());
        assert_eq!(config.limits.per_call_timeout_ms, 4_000);
        assert_eq!(config.limits.global_deadline_ms, 8_000);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.sanitizer.mask_token, "***");
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_kv(&kv(&[
            ("GATEWAY_API_KEYS", "alpha, beta"),
            ("GATEWAY_PORT", "9000"),
            ("PII_URL", "http://127.0.0.1:18000/validate"),
            ("PII_API_KEY", "supersecret123"),
            ("PII_TIMEOUT_MS", "1500"),
            ("BREAKER_COOLDOWN_MS", "5000"),
            ("MASK_TOKEN", "[X]"),
        ]))
        .unwrap();

        assert_eq!(config.auth.api_keys, vec!["alpha", "beta"]);
        assert_eq!(config.server.port, 9000);
        let pii = &config.analyzers[&Analyzer::Pii];
        assert_eq!(pii.url, "http://127.0.0.1:18000/validate");
        assert_eq!(pii.api_key.as_deref(), Some("supersecret123"));
        assert_eq!(
            pii.call_timeout(Duration::from_millis(4_000)),
            Duration::from_millis(1_500)
        );
        assert_eq!(config.breaker.cooldown(), Duration::from_millis(5_000));
        assert_eq!(config.sanitizer.mask_token, "[X]");
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = Config::from_kv(&kv(&[("GATEWAY_PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_out_of_range_ratio_is_rejected() {
        let err = Config::from_kv(&kv(&[("BREAKER_RATIO_THRESHOLD", "1.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
