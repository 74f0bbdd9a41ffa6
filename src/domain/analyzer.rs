//! Analyzer identifiers and their canonical priority ordering.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Upstream moderation analyzers the gateway can fan out to.
///
/// Declaration order is the canonical priority order: it drives the ordering
/// of `blocked_categories`, reason assembly, and every other place the
/// gateway must be deterministic about analyzer ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Analyzer {
    Policy,
    Secrets,
    Pii,
    Jailbreak,
    Toxicity,
    Bias,
    Brand,
    Gibberish,
    Format,
}

impl Analyzer {
    /// All analyzers in priority order.
    pub const ALL: [Analyzer; 9] = [
        Analyzer::Policy,
        Analyzer::Secrets,
        Analyzer::Pii,
        Analyzer::Jailbreak,
        Analyzer::Toxicity,
        Analyzer::Bias,
        Analyzer::Brand,
        Analyzer::Gibberish,
        Analyzer::Format,
    ];

    /// Stable wire name, also used in configuration variable prefixes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Analyzer::Policy => "policy",
            Analyzer::Secrets => "secrets",
            Analyzer::Pii => "pii",
            Analyzer::Jailbreak => "jailbreak",
            Analyzer::Toxicity => "toxicity",
            Analyzer::Bias => "bias",
            Analyzer::Brand => "brand",
            Analyzer::Gibberish => "gibberish",
            Analyzer::Format => "format",
        }
    }

    /// Parse a wire name. Unknown names yield `None` so callers can ignore
    /// them (forward compatibility for `checks` keys).
    pub fn parse(name: &str) -> Option<Analyzer> {
        match name {
            "policy" => Some(Analyzer::Policy),
            "secrets" => Some(Analyzer::Secrets),
            "pii" => Some(Analyzer::Pii),
            "jailbreak" => Some(Analyzer::Jailbreak),
            "toxicity" => Some(Analyzer::Toxicity),
            "bias" => Some(Analyzer::Bias),
            "brand" => Some(Analyzer::Brand),
            "gibberish" => Some(Analyzer::Gibberish),
            "format" => Some(Analyzer::Format),
            _ => None,
        }
    }

    /// Human reason attached when this analyzer contributes to a non-pass
    /// status and the upstream supplied no reason of its own.
    pub fn default_reason(&self) -> &'static str {
        match self {
            Analyzer::Policy => "Policy violation detected",
            Analyzer::Secrets => "Secrets detected",
            Analyzer::Pii => "PII detected",
            Analyzer::Jailbreak => "Jailbreak attempt detected",
            Analyzer::Toxicity => "Toxic content detected",
            Analyzer::Bias => "Biased content detected",
            Analyzer::Brand => "Banned content detected",
            Analyzer::Gibberish => "Gibberish detected",
            Analyzer::Format => "Format issues detected",
        }
    }
}

impl std::fmt::Display for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
