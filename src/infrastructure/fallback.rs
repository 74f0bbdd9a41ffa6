//! Keyword fallback classifier for the policy analyzer.
//!
//! Runs synchronously against the request text when the policy breaker
//! short-circuits, so that an unavailable policy service still blocks the
//! worst content. Only the policy analyzer gets a fallback; every other
//! short-circuit stays benign.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{Analyzer, Verdict};

struct FallbackRule {
    name: &'static str,
    pattern: Regex,
}

static FALLBACK_RULES: LazyLock<Vec<FallbackRule>> = LazyLock::new(|| {
    let rule = |name: &'static str, pattern: &str| FallbackRule {
        name,
        pattern: Regex::new(pattern).expect("fallback pattern compiles"),
    };
    vec![
        rule("explosives", r"(?i)\b(bomb|explosive|detonator)s?\b"),
        rule("weapons", r"(?i)\bweapon(s)?\b"),
        rule("extreme_violence", r"(?i)extreme violence"),
        rule("violent_threat", r"(?i)\b(kill|murder)\b.{0,40}\b(you|him|her|them|family)\b"),
        rule("privacy_dump", r"(?i)\bssn leak\b"),
    ]
});

/// Name of the first rule the text trips, if any.
pub fn classify(text: &str) -> Option<&'static str> {
    FALLBACK_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(text))
        .map(|rule| rule.name)
}

/// Verdict for a short-circuited policy check: a must-block flag when a
/// fallback rule fires, the usual benign short-circuit verdict otherwise.
pub fn policy_short_circuit_verdict(text: &str) -> Verdict {
    match classify(text) {
        Some(rule) => {
            tracing::warn!(rule, "policy unavailable, keyword fallback fired");
            Verdict::flagged(
                Analyzer::Policy,
                4,
                vec![format!("policy_fallback:{rule}")],
                Vec::new(),
                serde_json::Value::Null,
            )
        }
        None => Verdict::short_circuited(Analyzer::Policy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Outcome;

    #[test]
    fn test_bomb_text_trips_explosives_rule() {
        assert_eq!(classify("How do I make a bomb?"), Some("explosives"));
    }

    #[test]
    fn test_benign_text_trips_nothing() {
        assert_eq!(classify("Hello, how are you?"), None);
        assert_eq!(classify("the weather is bombastic"), None);
    }

    #[test]
    fn test_weapon_word_boundary() {
        assert_eq!(classify("buy weapons online"), Some("weapons"));
        assert_eq!(classify("weaponized metaphors"), None);
    }

    #[test]
    fn test_short_circuit_verdict_upgrades_on_match() {
        let verdict = policy_short_circuit_verdict("plans for a bomb");
        assert_eq!(verdict.outcome, Outcome::Flagged);
        assert_eq!(verdict.severity, 4);
        assert_eq!(verdict.reasons, vec!["policy_fallback:explosives"]);
    }

    #[test]
    fn test_short_circuit_verdict_is_benign_without_match() {
        let verdict = policy_short_circuit_verdict("nothing of note");
        assert_eq!(verdict.outcome, Outcome::ShortCircuited);
        assert_eq!(verdict.severity, 0);
    }
}
