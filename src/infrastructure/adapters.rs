//! Per-analyzer response adapters.
//!
//! Every upstream has its own body shape; each adapter knows one analyzer's
//! field names and produces the common [`Verdict`]. Adapters never fail:
//! an unrecognisable body becomes an `error` verdict, which the executor
//! counts as a breaker failure. Adding an analyzer means one adapter arm and
//! one configuration entry; the breaker, executor, and aggregator are
//! untouched.

use serde_json::Value;

use crate::domain::{Analyzer, Span, Verdict};

/// Normalize one analyzer's raw JSON body into a verdict.
pub fn adapt(analyzer: Analyzer, raw: Value) -> Verdict {
    match analyzer {
        Analyzer::Policy => adapt_banlist(analyzer, raw, 4),
        Analyzer::Secrets => adapt_secrets(raw),
        Analyzer::Pii => adapt_pii(raw),
        Analyzer::Jailbreak => adapt_jailbreak(raw),
        Analyzer::Toxicity => adapt_toxicity(raw),
        Analyzer::Bias => adapt_banlist(analyzer, raw, 2),
        Analyzer::Brand => adapt_banlist(analyzer, raw, 2),
        Analyzer::Gibberish => adapt_gibberish(raw),
        Analyzer::Format => adapt_format(raw),
    }
}

/// Policy, bias, and ban/brand all answer in the banlist-match shape:
/// `{status, flagged: [{pattern, category, severity, start?, end?}], reasons}`,
/// with `violated` as an alternate discriminator on older deployments.
fn adapt_banlist(analyzer: Analyzer, raw: Value, default_severity: u8) -> Verdict {
    let violated = raw
        .get("violated")
        .and_then(Value::as_bool)
        .or_else(|| status_flag(&raw));

    let Some(violated) = violated else {
        return malformed(analyzer, raw);
    };
    if !violated {
        return Verdict::pass(analyzer, raw);
    }

    let flags = flag_entries(&raw, "flagged");
    let severity = flags
        .iter()
        .filter_map(|f| f.get("severity").and_then(Value::as_u64))
        .chain(raw.get("severity").and_then(Value::as_u64))
        .max()
        .map(|s| s.min(4) as u8)
        .unwrap_or(default_severity);
    let spans = collect_flag_spans(&flags, &["category", "pattern"]);
    let reasons = string_array(raw.get("reasons"));

    Verdict::flagged(analyzer, severity, reasons, spans, raw)
}

/// Secrets service: `{status, flagged: [{category, start, end, severity,
/// engine}], reasons}`.
fn adapt_secrets(raw: Value) -> Verdict {
    let Some(violated) = status_flag(&raw) else {
        return malformed(Analyzer::Secrets, raw);
    };
    if !violated {
        return Verdict::pass(Analyzer::Secrets, raw);
    }

    let flags = flag_entries(&raw, "flagged");
    let severity = flags
        .iter()
        .filter_map(|f| f.get("severity").and_then(Value::as_u64))
        .max()
        .map(|s| s.min(4) as u8)
        .unwrap_or(3);
    let spans = collect_flag_spans(&flags, &["category", "id"]);
    let reasons = string_array(raw.get("reasons"));

    Verdict::flagged(Analyzer::Secrets, severity, reasons, spans, raw)
}

/// PII service: `{status, entities: [{type, start, end, score, replacement}],
/// reasons}`. The entity list, not the status word, is authoritative.
fn adapt_pii(raw: Value) -> Verdict {
    let Some(entities) = raw.get("entities").and_then(Value::as_array) else {
        // Fall back to the status word for detectors that omit the list.
        return match status_flag(&raw) {
            Some(false) => Verdict::pass(Analyzer::Pii, raw),
            Some(true) => Verdict::flagged(
                Analyzer::Pii,
                2,
                string_array(raw.get("reasons")),
                Vec::new(),
                raw,
            ),
            None => malformed(Analyzer::Pii, raw),
        };
    };

    if entities.is_empty() {
        return Verdict::pass(Analyzer::Pii, raw);
    }

    let spans = entities
        .iter()
        .filter_map(|entity| {
            let start = entity.get("start")?.as_u64()? as usize;
            let end = entity.get("end")?.as_u64()? as usize;
            let label = entity
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("PII")
                .to_string();
            let mut span = Span::new(start, end, label);
            if let Some(replacement) = entity.get("replacement").and_then(Value::as_str) {
                span = span.with_replacement(replacement);
            }
            Some(span)
        })
        .collect();

    Verdict::flagged(
        Analyzer::Pii,
        2,
        string_array(raw.get("reasons")),
        spans,
        raw,
    )
}

/// Jailbreak service, both generations: the RoBERTa shape
/// `{prediction: "jailbreak"|"benign", confidence, reasoning}` and the
/// legacy `{status: "blocked"|"pass"}` shape.
fn adapt_jailbreak(raw: Value) -> Verdict {
    if let Some(prediction) = raw.get("prediction").and_then(Value::as_str) {
        return match prediction {
            "benign" => Verdict::pass(Analyzer::Jailbreak, raw),
            "jailbreak" => {
                let mut reasons = vec!["Jailbreak attempt detected".to_string()];
                if let Some(reasoning) = raw.get("reasoning").and_then(Value::as_str) {
                    reasons.push(reasoning.to_string());
                }
                Verdict::flagged(Analyzer::Jailbreak, 4, reasons, Vec::new(), raw)
            }
            _ => malformed(Analyzer::Jailbreak, raw),
        };
    }

    match status_flag(&raw) {
        Some(false) => Verdict::pass(Analyzer::Jailbreak, raw),
        Some(true) => Verdict::flagged(
            Analyzer::Jailbreak,
            4,
            vec!["Jailbreak attempt detected".to_string()],
            Vec::new(),
            raw,
        ),
        None => malformed(Analyzer::Jailbreak, raw),
    }
}

/// Toxicity service: `{status, flagged: [{type, score, span: [s, e]}],
/// scores, reasons}`.
fn adapt_toxicity(raw: Value) -> Verdict {
    let Some(violated) = status_flag(&raw) else {
        return malformed(Analyzer::Toxicity, raw);
    };
    let flags = flag_entries(&raw, "flagged");
    if !violated && flags.is_empty() {
        return Verdict::pass(Analyzer::Toxicity, raw);
    }

    // Threats and severe toxicity block; everything else is fixable.
    let severity = if flags.iter().any(|f| {
        matches!(
            f.get("type").and_then(Value::as_str),
            Some("severe_toxicity") | Some("threat")
        )
    }) {
        4
    } else {
        2
    };
    let spans = collect_flag_spans(&flags, &["type"]);
    let reasons = string_array(raw.get("reasons"));

    Verdict::flagged(Analyzer::Toxicity, severity, reasons, spans, raw)
}

/// Gibberish service: `{is_gibberish, confidence, label}` where label is one
/// of clean / mild gibberish / word salad / noise.
fn adapt_gibberish(raw: Value) -> Verdict {
    let Some(is_gibberish) = raw.get("is_gibberish").and_then(Value::as_bool) else {
        return malformed(Analyzer::Gibberish, raw);
    };
    let label = raw.get("label").and_then(Value::as_str).unwrap_or("");

    if !is_gibberish || label == "clean" {
        return Verdict::pass(Analyzer::Gibberish, raw);
    }

    let severity = match label {
        "noise" => 3,
        "mild gibberish" => 1,
        _ => 2,
    };
    let reason = if label.is_empty() {
        "Gibberish detected".to_string()
    } else {
        format!("Gibberish detected ({label})")
    };

    Verdict::flagged(Analyzer::Gibberish, severity, vec![reason], Vec::new(), raw)
}

/// Format service: `{valid: bool, issues: [...]}` with `status` as an
/// alternate discriminator.
fn adapt_format(raw: Value) -> Verdict {
    let violated = raw
        .get("valid")
        .and_then(Value::as_bool)
        .map(|valid| !valid)
        .or_else(|| status_flag(&raw));

    let Some(violated) = violated else {
        return malformed(Analyzer::Format, raw);
    };
    if !violated {
        return Verdict::pass(Analyzer::Format, raw);
    }

    let mut reasons: Vec<String> = raw
        .get("issues")
        .and_then(Value::as_array)
        .map(|issues| {
            issues
                .iter()
                .filter_map(|issue| {
                    issue
                        .as_str()
                        .map(str::to_string)
                        .or_else(|| issue.get("message")?.as_str().map(str::to_string))
                })
                .collect()
        })
        .unwrap_or_default();
    if reasons.is_empty() {
        reasons = string_array(raw.get("reasons"));
    }

    Verdict::flagged(Analyzer::Format, 1, reasons, Vec::new(), raw)
}

// ── shared extraction helpers ────────────────────────────────────────

/// Interpret a `status` word: `pass` is clean, the mitigation statuses all
/// mean the analyzer found something, anything else is unrecognised.
fn status_flag(raw: &Value) -> Option<bool> {
    match raw.get("status")?.as_str()? {
        "pass" | "ok" => Some(false),
        "blocked" | "fixed" | "refrain" | "fail" => Some(true),
        _ => None,
    }
}

fn flag_entries<'a>(raw: &'a Value, key: &str) -> Vec<&'a Value> {
    raw.get(key)
        .and_then(Value::as_array)
        .map(|flags| flags.iter().collect())
        .unwrap_or_default()
}

/// Pull spans out of flag entries, accepting either `start`/`end` fields or
/// a two-element `span` array. The first present label key names the span.
fn collect_flag_spans(flags: &[&Value], label_keys: &[&str]) -> Vec<Span> {
    flags
        .iter()
        .filter_map(|flag| {
            let (start, end) = span_bounds(flag)?;
            let label = label_keys
                .iter()
                .find_map(|key| flag.get(key).and_then(Value::as_str))
                .unwrap_or("flagged")
                .to_string();
            Some(Span::new(start, end, label))
        })
        .collect()
}

fn span_bounds(flag: &Value) -> Option<(usize, usize)> {
    if let (Some(start), Some(end)) = (
        flag.get("start").and_then(Value::as_u64),
        flag.get("end").and_then(Value::as_u64),
    ) {
        return Some((start as usize, end as usize));
    }
    let span = flag.get("span")?.as_array()?;
    Some((span.first()?.as_u64()? as usize, span.get(1)?.as_u64()? as usize))
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn malformed(analyzer: Analyzer, raw: Value) -> Verdict {
    let mut verdict = Verdict::error(analyzer, "unrecognised response shape");
    verdict.raw = raw;
    verdict
}
