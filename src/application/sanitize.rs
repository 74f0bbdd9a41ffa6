//! Text sanitization: build `clean_text` from the original text, the chosen
//! mitigation action, and the flagged spans.
//!
//! All span arithmetic is over UTF-8 code points of the original text, so a
//! span can never split a multibyte character.

use std::collections::BTreeMap;

use crate::domain::action::REASK_PROMPT;
use crate::domain::verdict::merge_overlapping;
use crate::domain::{Action, Analyzer, Outcome, Span, Verdict};

use super::aggregate::Status;

/// Produce the sanitized text for a finished request.
pub fn sanitize(
    text: &str,
    status: Status,
    action: Action,
    verdicts: &BTreeMap<Analyzer, Verdict>,
    mask_token: &str,
) -> String {
    match status {
        // Blocked text is withheld no matter which action was requested.
        Status::Blocked => String::new(),
        Status::Pass => text.to_string(),
        // Nothing was scanned successfully; fail closed.
        Status::Error => String::new(),
        Status::Fixed => apply_action(text, action, verdicts, mask_token),
    }
}

fn apply_action(
    text: &str,
    action: Action,
    verdicts: &BTreeMap<Analyzer, Verdict>,
    mask_token: &str,
) -> String {
    match action {
        Action::Pass => text.to_string(),
        Action::Refrain => String::new(),
        Action::Reask => REASK_PROMPT.to_string(),
        Action::Mask => rewrite_spans(text, collect_spans(text, verdicts), |_| {
            Some(mask_token.to_string())
        }),
        Action::Filter => rewrite_spans(text, collect_spans(text, verdicts), |span| {
            span.replacement.clone()
        }),
    }
}

/// Gather spans from every flagged verdict, clamp them to the text, and
/// merge overlaps across analyzers so each region is rewritten exactly once.
fn collect_spans(text: &str, verdicts: &BTreeMap<Analyzer, Verdict>) -> Vec<Span> {
    let char_count = text.chars().count();
    let spans: Vec<Span> = verdicts
        .values()
        .filter(|v| v.outcome == Outcome::Flagged)
        .flat_map(|v| v.spans.iter().cloned())
        .filter_map(|mut span| {
            span.end = span.end.min(char_count);
            (span.start < span.end).then_some(span)
        })
        .collect();
    merge_overlapping(spans)
}

/// Rebuild the text in one pass, substituting each span with the value the
/// closure produces. `None` drops the span and collapses the whitespace
/// around it to a single space.
fn rewrite_spans<F>(text: &str, spans: Vec<Span>, substitute: F) -> String
where
    F: Fn(&Span) -> Option<String>,
{
    if spans.is_empty() {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    for span in &spans {
        // Whitespace collapsing below can move the cursor past the next
        // span's start; re-clamp instead of slicing backwards.
        if span.end <= cursor {
            continue;
        }
        let start = span.start.max(cursor);
        out.extend(&chars[cursor..start]);
        cursor = span.end;

        match substitute(span).filter(|r| !r.is_empty()) {
            Some(replacement) => out.push_str(&replacement),
            None => {
                // Dropped span: collapse flanking whitespace to one space.
                let ws_before = out.ends_with(|c: char| c.is_whitespace());
                let ws_after = chars.get(cursor).is_some_and(|c| c.is_whitespace());
                if ws_before && ws_after {
                    while out.ends_with(|c: char| c.is_whitespace()) {
                        out.pop();
                    }
                    out.push(' ');
                    while chars.get(cursor).is_some_and(|c| c.is_whitespace()) {
                        cursor += 1;
                    }
                }
            }
        }
    }

    out.extend(&chars[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn pii_verdict(spans: Vec<Span>) -> BTreeMap<Analyzer, Verdict> {
        let verdict = Verdict::flagged(Analyzer::Pii, 2, vec![], spans, Value::Null);
        BTreeMap::from([(Analyzer::Pii, verdict)])
    }

    #[test]
    fn test_pass_status_returns_text_unchanged() {
        let verdicts = pii_verdict(vec![Span::new(0, 5, "EMAIL")]);
        let out = sanitize("hello world", Status::Pass, Action::Mask, &verdicts, "***");
        assert_eq!(out, "hello world");
    }

    #[test]
    fn test_blocked_status_empties_text_regardless_of_action() {
        let verdicts = BTreeMap::new();
        for action in [Action::Pass, Action::Mask, Action::Filter, Action::Reask] {
            assert_eq!(
                sanitize("anything", Status::Blocked, action, &verdicts, "***"),
                ""
            );
        }
    }

    #[test]
    fn test_filter_uses_replacement() {
        let text = "Email me at jane@example.com";
        let spans = vec![Span::new(12, 28, "EMAIL").with_replacement("[EMAIL]")];
        let out = sanitize(text, Status::Fixed, Action::Filter, &pii_verdict(spans), "***");
        assert_eq!(out, "Email me at [EMAIL]");
    }

    #[test]
    fn test_filter_without_replacement_collapses_whitespace() {
        let text = "call 555-123-4567 now";
        let spans = vec![Span::new(5, 17, "PHONE")];
        let out = sanitize(text, Status::Fixed, Action::Filter, &pii_verdict(spans), "***");
        assert_eq!(out, "call now");
    }

    #[test]
    fn test_mask_replaces_span_with_token() {
        let text = "token sk-live-ABCDEF1234 leaked";
        let spans = vec![Span::new(6, 24, "SECRET")];
        let out = sanitize(text, Status::Fixed, Action::Mask, &pii_verdict(spans), "***");
        assert_eq!(out, "token *** leaked");
        assert!(!out.contains("sk-live"));
    }

    #[test]
    fn test_overlapping_spans_from_different_analyzers_rewrite_once() {
        let text = "she said something awful here";
        let mut verdicts = BTreeMap::new();
        verdicts.insert(
            Analyzer::Pii,
            Verdict::flagged(
                Analyzer::Pii,
                2,
                vec![],
                vec![Span::new(4, 14, "PERSON")],
                Value::Null,
            ),
        );
        verdicts.insert(
            Analyzer::Toxicity,
            Verdict::flagged(
                Analyzer::Toxicity,
                2,
                vec![],
                vec![Span::new(9, 24, "toxicity")],
                Value::Null,
            ),
        );
        let out = sanitize(text, Status::Fixed, Action::Mask, &verdicts, "***");
        assert_eq!(out, "she *** here");
    }

    #[test]
    fn test_multibyte_text_is_never_split() {
        let text = "héllo wörld née Zoë";
        // Span over "wörld" in code points: chars 6..11.
        let spans = vec![Span::new(6, 11, "WORD")];
        let out = sanitize(text, Status::Fixed, Action::Mask, &pii_verdict(spans), "***");
        assert_eq!(out, "héllo *** née Zoë");
        assert!(out.chars().count() > 0);
    }

    #[test]
    fn test_mask_is_idempotent_over_masked_regions() {
        let text = "secret sk-123 here";
        let spans = vec![Span::new(7, 13, "SECRET")];
        let verdicts = pii_verdict(spans);
        let once = sanitize(text, Status::Fixed, Action::Mask, &verdicts, "***");
        // Masking the already-clean text with spans over the mask token must
        // not resurrect the original content.
        let again_spans = vec![Span::new(7, 10, "SECRET")];
        let again = sanitize(&once, Status::Fixed, Action::Mask, &pii_verdict(again_spans), "***");
        assert!(!again.contains("sk-123"));
    }

    #[test]
    fn test_refrain_and_reask() {
        let verdicts = pii_verdict(vec![Span::new(0, 3, "X")]);
        assert_eq!(
            sanitize("abc def", Status::Fixed, Action::Refrain, &verdicts, "***"),
            ""
        );
        assert_eq!(
            sanitize("abc def", Status::Fixed, Action::Reask, &verdicts, "***"),
            REASK_PROMPT
        );
    }

    #[test]
    fn test_out_of_range_spans_are_clamped() {
        let text = "short";
        let spans = vec![Span::new(2, 999, "X"), Span::new(7, 9, "Y")];
        let out = sanitize(text, Status::Fixed, Action::Mask, &pii_verdict(spans), "***");
        assert_eq!(out, "sh***");
    }

    #[test]
    fn test_error_status_fails_closed() {
        let verdicts = BTreeMap::new();
        assert_eq!(
            sanitize("anything", Status::Error, Action::Pass, &verdicts, "***"),
            ""
        );
    }
}
