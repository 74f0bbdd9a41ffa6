//! Core domain model: analyzers, mitigation actions, verdicts, spans.

pub mod action;
pub mod analyzer;
pub mod verdict;

pub use action::Action;
pub use analyzer::Analyzer;
pub use verdict::{Outcome, Span, Verdict};
