//! Mitigation actions applied to flagged text.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Canned reply used by [`Action::Reask`].
pub const REASK_PROMPT: &str = "Your input could not be processed; please rephrase.";

/// What to do with the text when a request ends up `fixed`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Leave the text untouched.
    Pass,
    /// Replace flagged spans with the mask token.
    Mask,
    /// Drop flagged spans, substituting their replacement when one exists.
    #[default]
    Filter,
    /// Return an empty body.
    Refrain,
    /// Return a fixed re-ask prompt.
    Reask,
}

impl Action {
    /// Parse a request-supplied action name. Unrecognised values are a
    /// caller error, so this returns `None` rather than defaulting.
    pub fn parse(name: &str) -> Option<Action> {
        match name {
            "pass" => Some(Action::Pass),
            "mask" => Some(Action::Mask),
            "filter" => Some(Action::Filter),
            "refrain" => Some(Action::Refrain),
            "reask" => Some(Action::Reask),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Pass => "pass",
            Action::Mask => "mask",
            Action::Filter => "filter",
            Action::Refrain => "refrain",
            Action::Reask => "reask",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
