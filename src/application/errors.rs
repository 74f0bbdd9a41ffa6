//! Gateway error taxonomy.
//!
//! Analyzer-level failures never surface here: they are folded into verdicts
//! by the fan-out executor. Only caller mistakes and internal defects become
//! request-level errors.

/// Request-level errors, mapped to HTTP responses by the presentation layer.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing or unknown API key. Surfaced as 401 with an empty body.
    #[error("unauthenticated")]
    Unauthenticated,

    /// The request body failed validation. Surfaced as 400 with a reason.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The server is draining connections before exit.
    #[error("shutting down")]
    ShuttingDown,

    /// An uncaught defect. Surfaced as 500 without internals.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        GatewayError::InvalidInput {
            reason: reason.into(),
        }
    }
}
