//! Presentation DTOs for the HTTP surface.

use std::collections::BTreeMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::application::aggregate::Status;
use crate::application::errors::GatewayError;
use crate::application::moderation::Moderation;
use crate::domain::{Analyzer, Verdict};
use crate::infrastructure::BreakerState;

// The request body schema lives beside the normalizer; re-exported here so
// the HTTP layer and OpenAPI docs reference one type.
pub use crate::application::normalize::RawValidateRequest;

/// Unified moderation response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModerationResponse {
    pub status: Status,
    pub clean_text: String,
    /// Analyzers that contributed to a non-pass status, in canonical
    /// priority order.
    pub blocked_categories: Vec<Analyzer>,
    pub reasons: Vec<String>,
    /// Per-analyzer verdicts, upstream bodies included.
    #[schema(value_type = Object)]
    pub results: BTreeMap<Analyzer, Verdict>,
}

impl From<Moderation> for ModerationResponse {
    fn from(moderation: Moderation) -> Self {
        Self {
            status: moderation.status,
            clean_text: moderation.clean_text,
            blocked_categories: moderation.blocked_categories,
            reasons: moderation.reasons,
            results: moderation.results,
        }
    }
}

/// Body of every non-2xx JSON response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Health probe response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Per-analyzer breaker states; may be slightly stale.
    #[schema(value_type = Object)]
    pub breakers: BTreeMap<Analyzer, BreakerState>,
}

/// One row of the analyzer listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalyzerInfo {
    pub name: Analyzer,
    pub breaker: BreakerState,
}

/// Deterministic listing of the configured analyzer fleet.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalyzersResponse {
    pub total: usize,
    /// Configured analyzers in priority order.
    pub analyzers: Vec<AnalyzerInfo>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            // 401 carries no body at all.
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED.into_response(),
            GatewayError::InvalidInput { reason } => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    status: "invalid_input",
                    reason: Some(reason),
                }),
            )
                .into_response(),
            GatewayError::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    status: "shutting_down",
                    reason: None,
                }),
            )
                .into_response(),
            GatewayError::Internal(message) => {
                tracing::error!(error = %message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        status: "error",
                        reason: None,
                    }),
                )
                    .into_response()
            }
        }
    }
}
