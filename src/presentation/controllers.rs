//! HTTP handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;

use crate::application::errors::GatewayError;
use crate::application::moderation::ModerationUseCase;
use crate::application::normalize::normalize;
use crate::config::Config;
use crate::domain::Analyzer;
use crate::infrastructure::BreakerRegistry;

use super::auth;
use super::models::{
    AnalyzerInfo, AnalyzersResponse, HealthResponse, ModerationResponse, RawValidateRequest,
};

/// Shared application state, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub moderation: Arc<ModerationUseCase>,
    pub registry: Arc<BreakerRegistry>,
    pub shutting_down: Arc<AtomicBool>,
}

/// Multi-analyzer moderation endpoint.
#[utoipa::path(
    post,
    path = "/validate",
    request_body = RawValidateRequest,
    responses(
        (status = 200, description = "Moderation decision, including blocked", body = ModerationResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Missing or unknown API key"),
        (status = 503, description = "Server shutting down"),
    ),
    tag = "moderation"
)]
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RawValidateRequest>, JsonRejection>,
) -> Result<Json<ModerationResponse>, GatewayError> {
    moderate(&state, &headers, body, None).await.map(Json)
}

/// Single-analyzer moderation endpoint: `POST /{analyzer}` behaves like
/// `/validate` with `checks` forced to that analyzer alone.
#[utoipa::path(
    post,
    path = "/{analyzer}",
    params(("analyzer" = String, Path, description = "Analyzer name")),
    request_body = RawValidateRequest,
    responses(
        (status = 200, description = "Moderation decision from one analyzer", body = ModerationResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Missing or unknown API key"),
    ),
    tag = "moderation"
)]
pub async fn validate_single(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Result<Json<RawValidateRequest>, JsonRejection>,
) -> Result<Json<ModerationResponse>, GatewayError> {
    moderate(&state, &headers, body, Some(&name)).await.map(Json)
}

/// Liveness probe with a breaker snapshot.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Gateway is up", body = HealthResponse)),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        breakers: state.registry.snapshot(),
    })
}

/// Deterministic listing of the analyzer fleet.
#[utoipa::path(
    get,
    path = "/analyzers",
    responses((status = 200, description = "Configured analyzers in priority order", body = AnalyzersResponse)),
    tag = "health"
)]
pub async fn list_analyzers(State(state): State<AppState>) -> Json<AnalyzersResponse> {
    let snapshot = state.registry.snapshot();
    let analyzers: Vec<AnalyzerInfo> = state
        .config
        .analyzers
        .keys()
        .map(|&name| AnalyzerInfo {
            name,
            breaker: snapshot[&name],
        })
        .collect();
    Json(AnalyzersResponse {
        total: analyzers.len(),
        analyzers,
    })
}

/// Shared request pipeline: shutdown gate, auth, input validation,
/// normalization, then the moderation use case. The shutdown and auth gates
/// run before any input validation so a bad request never masks a 503 or
/// 401.
async fn moderate(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Json<RawValidateRequest>, JsonRejection>,
    forced: Option<&str>,
) -> Result<ModerationResponse, GatewayError> {
    if state.shutting_down.load(Ordering::Relaxed) {
        return Err(GatewayError::ShuttingDown);
    }

    auth::authenticate(headers, &state.config.auth.api_keys)?;

    let forced = forced
        .map(|name| {
            Analyzer::parse(name)
                .ok_or_else(|| GatewayError::invalid(format!("unknown analyzer {name:?}")))
        })
        .transpose()?;

    let Json(raw) = body.map_err(|rejection| GatewayError::invalid(rejection.body_text()))?;
    let mut request = normalize(raw, &state.config.limits)?;

    if let Some(analyzer) = forced {
        request.checks = Analyzer::ALL.into_iter().map(|a| (a, a == analyzer)).collect();
    }

    Ok(state.moderation.execute(request).await.into())
}
