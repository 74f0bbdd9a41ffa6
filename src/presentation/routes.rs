//! Route definitions and middleware stack.

use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::presentation::controllers::{
    AppState, health, list_analyzers, validate, validate_single,
};
use crate::presentation::models::*;

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::presentation::controllers::validate,
        crate::presentation::controllers::validate_single,
        crate::presentation::controllers::health,
        crate::presentation::controllers::list_analyzers,
    ),
    components(schemas(
        RawValidateRequest,
        ModerationResponse,
        ErrorResponse,
        HealthResponse,
        AnalyzersResponse,
        AnalyzerInfo,
    )),
    tags(
        (name = "moderation", description = "Content moderation endpoints"),
        (name = "health", description = "Health and fleet observability endpoints")
    ),
    info(
        title = "Modgate API",
        description = "Content-moderation gateway in front of a fleet of moderation analyzers.",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    )
)]
pub struct ApiDoc;

/// Create the application router with the middleware stack.
pub fn create_router(app_state: AppState, config: &Config) -> Router {
    let mut router = Router::new()
        .route("/validate", post(validate))
        .route("/health", get(health))
        .route("/analyzers", get(list_analyzers));

    // Forced-single-analyzer route, same semantics as /validate with that
    // check alone.
    router = router.route("/{analyzer}", post(validate_single));

    if config.server.enable_docs {
        router =
            router.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    let cors_layer = build_cors_layer(config);

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer)
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_seconds,
                ))),
        )
        .with_state(app_state)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::OPTIONS,
    ];
    let headers = [
        axum::http::header::CONTENT_TYPE,
        axum::http::header::ACCEPT,
        axum::http::HeaderName::from_static("x-api-key"),
    ];

    if config.server.allowed_origins.len() == 1 && config.server.allowed_origins[0] == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(Duration::from_secs(3600))
    } else {
        let mut layer = CorsLayer::new();
        for origin in &config.server.allowed_origins {
            match axum::http::HeaderValue::from_str(origin) {
                Ok(origin_header) => {
                    layer = layer.allow_origin(origin_header);
                }
                Err(_) => {
                    tracing::warn!(origin, "invalid CORS origin in config; skipping");
                }
            }
        }
        layer
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(Duration::from_secs(3600))
    }
}
