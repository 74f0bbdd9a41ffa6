//! Application setup and wiring.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use axum::Router;

use crate::application::ModerationUseCase;
use crate::config::Config;
use crate::infrastructure::{BreakerRegistry, FanOutExecutor};
use crate::presentation::{AppState, create_router};

/// Handle returned from [`create_app`] for shutdown coordination.
pub struct AppHandle {
    pub router: Router,
    /// Flipped when shutdown begins; in-flight handlers then answer 503.
    pub shutting_down: Arc<AtomicBool>,
}

/// Wire the breaker registry, fan-out executor, and use case into a router.
pub fn create_app(config: Config) -> Result<AppHandle, reqwest::Error> {
    let config = Arc::new(config);
    let registry = Arc::new(BreakerRegistry::new(&config.breaker));
    let executor = Arc::new(FanOutExecutor::new(&config, Arc::clone(&registry))?);
    let moderation = Arc::new(ModerationUseCase::new(
        executor,
        config.sanitizer.mask_token.clone(),
    ));
    let shutting_down = Arc::new(AtomicBool::new(false));

    let state = AppState {
        config: Arc::clone(&config),
        moderation,
        registry,
        shutting_down: Arc::clone(&shutting_down),
    };

    let router = create_router(state, &config);
    Ok(AppHandle {
        router,
        shutting_down,
    })
}
