//! Modgate — main application entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::{net::TcpListener, signal};

use modgate::{Config, create_app, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Using default configuration");
        Config::default()
    });

    init_tracing(&config.logging)?;

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        analyzers = config.analyzers.len(),
        "Starting moderation gateway"
    );
    if config.auth.api_keys.is_empty() {
        tracing::warn!(
            "GATEWAY_API_KEYS is empty; every inbound request will be rejected with 401"
        );
    }

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let app = create_app(config)?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {addr}");

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal(app.shutting_down))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then flip the shutdown flag so handlers
/// refuse new work while the listener drains.
async fn shutdown_signal(shutting_down: Arc<AtomicBool>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }

    shutting_down.store(true, Ordering::Relaxed);
}
