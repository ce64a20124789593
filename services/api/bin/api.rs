//! Main Entrypoint for the G1 Voice API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the voice agent connector and the session registry.
//! 3. Constructing the Axum router.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use g1_voice_api::{
    config::Config, provider::ElevenLabsConnector, router::create_router, state::AppState,
};
use g1_voice_core::SessionRegistry;
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info, warn};

/// Waits for `Ctrl+C` or SIGTERM, then tears down every live session.
async fn shutdown_signal(registry: Arc<SessionRegistry>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal. Shutting down gracefully...");
    let closed = registry.shutdown().await;
    info!(closed, "All sessions cleaned up");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let credentials = config.credentials();
    if let Err(e) = credentials.validate() {
        warn!(error = %e, "Voice agent credentials incomplete; sessions will fail to start");
    }
    let connector = Arc::new(ElevenLabsConnector::new(config.agent_endpoint.clone()));
    let registry = Arc::new(SessionRegistry::new(
        connector,
        credentials,
        config.connection_options(),
    ));

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        registry: registry.clone(),
    });

    // --- 4. Create Router ---
    let app = create_router(app_state);

    // --- 5. Start Server ---
    info!(
        package_name = %config.package_name,
        agent_endpoint = %config.agent_endpoint,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(registry))
    .await?;

    info!("Server has shut down.");
    Ok(())
}
