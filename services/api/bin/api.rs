//! Main Entrypoint for the Role-Play API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the completion executor, session controller and question generator,
//!    and starting idle session eviction.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use roleplay_api::{config::Config, router::create_router, state::AppState};
use roleplay_core::{ScenarioRegistry, SessionController, questions::QuestionGenerator};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
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
    let registry = Arc::new(ScenarioRegistry::builtin());
    let executor = config.provider.build_executor();
    let controller = SessionController::new(
        registry.clone(),
        executor.clone(),
        config.provider.completion.clone(),
    );
    let questions = QuestionGenerator::new(executor, config.provider.completion.model.clone());
    let app_state = Arc::new(AppState::new(controller, questions));
    info!(scenarios = registry.len(), "Scenario registry loaded.");

    if let Some(max_idle) = config.session_idle_timeout {
        let period = (max_idle / 4).max(Duration::from_secs(1));
        app_state
            .sessions
            .clone()
            .spawn_idle_sweeper(max_idle, period);
        info!(?max_idle, "Idle session eviction enabled.");
    }

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        provider = ?config.provider.provider,
        model = %config.provider.completion.model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
