// SPDX-License-Identifier: MIT

//! Motion4Good API Server
//!
//! Serves the challenge, session and reward APIs backed by an
//! in-memory store and an external motion detection service.

use motion4good::{
    config::Config,
    db::ChallengeStore,
    services::{MotionClient, SessionService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Motion4Good API");

    // Initialize in-memory store
    let store = ChallengeStore::new();

    // Initialize motion detection service client
    let motion = MotionClient::new(&config.motion_service_url);
    tracing::info!(
        url = %config.motion_service_url,
        "Motion service client initialized"
    );

    // Initialize session tracking service
    let sessions = SessionService::new(store.clone(), motion.clone(), &config);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        motion,
        sessions,
    });

    // Build router
    let app = motion4good::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("motion4good=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
