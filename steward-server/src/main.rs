use anyhow::{Context, Result};
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use steward_server::clock::SystemClock;
use steward_server::config::Config;
use steward_server::dashboard::dashboard_router;
use steward_server::interaction::interaction_router;
use steward_server::platform::discord::DiscordClient;
use steward_server::scheduler::review_sweep_loop;
use steward_server::store::sqlite::SqliteDocumentStore;
use steward_server::{AppState, Orchestrator};

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "steward"
    })))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting steward");

    let config =
        Config::from_env().expect("Failed to load configuration from environment variables");

    let db_path = config.state_dir.join("steward.db");
    info!("Using document store: {}", db_path.display());
    let store = SqliteDocumentStore::new(&db_path).expect("Failed to initialize SQLite database");

    let platform = DiscordClient::new(
        config.discord_bot_token.clone(),
        config.discord_application_id,
    );

    let orchestrator = Orchestrator::new(
        Arc::new(platform),
        Arc::new(store),
        Arc::new(SystemClock),
        config.timing,
    );

    orchestrator
        .load_owners(config.owner_ids.iter().copied())
        .await
        .context("Failed to load owners")?;
    match orchestrator.restore_musters().await {
        Ok(count) => info!("{} musters active after restart", count),
        Err(e) => error!("Failed to restore musters: {}", e),
    }
    match orchestrator.restore_applications().await {
        Ok(count) => info!("{} applications pending review", count),
        Err(e) => error!("Failed to restore applications: {}", e),
    }

    let app_state = Arc::new(AppState {
        orchestrator: orchestrator.clone(),
        public_key: config.discord_public_key,
        dashboard_auth_token: config.dashboard_auth_token.clone(),
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(interaction_router(app_state.clone()))
        .merge(dashboard_router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state.clone());

    tokio::spawn(review_sweep_loop(orchestrator));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
