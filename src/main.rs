mod config;
mod error;
mod gemini;
mod media;
mod models;
mod pdf;
mod render;
mod routes;
mod session;
mod studio;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{CorsLayer, Any};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Settings;
use crate::gemini::GeminiClient;
use crate::routes::{router, spawn_session_sweeper, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env().context("loading settings")?;
    tracing::info!(?settings, "Loaded settings");

    let state = AppState::new(Arc::new(GeminiClient::from_settings(&settings)));

    spawn_session_sweeper(state.clone(), Duration::from_secs(settings.session_ttl_secs));

    let app = router(state, settings.max_upload_bytes).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutting down");
    }
}
