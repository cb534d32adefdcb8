mod config;
mod errors;
mod hub;
mod routes;
mod solver;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::routes::build_router;
use crate::solver::{BuildingCatalog, SolveLimits};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting layout solver v{}", env!("CARGO_PKG_VERSION"));

    let catalog = BuildingCatalog::standard();
    info!("Building catalog loaded ({} types)", catalog.all().len());

    let limits = SolveLimits {
        max_iterations: config.max_iterations_limit,
        max_timeout_ms: config.max_attempt_timeout_ms,
    };
    info!(
        "Solve limits: {} iterations, {}ms per attempt",
        limits.max_iterations, limits.max_timeout_ms
    );

    let state = AppState::new(catalog, limits);

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
