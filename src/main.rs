//! Flow402 — credit-metering gateway.
//!
//! Sits between untrusted vendor APIs and a shared multi-tenant credit
//! ledger. Vendors charge callers by asking the gateway to debit their
//! balance; insufficient funds produce a standardized 402 paywall envelope
//! the caller tops up against.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries, one transaction per
//!   ledger mutation)
//! - **Authentication**: per-request HMAC-SHA256 over timestamp + body
//! - **Idempotency**: HTTP-layer reservation store plus ledger-level refs
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build HTTP router
//! 5. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;
mod state;

use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!(tenant_id = %config.tenant_id, "configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("database migrations complete");

    let port = config.server_port;
    let app = build_router(AppState::new(pool, config));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble the HTTP surface.
fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/gateway/deduct", post(handlers::gateway::deduct))
        .route("/topup/mock", post(handlers::topup::mock))
        .route("/topup/reset", post(handlers::topup::reset))
        .route("/balance", get(handlers::balance::get_balance))
        .layer(TraceLayer::new_for_http())
        // Stalled requests leave their reservation locked, never half-written.
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state)
}
