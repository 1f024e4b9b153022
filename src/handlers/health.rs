//! Health probe: `GET /health`.
//!
//! "Healthy" for this gateway means one thing: the ledger store is
//! reachable, because every request path — tenant resolution, idempotency
//! claims, balance mutations — is a store round trip. There is no degraded
//! mode; a gateway that cannot commit a debit should fall out of the load
//! balancer rather than answer vendors with 500s.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Probe response: store reachability plus the tenant scope this process
/// serves, so operators can tell gateway instances apart at a glance.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,

    pub database: String,

    /// The single tenant this gateway instance is authorized to serve
    pub tenant_id: Uuid,

    pub timestamp: DateTime<Utc>,
}

/// Run a trivial query against the store and report the serving scope.
/// An unreachable store surfaces as the standard 500 error response, which
/// probes treat as unhealthy.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, AppError> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        database: "connected".to_string(),
        tenant_id: state.config.tenant_id,
        timestamp: Utc::now(),
    }))
}
