//! Balance read endpoint: `GET /balance?userId=…`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::balance::{BalanceResponse, CreditBalance};
use crate::state::AppState;

use super::{json_response, to_json};

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Read the current balance for a user of the configured tenant.
///
/// 400 on a missing or malformed `userId`, 404 when the user has no balance
/// row yet.
pub async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Response, AppError> {
    let raw = query
        .user_id
        .ok_or_else(|| AppError::InvalidRequest("userId query parameter is required".into()))?;
    let user_id: Uuid = raw
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidRequest("userId must be a UUID".into()))?;

    let row = sqlx::query_as::<_, CreditBalance>(
        "SELECT * FROM credit_balances WHERE tenant_id = $1 AND user_id = $2",
    )
    .bind(state.config.tenant_id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await
    .map_err(AppError::BalanceLookupFailed)?
    .ok_or(AppError::UserNotFound)?;

    Ok(json_response(
        StatusCode::OK,
        to_json(&BalanceResponse {
            balance_credits: row.balance_credits,
        }),
    ))
}
