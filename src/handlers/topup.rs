//! Operator top-up and reset endpoints.
//!
//! `/topup/mock` credits a balance on behalf of operator tooling. It is not
//! HMAC-signed (operator traffic is internal) but still requires an
//! `Idempotency-Key` and flows through the same reservation store as the
//! gateway. `/topup/reset` zeroes a balance and journals the previous value.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::models::gateway::{ResetRequest, ResetResponse, TopupRequest, TopupResponse};
use crate::services::idempotency::{self, ClaimOutcome};
use crate::services::ledger::{self, CreditKind, LedgerError};
use crate::services::signature;
use crate::state::AppState;

use super::{
    json_response, persist_and_respond, persist_error, release_and_fail, replay_response,
    require_idempotency_key, to_json,
};

/// Route path, also the idempotency fingerprint component.
pub const MOCK_PATH: &str = "/topup/mock";

/// Credit a caller's balance. Idempotent at both the HTTP layer (the key)
/// and the ledger layer (the ref derived from the key), so a handler crash
/// retried after TTL eviction still cannot double-credit.
pub async fn mock(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    match run_mock(&state, &headers, &body).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

async fn run_mock(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, AppError> {
    let key = require_idempotency_key(headers)?;

    let body_sha = signature::body_sha256_hex(body);
    match idempotency::claim(
        &state.pool,
        key,
        "POST",
        MOCK_PATH,
        &body_sha,
        state.idempotency_ttl(),
    )
    .await
    .map_err(AppError::IdempotencyStoreFailed)?
    {
        ClaimOutcome::Claimed => {}
        ClaimOutcome::Locked => return Err(AppError::RequestInProgress),
        ClaimOutcome::Conflict { reason } => {
            tracing::debug!(key, reason, "idempotency key conflict");
            return Err(AppError::IdempotencyConflict);
        }
        ClaimOutcome::Replay { status, body } => return Ok(replay_response(status, body)),
    }

    let request = match parse_topup(body) {
        Ok(request) => request,
        Err(details) => {
            return Ok(persist_error(state, key, AppError::InvalidRequest(details)).await);
        }
    };

    let ledger_ref = topup_ref(key);
    let outcome = ledger::credit(
        &state.pool,
        state.config.tenant_id,
        request.user_id,
        request.amount_credits,
        CreditKind::Topup,
        Some(ledger_ref.as_str()),
        None,
    )
    .await;

    match outcome {
        Ok(_) => {
            let body = to_json(&TopupResponse { ok: true });
            Ok(persist_and_respond(state, key, StatusCode::OK, body).await)
        }
        Err(LedgerError::RefClassMismatch) => {
            Ok(persist_error(state, key, AppError::RefClassMismatch).await)
        }
        Err(LedgerError::AmountMustBePositive) | Err(LedgerError::RefRequired) => Ok(persist_error(
            state,
            key,
            AppError::InvalidRequest("amount_credits must be a positive integer".into()),
        )
        .await),
        Err(LedgerError::Store(e)) => {
            Ok(release_and_fail(state, key, AppError::MutationFailed(e)).await)
        }
    }
}

/// Zero a balance. Responds with the previous balance; a zero or absent
/// balance is a no-op reset.
pub async fn reset(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let request: ResetRequest = serde_json::from_slice(&body)
        .map_err(|_| AppError::InvalidRequest("body must be JSON with userId (UUID)".into()))?;

    let previous = ledger::reset(&state.pool, state.config.tenant_id, request.user_id)
        .await
        .map_err(|error| match error {
            LedgerError::Store(e) => AppError::MutationFailed(e),
            LedgerError::RefClassMismatch => AppError::RefClassMismatch,
            LedgerError::AmountMustBePositive | LedgerError::RefRequired => {
                AppError::InvalidRequest("reset rejected by the ledger".into())
            }
        })?;

    let body = to_json(&ResetResponse {
        ok: true,
        previous_balance_credits: previous,
        new_balance_credits: 0,
    });
    Ok(json_response(StatusCode::OK, body))
}

/// Ledger ref for a top-up, derived from the idempotency key so HTTP-level
/// and ledger-level dedupe agree on identity.
fn topup_ref(key: &str) -> String {
    format!("topup_{key}")
}

fn parse_topup(body: &[u8]) -> Result<TopupRequest, String> {
    let request: TopupRequest = serde_json::from_slice(body)
        .map_err(|_| "body must be JSON with userId (UUID) and amount_credits (integer)".to_string())?;
    request.validate()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topup_body_parses_and_validates() {
        let request =
            parse_topup(br#"{"userId":"9c0383a1-0887-4c0f-98ca-cb71ffc4e76c","amount_credits":500}"#)
                .unwrap();

        assert_eq!(request.amount_credits, 500);
    }

    #[test]
    fn topup_rejects_missing_and_non_positive_amounts() {
        assert!(parse_topup(br#"{"userId":"9c0383a1-0887-4c0f-98ca-cb71ffc4e76c"}"#).is_err());
        assert!(
            parse_topup(br#"{"userId":"9c0383a1-0887-4c0f-98ca-cb71ffc4e76c","amount_credits":0}"#)
                .is_err()
        );
        assert!(
            parse_topup(
                br#"{"userId":"9c0383a1-0887-4c0f-98ca-cb71ffc4e76c","amount_credits":-10}"#
            )
            .is_err()
        );
    }

    #[test]
    fn ledger_ref_is_derived_from_the_idempotency_key() {
        assert_eq!(topup_ref("t1"), "topup_t1");
    }
}
