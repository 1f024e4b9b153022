//! Gateway deduct pipeline: `POST /gateway/deduct`.
//!
//! Stages run in order with the first failure short-circuiting: vendor key,
//! idempotency key, tenant resolution, signature verification, idempotency
//! claim, body validation, balance check, ledger debit. Authentication
//! failures happen before the claim so unauthenticated floods cannot pollute
//! the idempotency store; everything after a successful claim either persists
//! a deterministic response or releases the reservation.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::error::AppError;
use crate::models::gateway::{DeductRequest, DeductResponse, PaywallEnvelope};
use crate::services::idempotency::{self, ClaimOutcome};
use crate::services::ledger::{self, DebitOutcome, LedgerError};
use crate::services::registry::RegistryError;
use crate::services::signature;
use crate::state::AppState;

use super::{
    persist_and_respond, persist_error, release_and_fail, replay_response,
    require_idempotency_key, to_json,
};

/// Route path, also the idempotency fingerprint component.
pub const DEDUCT_PATH: &str = "/gateway/deduct";

/// Vendor credential header resolved through the tenant registry.
pub const VENDOR_KEY_HEADER: &str = "x-f402-key";

/// Charge a caller's credit balance on behalf of an authenticated vendor.
pub async fn deduct(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match run(&state, &headers, &body).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

async fn run(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, AppError> {
    let vendor_key = headers
        .get(VENDOR_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::MissingVendorKey)?;
    let key = require_idempotency_key(headers)?;

    let tenant = state
        .registry
        .resolve(&state.pool, vendor_key)
        .await
        .map_err(|error| match error {
            RegistryError::Validation => AppError::MissingVendorKey,
            RegistryError::NotFound => AppError::UnknownVendor,
            RegistryError::Lookup(e) => AppError::VendorLookupFailed(e),
        })?;
    if tenant.tenant_id != state.config.tenant_id {
        return Err(AppError::VendorMismatch);
    }

    signature::verify(
        headers,
        body,
        &tenant.signing_secret,
        Utc::now().timestamp(),
        state.config.signature_skew_secs,
    )?;

    let body_sha = signature::body_sha256_hex(body);
    match idempotency::claim(
        &state.pool,
        key,
        "POST",
        DEDUCT_PATH,
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
        ClaimOutcome::Replay { status, body } => {
            tracing::debug!(key, status, "replaying stored response");
            // Replayed paywalls are re-signed so vendors can authenticate
            // them like the original.
            let mut response = replay_response(status, body.clone());
            if status == i32::from(StatusCode::PAYMENT_REQUIRED.as_u16()) {
                let header_value = signature::signature_header_value(
                    &tenant.signing_secret,
                    Utc::now().timestamp(),
                    body.as_bytes(),
                );
                if let Ok(value) = HeaderValue::from_str(&header_value) {
                    response
                        .headers_mut()
                        .insert(signature::SIGNATURE_HEADER, value);
                }
            }
            return Ok(response);
        }
    }

    // The reservation is ours from here on.
    let request = match parse_request(body) {
        Ok(request) => request,
        Err(details) => {
            return Ok(persist_error(state, key, AppError::InvalidRequest(details)).await);
        }
    };

    let balance = match ledger::fetch_balance(&state.pool, state.config.tenant_id, request.user_id)
        .await
    {
        Ok(balance) => balance.unwrap_or(0),
        Err(e) => {
            return Ok(release_and_fail(state, key, AppError::BalanceLookupFailed(e)).await);
        }
    };
    if balance < request.amount_credits {
        return Ok(paywall(state, key, &tenant.signing_secret, &request).await);
    }

    let outcome = ledger::debit(
        &state.pool,
        state.config.tenant_id,
        request.user_id,
        request.amount_credits,
        &request.ledger_ref,
        request.metadata.clone(),
    )
    .await;

    match outcome {
        Ok(DebitOutcome::Applied { new_balance })
        | Ok(DebitOutcome::Replayed { balance: new_balance }) => {
            let body = to_json(&DeductResponse {
                ok: true,
                new_balance,
            });
            Ok(persist_and_respond(state, key, StatusCode::OK, body).await)
        }
        // A concurrent spender can still win between the pre-check and the
        // conditional update; same paywall either way.
        Ok(DebitOutcome::InsufficientFunds) => {
            Ok(paywall(state, key, &tenant.signing_secret, &request).await)
        }
        Err(LedgerError::RefClassMismatch) => {
            Ok(persist_error(state, key, AppError::RefClassMismatch).await)
        }
        Err(LedgerError::AmountMustBePositive) | Err(LedgerError::RefRequired) => Ok(persist_error(
            state,
            key,
            AppError::InvalidRequest("amount_credits and ref failed ledger validation".into()),
        )
        .await),
        Err(LedgerError::Store(e)) => {
            Ok(release_and_fail(state, key, AppError::MutationFailed(e)).await)
        }
    }
}

/// Issue the 402 paywall envelope, signed so vendors can authenticate it,
/// and persist it for replays.
async fn paywall(
    state: &AppState,
    key: &str,
    signing_secret: &str,
    request: &DeductRequest,
) -> Response {
    let envelope = PaywallEnvelope::new(request.amount_credits, request.user_id);
    let body = to_json(&envelope);
    tracing::info!(
        user_id = %request.user_id,
        price_credits = request.amount_credits,
        "insufficient funds; issuing paywall"
    );

    let header_value =
        signature::signature_header_value(signing_secret, Utc::now().timestamp(), body.as_bytes());
    let mut response =
        persist_and_respond(state, key, StatusCode::PAYMENT_REQUIRED, body).await;
    if let Ok(value) = HeaderValue::from_str(&header_value) {
        response
            .headers_mut()
            .insert(signature::SIGNATURE_HEADER, value);
    }
    response
}

fn parse_request(body: &[u8]) -> Result<DeductRequest, String> {
    let request: DeductRequest = serde_json::from_slice(body).map_err(|_| {
        "body must be JSON with userId (UUID), ref (string), and amount_credits (integer)"
            .to_string()
    })?;
    request.validate()?;
    Ok(request)
}
