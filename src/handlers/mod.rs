//! HTTP request handlers (route handlers).
//!
//! Handlers receive HTTP requests, run the gateway pipeline stages, and
//! return curated JSON responses. Write endpoints serialize their response
//! body exactly once, persist it through the idempotency store, and return
//! the same bytes, so replays are byte-identical.

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::{error::AppError, services::idempotency, state::AppState};

/// Balance read endpoint
pub mod balance;
/// Gateway deduct pipeline
pub mod gateway;
/// Health check handler for monitoring
pub mod health;
/// Operator top-up and reset endpoints
pub mod topup;

/// Serialize a response body exactly once.
///
/// Derived response types cannot fail to serialize; the fallback body keeps
/// the handler total without panicking.
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| r#"{"ok":false,"error":"internal_error"}"#.to_string())
}

/// Build a JSON response from an already-serialized body, stamping the
/// `x-request-id` correlation header.
pub(crate) fn json_response(status: StatusCode, body: String) -> Response {
    let request_id = Uuid::new_v4();
    let mut response =
        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Serve the response stored by a previous completion under the same key.
pub(crate) fn replay_response(status: i32, body: String) -> Response {
    let status = u16::try_from(status)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, body)
}

/// Extract the mandatory `Idempotency-Key` header, trimmed and non-empty.
pub(crate) fn require_idempotency_key(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get("idempotency-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AppError::MissingIdempotencyKey)
}

/// Complete a claimed reservation with the final response, then return it.
///
/// A persistence failure leaves the reservation in place: retries block as
/// `request_in_progress` until the TTL rather than risk a divergent answer.
pub(crate) async fn persist_and_respond(
    state: &AppState,
    key: &str,
    status: StatusCode,
    body: String,
) -> Response {
    if let Err(error) = idempotency::persist_response(
        &state.pool,
        key,
        i32::from(status.as_u16()),
        &body,
    )
    .await
    {
        tracing::warn!(?error, key, "response persistence failed; reservation left in place");
    }
    json_response(status, body)
}

/// Persist a deterministic post-claim error so retries observe the same
/// outcome.
pub(crate) async fn persist_error(state: &AppState, key: &str, error: AppError) -> Response {
    let status = error.status();
    let body = error.body(Uuid::new_v4()).to_string();
    persist_and_respond(state, key, status, body).await
}

/// Abandon a reservation after a failure that provably produced no ledger
/// effect, so a future retry can run the request again.
pub(crate) async fn release_and_fail(state: &AppState, key: &str, error: AppError) -> Response {
    if let Err(release_error) = idempotency::release(&state.pool, key).await {
        tracing::warn!(?release_error, key, "reservation release failed");
    }
    error.into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;

    use super::*;

    #[test]
    fn idempotency_key_is_trimmed_and_required() {
        let mut headers = HeaderMap::new();
        assert!(require_idempotency_key(&headers).is_err());

        headers.insert("idempotency-key", "   ".parse().unwrap());
        assert!(require_idempotency_key(&headers).is_err());

        headers.insert("idempotency-key", "  k1  ".parse().unwrap());
        assert_eq!(require_idempotency_key(&headers).unwrap(), "k1");
    }

    #[test]
    fn replay_preserves_stored_status() {
        let response = replay_response(402, r#"{"price_credits":5}"#.to_string());

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn replay_of_a_corrupt_status_degrades_to_500() {
        let response = replay_response(-1, String::new());

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
