//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.
//!
//! Insufficient funds is deliberately absent: it is not an error body but a
//! 402 paywall envelope, constructed by the gateway pipeline.

use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::services::signature::SignatureError;

/// Application-wide error type.
///
/// Every variant maps to one error kind of the wire taxonomy. Store-native
/// error text never reaches the client; 5xx bodies carry only the curated
/// kind.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Request body or parameters failed validation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The `Idempotency-Key` header is mandatory on write endpoints.
    #[error("Missing Idempotency-Key header")]
    MissingIdempotencyKey,

    /// The `x-f402-key` vendor credential header is absent.
    #[error("Missing x-f402-key header")]
    MissingVendorKey,

    /// Request signature verification failed.
    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// The presented credential does not resolve to any tenant.
    #[error("Unknown vendor")]
    UnknownVendor,

    /// The credential resolved to a tenant this process does not serve.
    #[error("Vendor does not match gateway scope")]
    VendorMismatch,

    /// The idempotency key was reused with a different payload.
    #[error("Idempotency key conflict")]
    IdempotencyConflict,

    /// Another request holding the same idempotency key is still in flight.
    #[error("Request in progress")]
    RequestInProgress,

    /// The ledger ref exists with an incompatible journal kind.
    #[error("Ref already used for a different operation class")]
    RefClassMismatch,

    /// No balance row exists for the requested user.
    #[error("User not found")]
    UserNotFound,

    /// Tenant lookup failed at the store.
    #[error("Vendor lookup failed")]
    VendorLookupFailed(#[source] sqlx::Error),

    /// Idempotency claim or persistence failed at the store.
    #[error("Idempotency store failed")]
    IdempotencyStoreFailed(#[source] sqlx::Error),

    /// Balance read failed at the store.
    #[error("Balance lookup failed")]
    BalanceLookupFailed(#[source] sqlx::Error),

    /// Ledger mutation failed at the store; the transaction was aborted.
    #[error("Ledger mutation failed")]
    MutationFailed(#[source] sqlx::Error),

    /// Any other database error (health checks, bootstrap).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) | AppError::MissingIdempotencyKey => {
                StatusCode::BAD_REQUEST
            }
            AppError::MissingVendorKey
            | AppError::InvalidSignature(_)
            | AppError::UnknownVendor
            | AppError::VendorMismatch => StatusCode::UNAUTHORIZED,
            AppError::IdempotencyConflict
            | AppError::RequestInProgress
            | AppError::RefClassMismatch => StatusCode::CONFLICT,
            AppError::UserNotFound => StatusCode::NOT_FOUND,
            AppError::VendorLookupFailed(_)
            | AppError::IdempotencyStoreFailed(_)
            | AppError::BalanceLookupFailed(_)
            | AppError::MutationFailed(_)
            | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire-level error kind, the `error` field of the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::MissingIdempotencyKey => "missing_idempotency_key",
            AppError::MissingVendorKey | AppError::InvalidSignature(_) => "invalid_signature",
            AppError::UnknownVendor => "unknown_vendor",
            AppError::VendorMismatch => "vendor_mismatch",
            AppError::IdempotencyConflict => "idempotency_conflict",
            AppError::RequestInProgress => "request_in_progress",
            AppError::RefClassMismatch => "ref_class_mismatch",
            AppError::UserNotFound => "user_not_found",
            AppError::VendorLookupFailed(_) => "vendor_lookup_failed",
            AppError::IdempotencyStoreFailed(_) => "idempotency_store_failed",
            AppError::BalanceLookupFailed(_) => "balance_lookup_failed",
            AppError::MutationFailed(_) => "mutation_failed",
            AppError::Database(_) => "internal_error",
        }
    }

    /// Sub-reason for the `invalid_signature` family, absent otherwise.
    fn reason(&self) -> Option<&'static str> {
        match self {
            AppError::MissingVendorKey => Some("missing_vendor_key"),
            AppError::InvalidSignature(e) => Some(e.as_str()),
            _ => None,
        }
    }

    /// Serialize the error body as it goes over the wire.
    ///
    /// `invalid_signature` bodies carry both `reason` and `request_id`;
    /// validation bodies carry curated `details`.
    pub fn body(&self, request_id: Uuid) -> serde_json::Value {
        let mut body = json!({ "ok": false, "error": self.kind() });

        if let Some(reason) = self.reason() {
            body["reason"] = json!(reason);
            body["request_id"] = json!(request_id);
        }
        if let AppError::InvalidRequest(details) = self {
            body["details"] = json!(details);
        }

        body
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4();
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = ?self, %request_id, "request failed");
        }

        let mut response = (status, Json(self.body(request_id))).into_response();
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_error() -> sqlx::Error {
        sqlx::Error::PoolTimedOut
    }

    #[test]
    fn status_code_mapping_follows_taxonomy() {
        assert_eq!(
            AppError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::MissingIdempotencyKey.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::MissingVendorKey.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::InvalidSignature(SignatureError::SignatureMismatch).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::UnknownVendor.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::VendorMismatch.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::IdempotencyConflict.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::RequestInProgress.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::RefClassMismatch.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::UserNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::VendorLookupFailed(store_error()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::MutationFailed(store_error()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn signature_errors_carry_reason_and_request_id() {
        let request_id = Uuid::new_v4();
        let body =
            AppError::InvalidSignature(SignatureError::TimestampOutOfWindow).body(request_id);

        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["error"], json!("invalid_signature"));
        assert_eq!(body["reason"], json!("timestamp_out_of_window"));
        assert_eq!(body["request_id"], json!(request_id));
    }

    #[test]
    fn missing_vendor_key_is_the_invalid_signature_family() {
        let body = AppError::MissingVendorKey.body(Uuid::new_v4());

        assert_eq!(body["error"], json!("invalid_signature"));
        assert_eq!(body["reason"], json!("missing_vendor_key"));
    }

    #[test]
    fn store_errors_never_leak_native_text() {
        let body = AppError::MutationFailed(store_error()).body(Uuid::new_v4());

        assert_eq!(body, json!({ "ok": false, "error": "mutation_failed" }));
    }

    #[test]
    fn validation_errors_carry_curated_details() {
        let body = AppError::InvalidRequest("ref must be at least 6 characters".into())
            .body(Uuid::new_v4());

        assert_eq!(body["error"], json!("invalid_request"));
        assert_eq!(body["details"], json!("ref must be at least 6 characters"));
    }
}
