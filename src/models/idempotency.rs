//! Idempotency record model: HTTP-layer reservation and response cache.

use chrono::{DateTime, Utc};

/// Represents an idempotency record from the database.
///
/// A row with NULL response fields is a live reservation; once the handler
/// completes, the response is persisted and every later request carrying the
/// same key replays it verbatim. Rows older than the TTL are evicted by the
/// next claim attempt against the same key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdempotencyRecord {
    /// The caller-supplied `Idempotency-Key`, the primary key
    pub key: String,

    pub method: String,

    pub path: String,

    /// Lowercase hex SHA-256 of the request body as received on the wire
    pub body_sha: String,

    /// HTTP status of the completed response, NULL while reserved
    pub response_status: Option<i32>,

    /// Exact response body of the completed response, NULL while reserved
    pub response_body: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Whether the stored fingerprint matches a new request's identity.
    ///
    /// Two requests with the same key but different `(method, path,
    /// body_sha)` can never both succeed.
    pub fn matches(&self, method: &str, path: &str, body_sha: &str) -> bool {
        self.method == method && self.path == path && self.body_sha == body_sha
    }

    /// Whether the reservation has outlived the TTL and may be evicted.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.created_at > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(created_at: DateTime<Utc>) -> IdempotencyRecord {
        IdempotencyRecord {
            key: "k1".into(),
            method: "POST".into(),
            path: "/gateway/deduct".into(),
            body_sha: "abc".into(),
            response_status: None,
            response_body: None,
            created_at,
        }
    }

    #[test]
    fn fingerprint_match_requires_all_three_fields() {
        let row = record(Utc::now());

        assert!(row.matches("POST", "/gateway/deduct", "abc"));
        assert!(!row.matches("PUT", "/gateway/deduct", "abc"));
        assert!(!row.matches("POST", "/topup/mock", "abc"));
        assert!(!row.matches("POST", "/gateway/deduct", "def"));
    }

    #[test]
    fn expiry_is_strictly_after_ttl() {
        let now = Utc::now();
        let ttl = Duration::hours(24);

        assert!(!record(now - Duration::hours(24)).is_expired(now, ttl));
        assert!(record(now - Duration::hours(24) - Duration::seconds(1)).is_expired(now, ttl));
    }
}
