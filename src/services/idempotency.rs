//! HTTP-layer idempotency: reserve → replay semantics over a keyed store.
//!
//! A claim is a single `INSERT … ON CONFLICT DO NOTHING`: the insert IS the
//! lock, so there is no read-then-write window between two racing requests.
//! Exactly one caller per key ever observes `Claimed`; everyone else is
//! decided by the surviving row.

use chrono::{Duration, Utc};

use crate::{db::DbPool, models::idempotency::IdempotencyRecord};

/// Result of attempting to claim an idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The key is ours; the handler must later persist or release it.
    Claimed,
    /// A matching request holds the reservation and has not completed.
    Locked,
    /// The key was reused with a different `(method, path, body_sha)`.
    Conflict { reason: &'static str },
    /// A matching request already completed; serve the stored response.
    Replay { status: i32, body: String },
}

/// Attempt to reserve `key` for a request identified by
/// `(method, path, body_sha)`.
///
/// Rows older than `ttl` are evicted first, so an expired reservation never
/// blocks a fresh claim. On insert conflict the existing row decides the
/// outcome; if it vanishes between the insert and the read (concurrent
/// release or eviction) the claim is retried once.
pub async fn claim(
    pool: &DbPool,
    key: &str,
    method: &str,
    path: &str,
    body_sha: &str,
    ttl: Duration,
) -> Result<ClaimOutcome, sqlx::Error> {
    for _ in 0..2 {
        let cutoff = Utc::now() - ttl;
        sqlx::query("DELETE FROM idempotency_records WHERE key = $1 AND created_at < $2")
            .bind(key)
            .bind(cutoff)
            .execute(pool)
            .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_records (key, method, path, body_sha)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(method)
        .bind(path)
        .bind(body_sha)
        .execute(pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        let existing = sqlx::query_as::<_, IdempotencyRecord>(
            "SELECT * FROM idempotency_records WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(pool)
        .await?;

        match existing {
            // Raced with a row that aged out after our eviction; the next
            // pass deletes it and claims fresh.
            Some(row) if row.is_expired(Utc::now(), ttl) => continue,
            Some(row) => return Ok(evaluate_existing(&row, method, path, body_sha)),
            // Row deleted between insert and read; take another pass.
            None => continue,
        }
    }

    Err(sqlx::Error::RowNotFound)
}

/// Decide the outcome for a request that lost the insert race.
pub fn evaluate_existing(
    row: &IdempotencyRecord,
    method: &str,
    path: &str,
    body_sha: &str,
) -> ClaimOutcome {
    if !row.matches(method, path, body_sha) {
        return ClaimOutcome::Conflict {
            reason: "key_reused_with_different_payload",
        };
    }

    match (row.response_status, &row.response_body) {
        (Some(status), Some(body)) => ClaimOutcome::Replay {
            status,
            body: body.clone(),
        },
        _ => ClaimOutcome::Locked,
    }
}

/// Complete a claim by storing the response every retry must see.
pub async fn persist_response(
    pool: &DbPool,
    key: &str,
    status: i32,
    body: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE idempotency_records SET response_status = $2, response_body = $3 WHERE key = $1",
    )
    .bind(key)
    .bind(status)
    .bind(body)
    .execute(pool)
    .await?;

    Ok(())
}

/// Abandon a claim whose handler failed before producing a persistable
/// response, so a future retry can proceed. Completed rows are untouched.
pub async fn release(pool: &DbPool, key: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM idempotency_records WHERE key = $1 AND response_status IS NULL")
        .bind(key)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn row(
        response: Option<(i32, &str)>,
        created_at: DateTime<Utc>,
    ) -> IdempotencyRecord {
        IdempotencyRecord {
            key: "k1".into(),
            method: "POST".into(),
            path: "/gateway/deduct".into(),
            body_sha: "5a159b6e".into(),
            response_status: response.map(|(status, _)| status),
            response_body: response.map(|(_, body)| body.to_string()),
            created_at,
        }
    }

    #[test]
    fn reserved_row_with_matching_fingerprint_is_locked() {
        let outcome = evaluate_existing(&row(None, Utc::now()), "POST", "/gateway/deduct", "5a159b6e");

        assert_eq!(outcome, ClaimOutcome::Locked);
    }

    #[test]
    fn reserved_row_with_different_payload_is_a_conflict() {
        let outcome = evaluate_existing(&row(None, Utc::now()), "POST", "/gateway/deduct", "deadbeef");

        assert_eq!(
            outcome,
            ClaimOutcome::Conflict {
                reason: "key_reused_with_different_payload"
            }
        );
    }

    #[test]
    fn completed_row_with_matching_fingerprint_replays() {
        let stored = Some((402, r#"{"price_credits":5}"#));
        let outcome =
            evaluate_existing(&row(stored, Utc::now()), "POST", "/gateway/deduct", "5a159b6e");

        assert_eq!(
            outcome,
            ClaimOutcome::Replay {
                status: 402,
                body: r#"{"price_credits":5}"#.to_string()
            }
        );
    }

    #[test]
    fn completed_row_with_different_payload_is_still_a_conflict() {
        let stored = Some((200, r#"{"ok":true,"new_balance":95}"#));
        let outcome =
            evaluate_existing(&row(stored, Utc::now()), "POST", "/topup/mock", "5a159b6e");

        assert_eq!(
            outcome,
            ClaimOutcome::Conflict {
                reason: "key_reused_with_different_payload"
            }
        );
    }
}
