//! Ledger engine: atomic credit and debit on `(tenant, user)` balances.
//!
//! Every mutation commits the balance change and its journal entry in one
//! database transaction, so a committed deduct entry implies the balance was
//! sufficient immediately before it and exactly that much lower after.
//! Outcomes are typed; callers branch on the tag, never on error strings.
//!
//! # Concurrency
//!
//! The funds check is the conditional `UPDATE … WHERE balance_credits >=
//! amount` itself: the store serializes concurrent debits row-level, and the
//! one that would drive the balance negative is the one that observes
//! insufficient funds. No application lock is held across any await point
//! outside the transaction.

use uuid::Uuid;

use crate::{
    db::DbPool,
    models::journal::{JournalEntry, JournalKind},
    models::vendor_user::VendorUser,
};

/// Ledger operation failure.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("amount must be positive")]
    AmountMustBePositive,

    #[error("ref is required")]
    RefRequired,

    /// The ref exists with a journal kind from the other operation class.
    #[error("ref already recorded for a different operation class")]
    RefClassMismatch,

    /// The transaction aborted; no partial effect was committed.
    #[error("ledger store error")]
    Store(#[from] sqlx::Error),
}

/// Credit-class journal kinds permitted on the credit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditKind {
    Topup,
    Adjustment,
}

impl CreditKind {
    fn journal(self) -> JournalKind {
        match self {
            CreditKind::Topup => JournalKind::Topup,
            CreditKind::Adjustment => JournalKind::Adjustment,
        }
    }
}

/// Result of a debit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// Balance reduced and journal entry written.
    Applied { new_balance: i64 },
    /// The ref was already journaled as a deduct; no new effect.
    Replayed { balance: i64 },
    /// The balance could not cover the amount; nothing was written.
    InsufficientFunds,
}

/// Result of a credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Applied { new_balance: i64 },
    /// The ref was already journaled as a credit; no new effect.
    Replayed { balance: i64 },
}

/// Read the current balance, `None` when no row exists yet.
pub async fn fetch_balance<'e, E>(
    executor: E,
    tenant_id: Uuid,
    user_id: Uuid,
) -> Result<Option<i64>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query_scalar(
        "SELECT balance_credits FROM credit_balances WHERE tenant_id = $1 AND user_id = $2",
    )
    .bind(tenant_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

/// Add credits to a `(tenant, user)` balance.
///
/// The vendor user and balance rows are created lazily on first reference.
/// If `ref` is empty a unique one is generated. An existing `(tenant, ref)`
/// journal entry of the credit class makes this call an idempotent replay;
/// a debit-class entry under the same ref is a class mismatch.
pub async fn credit(
    pool: &DbPool,
    tenant_id: Uuid,
    user_id: Uuid,
    amount_credits: i64,
    kind: CreditKind,
    ledger_ref: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> Result<CreditOutcome, LedgerError> {
    if amount_credits <= 0 {
        return Err(LedgerError::AmountMustBePositive);
    }

    let ledger_ref = match ledger_ref {
        Some(r) if !r.trim().is_empty() => r.trim().to_string(),
        _ => generated_ref(),
    };

    let mut tx = pool.begin().await.map_err(LedgerError::Store)?;

    if let Some(entry) = journal_entry_by_ref(&mut tx, tenant_id, &ledger_ref).await? {
        if entry.kind.is_credit() {
            let balance = fetch_balance(&mut *tx, tenant_id, user_id)
                .await
                .map_err(LedgerError::Store)?
                .unwrap_or(0);
            tx.rollback().await.map_err(LedgerError::Store)?;
            return Ok(CreditOutcome::Replayed { balance });
        }
        tx.rollback().await.map_err(LedgerError::Store)?;
        return Err(LedgerError::RefClassMismatch);
    }

    let vendor_user = ensure_vendor_user(&mut tx, tenant_id, user_id)
        .await
        .map_err(LedgerError::Store)?;

    let new_balance: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO credit_balances (tenant_id, user_id, balance_credits, updated_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (tenant_id, user_id)
        DO UPDATE SET
            balance_credits = credit_balances.balance_credits + EXCLUDED.balance_credits,
            updated_at = NOW()
        RETURNING balance_credits
        "#,
    )
    .bind(tenant_id)
    .bind(user_id)
    .bind(amount_credits)
    .fetch_one(&mut *tx)
    .await
    .map_err(LedgerError::Store)?;

    let entry = match insert_journal_entry(
        &mut tx,
        tenant_id,
        user_id,
        kind.journal(),
        amount_credits,
        &ledger_ref,
        metadata,
    )
    .await
    {
        Ok(entry) => entry,
        Err(InsertError::RefTaken) => {
            // Lost a same-ref race after our pre-check; the committed winner decides.
            tx.rollback().await.map_err(LedgerError::Store)?;
            return resolve_ref_race_credit(pool, tenant_id, user_id, &ledger_ref).await;
        }
        Err(InsertError::Store(e)) => return Err(LedgerError::Store(e)),
    };

    tx.commit().await.map_err(LedgerError::Store)?;
    tracing::debug!(
        entry_id = %entry.id,
        kind = entry.kind.as_str(),
        amount = entry.amount_credits,
        ledger_ref = %entry.entry_ref,
        user_id = %vendor_user.user_id,
        new_balance,
        "credit applied"
    );

    Ok(CreditOutcome::Applied { new_balance })
}

/// Remove credits from a `(tenant, user)` balance, or report insufficient
/// funds without any side effect.
pub async fn debit(
    pool: &DbPool,
    tenant_id: Uuid,
    user_id: Uuid,
    amount_credits: i64,
    ledger_ref: &str,
    metadata: Option<serde_json::Value>,
) -> Result<DebitOutcome, LedgerError> {
    if amount_credits <= 0 {
        return Err(LedgerError::AmountMustBePositive);
    }
    let ledger_ref = ledger_ref.trim();
    if ledger_ref.is_empty() {
        return Err(LedgerError::RefRequired);
    }

    let mut tx = pool.begin().await.map_err(LedgerError::Store)?;

    if let Some(entry) = journal_entry_by_ref(&mut tx, tenant_id, ledger_ref).await? {
        if entry.kind == JournalKind::Deduct {
            let balance = fetch_balance(&mut *tx, tenant_id, user_id)
                .await
                .map_err(LedgerError::Store)?
                .unwrap_or(0);
            tx.rollback().await.map_err(LedgerError::Store)?;
            return Ok(DebitOutcome::Replayed { balance });
        }
        tx.rollback().await.map_err(LedgerError::Store)?;
        return Err(LedgerError::RefClassMismatch);
    }

    // The funds check and the decrement are one statement; a balance that
    // cannot cover the amount updates zero rows.
    let new_balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE credit_balances
        SET balance_credits = balance_credits - $3,
            updated_at = NOW()
        WHERE tenant_id = $1 AND user_id = $2 AND balance_credits >= $3
        RETURNING balance_credits
        "#,
    )
    .bind(tenant_id)
    .bind(user_id)
    .bind(amount_credits)
    .fetch_optional(&mut *tx)
    .await
    .map_err(LedgerError::Store)?;

    let Some(new_balance) = new_balance else {
        tx.rollback().await.map_err(LedgerError::Store)?;
        return Ok(DebitOutcome::InsufficientFunds);
    };

    let entry = match insert_journal_entry(
        &mut tx,
        tenant_id,
        user_id,
        JournalKind::Deduct,
        amount_credits,
        ledger_ref,
        metadata,
    )
    .await
    {
        Ok(entry) => entry,
        Err(InsertError::RefTaken) => {
            tx.rollback().await.map_err(LedgerError::Store)?;
            return resolve_ref_race_debit(pool, tenant_id, user_id, ledger_ref).await;
        }
        Err(InsertError::Store(e)) => return Err(LedgerError::Store(e)),
    };

    tx.commit().await.map_err(LedgerError::Store)?;
    tracing::debug!(
        entry_id = %entry.id,
        amount = entry.amount_credits,
        ledger_ref = %entry.entry_ref,
        new_balance,
        "debit applied"
    );

    Ok(DebitOutcome::Applied { new_balance })
}

/// Zero a balance, journaling the previous value as a `manual_reset`.
///
/// A zero or absent balance resets to itself with no journal entry, since
/// the journal only admits positive amounts and nothing changed.
pub async fn reset(
    pool: &DbPool,
    tenant_id: Uuid,
    user_id: Uuid,
) -> Result<i64, LedgerError> {
    let mut tx = pool.begin().await.map_err(LedgerError::Store)?;

    let previous: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT balance_credits FROM credit_balances
        WHERE tenant_id = $1 AND user_id = $2
        FOR UPDATE
        "#,
    )
    .bind(tenant_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(LedgerError::Store)?;

    let previous = previous.unwrap_or(0);
    if previous == 0 {
        tx.rollback().await.map_err(LedgerError::Store)?;
        return Ok(0);
    }

    sqlx::query(
        r#"
        UPDATE credit_balances
        SET balance_credits = 0, updated_at = NOW()
        WHERE tenant_id = $1 AND user_id = $2
        "#,
    )
    .bind(tenant_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(LedgerError::Store)?;

    let ledger_ref = format!("manual_reset_{}", chrono::Utc::now().timestamp_millis());
    insert_journal_entry(
        &mut tx,
        tenant_id,
        user_id,
        JournalKind::ManualReset,
        previous,
        &ledger_ref,
        None,
    )
    .await
    .map_err(|e| match e {
        InsertError::RefTaken => LedgerError::RefClassMismatch,
        InsertError::Store(e) => LedgerError::Store(e),
    })?;

    tx.commit().await.map_err(LedgerError::Store)?;

    Ok(previous)
}

fn generated_ref() -> String {
    let bytes: [u8; 8] = rand::random();
    format!("topup_{}", hex::encode(bytes))
}

/// Upsert the caller's identity row, created lazily on first balance
/// reference. `updated_at` is bumped so the row reflects the latest credit
/// that touched the user.
async fn ensure_vendor_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    tenant_id: Uuid,
    user_id: Uuid,
) -> Result<VendorUser, sqlx::Error> {
    sqlx::query_as::<_, VendorUser>(
        r#"
        INSERT INTO vendor_users (tenant_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (tenant_id, user_id)
        DO UPDATE SET updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(tenant_id)
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await
}

async fn journal_entry_by_ref(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    tenant_id: Uuid,
    ledger_ref: &str,
) -> Result<Option<JournalEntry>, LedgerError> {
    sqlx::query_as::<_, JournalEntry>(
        "SELECT * FROM journal_entries WHERE tenant_id = $1 AND ref = $2",
    )
    .bind(tenant_id)
    .bind(ledger_ref)
    .fetch_optional(&mut **tx)
    .await
    .map_err(LedgerError::Store)
}

enum InsertError {
    /// Unique violation on `(tenant_id, ref)`.
    RefTaken,
    Store(sqlx::Error),
}

async fn insert_journal_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    tenant_id: Uuid,
    user_id: Uuid,
    kind: JournalKind,
    amount_credits: i64,
    ledger_ref: &str,
    metadata: Option<serde_json::Value>,
) -> Result<JournalEntry, InsertError> {
    sqlx::query_as::<_, JournalEntry>(
        r#"
        INSERT INTO journal_entries (tenant_id, user_id, kind, amount_credits, ref, metadata)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(tenant_id)
    .bind(user_id)
    .bind(kind)
    .bind(amount_credits)
    .bind(ledger_ref)
    .bind(metadata)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => InsertError::RefTaken,
        _ => InsertError::Store(e),
    })
}

/// After losing a same-ref insert race, the committed entry decides between
/// replay and class mismatch. Runs outside the aborted transaction.
async fn resolve_ref_race_credit(
    pool: &DbPool,
    tenant_id: Uuid,
    user_id: Uuid,
    ledger_ref: &str,
) -> Result<CreditOutcome, LedgerError> {
    let entry = sqlx::query_as::<_, JournalEntry>(
        "SELECT * FROM journal_entries WHERE tenant_id = $1 AND ref = $2",
    )
    .bind(tenant_id)
    .bind(ledger_ref)
    .fetch_one(pool)
    .await
    .map_err(LedgerError::Store)?;

    if entry.kind.is_credit() {
        let balance = fetch_balance(pool, tenant_id, user_id)
            .await
            .map_err(LedgerError::Store)?
            .unwrap_or(0);
        return Ok(CreditOutcome::Replayed { balance });
    }
    Err(LedgerError::RefClassMismatch)
}

async fn resolve_ref_race_debit(
    pool: &DbPool,
    tenant_id: Uuid,
    user_id: Uuid,
    ledger_ref: &str,
) -> Result<DebitOutcome, LedgerError> {
    let entry = sqlx::query_as::<_, JournalEntry>(
        "SELECT * FROM journal_entries WHERE tenant_id = $1 AND ref = $2",
    )
    .bind(tenant_id)
    .bind(ledger_ref)
    .fetch_one(pool)
    .await
    .map_err(LedgerError::Store)?;

    if entry.kind == JournalKind::Deduct {
        let balance = fetch_balance(pool, tenant_id, user_id)
            .await
            .map_err(LedgerError::Store)?
            .unwrap_or(0);
        return Ok(DebitOutcome::Replayed { balance });
    }
    Err(LedgerError::RefClassMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_pool() -> DbPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/flow402_never_connected")
            .unwrap()
    }

    #[tokio::test]
    async fn credit_rejects_non_positive_amounts() {
        let pool = offline_pool();
        for amount in [0, -5] {
            let result = credit(
                &pool,
                Uuid::new_v4(),
                Uuid::new_v4(),
                amount,
                CreditKind::Topup,
                Some("ref-abc"),
                None,
            )
            .await;
            assert!(matches!(result, Err(LedgerError::AmountMustBePositive)));
        }
    }

    #[tokio::test]
    async fn debit_rejects_non_positive_amounts_and_empty_ref() {
        let pool = offline_pool();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();

        let result = debit(&pool, tenant, user, 0, "ref-abc", None).await;
        assert!(matches!(result, Err(LedgerError::AmountMustBePositive)));

        let result = debit(&pool, tenant, user, 5, "   ", None).await;
        assert!(matches!(result, Err(LedgerError::RefRequired)));
    }

    #[test]
    fn generated_refs_are_unique_topup_handles() {
        let a = generated_ref();
        let b = generated_ref();

        assert!(a.starts_with("topup_"));
        assert_eq!(a.len(), "topup_".len() + 16);
        assert_ne!(a, b);
    }

    #[test]
    fn credit_kinds_map_to_credit_class_journal_kinds() {
        assert_eq!(CreditKind::Topup.journal(), JournalKind::Topup);
        assert_eq!(CreditKind::Adjustment.journal(), JournalKind::Adjustment);
        assert!(CreditKind::Topup.journal().is_credit());
        assert!(CreditKind::Adjustment.journal().is_credit());
    }
}
