//! Credit balance model and balance read response.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Current credit balance for one `(tenant, user)` pair.
///
/// # Balance Storage
///
/// Balances are non-negative integer credits (100 credits = 1 USDC); no
/// floating point anywhere. The non-negativity invariant holds at every
/// committed state and is enforced at the mutation boundary by the ledger's
/// conditional update, backed by a database CHECK constraint.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreditBalance {
    pub tenant_id: Uuid,

    pub user_id: Uuid,

    /// Current balance in credits, always >= 0
    pub balance_credits: i64,

    /// Opaque currency tag, always "USDC"
    pub currency: String,

    /// Timestamp of the last balance mutation
    pub updated_at: DateTime<Utc>,
}

/// Response body for `GET /balance?userId=…`.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance_credits: i64,
}
