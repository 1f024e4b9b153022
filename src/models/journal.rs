//! Journal entry model: the immutable audit trail of balance mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a journal entry, stored as TEXT in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    /// Balance increased by a top-up
    Topup,
    /// Balance decreased by a vendor charge
    Deduct,
    /// Balance zeroed by operator tooling; amount records the prior balance
    ManualReset,
    /// Operator-issued balance correction (credit class)
    Adjustment,
}

impl JournalKind {
    /// Whether this kind belongs to the credit class of mutations.
    ///
    /// A ref recorded under one class can only ever be replayed by the same
    /// class; crossing classes is a `ref_class_mismatch`.
    pub fn is_credit(self) -> bool {
        matches!(self, JournalKind::Topup | JournalKind::Adjustment)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JournalKind::Topup => "topup",
            JournalKind::Deduct => "deduct",
            JournalKind::ManualReset => "manual_reset",
            JournalKind::Adjustment => "adjustment",
        }
    }
}

/// Represents a journal entry record from the database.
///
/// Append-only: rows are never updated or deleted. `(tenant_id, ref)` is
/// unique, which is what makes a single ledger mutation idempotent within a
/// tenant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JournalEntry {
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub user_id: Uuid,

    pub kind: JournalKind,

    /// Mutation magnitude in credits, always positive
    pub amount_credits: i64,

    /// Caller-supplied (or generated) idempotency handle for this mutation
    #[sqlx(rename = "ref")]
    pub entry_ref: String,

    /// Opaque key-value blob supplied by the caller; no schema beyond
    /// "serializable"
    pub metadata: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_class_covers_topup_and_adjustment() {
        assert!(JournalKind::Topup.is_credit());
        assert!(JournalKind::Adjustment.is_credit());
        assert!(!JournalKind::Deduct.is_credit());
        assert!(!JournalKind::ManualReset.is_credit());
    }

    #[test]
    fn kind_round_trips_through_wire_names() {
        for kind in [
            JournalKind::Topup,
            JournalKind::Deduct,
            JournalKind::ManualReset,
            JournalKind::Adjustment,
        ] {
            let name = serde_json::to_value(kind).unwrap();
            assert_eq!(name, serde_json::json!(kind.as_str()));
        }
    }
}
