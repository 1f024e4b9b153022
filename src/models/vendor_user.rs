//! Vendor user model: a caller's identity scoped to one tenant.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a vendor user record from the database.
///
/// Keyed by `(tenant_id, user_id)`. Rows are created lazily the first time a
/// balance references the user and are never deleted independently of their
/// tenant. The vendor-local handle and wallet address are optional; the
/// gateway itself only needs the key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VendorUser {
    pub tenant_id: Uuid,

    pub user_id: Uuid,

    /// The vendor's own handle for this caller, if they shared one
    pub user_external_id: Option<String>,

    /// Wallet address used by the on-chain deposit flow, if known
    pub eth_address: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Bumped whenever a credit references the user
    pub updated_at: DateTime<Utc>,
}
