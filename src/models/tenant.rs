//! Tenant (vendor project) model.
//!
//! A tenant is one isolated vendor project within the multi-tenant gateway.
//! Its `signing_secret` authenticates every request the vendor makes; its
//! `api_key` and `slug` are the lookup credentials.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a tenant record from the database.
///
/// Created by operator tooling, never deleted while referenced. The
/// `signing_secret` carries at least 32 bytes of entropy and is never
/// serialized into any response.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Tenant {
    /// Unique identifier for this tenant
    pub id: Uuid,

    /// URL-safe unique handle, an alternative lookup credential
    pub slug: String,

    /// Human-readable vendor project name
    pub name: String,

    /// Opaque unique API key, the primary lookup credential
    pub api_key: String,

    /// HMAC-SHA256 signing secret for request and response signatures
    pub signing_secret: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
