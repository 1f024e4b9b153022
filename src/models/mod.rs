//! Data models representing database entities and wire-level DTOs.

/// Credit balance per (tenant, user)
pub mod balance;
/// Gateway request/response types
pub mod gateway;
/// Idempotency reservation records
pub mod idempotency;
/// Immutable ledger journal
pub mod journal;
/// Vendor project (tenant) model
pub mod tenant;
/// Per-tenant caller identity model
pub mod vendor_user;
