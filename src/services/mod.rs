//! Business logic services.
//!
//! Services contain the core gateway logic separated from HTTP handlers:
//! signature verification, tenant resolution, idempotency reservations, and
//! the ledger state machine.

pub mod idempotency;
pub mod ledger;
pub mod registry;
pub mod signature;
