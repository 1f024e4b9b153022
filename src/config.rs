//! Application configuration management.
//!
//! Configuration is loaded from environment variables with the `envy` crate,
//! which deserializes them into a type-safe struct.

use serde::Deserialize;
use uuid::Uuid;

/// Process-wide configuration, loaded once at startup.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `TENANT_ID` (required): UUID of the single tenant this process serves
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `SIGNATURE_SKEW_SECS` (optional): accepted clock skew for request
///   signatures, defaults to 300
/// - `IDEMPOTENCY_TTL_HOURS` (optional): reservation lifetime, defaults to 24
/// - `REGISTRY_CACHE_SECS` (optional): tenant credential cache freshness,
///   defaults to 60 and is clamped to at most 60
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    /// The one tenant this gateway process is authorized to serve.
    /// Requests resolving to any other tenant are rejected as vendor_mismatch.
    pub tenant_id: Uuid,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_skew_secs")]
    pub signature_skew_secs: i64,

    #[serde(default = "default_idempotency_ttl_hours")]
    pub idempotency_ttl_hours: i64,

    #[serde(default = "default_registry_cache_secs")]
    pub registry_cache_secs: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_skew_secs() -> i64 {
    300
}

fn default_idempotency_ttl_hours() -> i64 {
    24
}

/// Rotated signing secrets must propagate without a restart, so the
/// credential cache never holds entries longer than this.
pub const MAX_REGISTRY_CACHE_SECS: u64 = 60;

fn default_registry_cache_secs() -> u64 {
    MAX_REGISTRY_CACHE_SECS
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Attempts to load a `.env` file first (optional), then deserializes
    /// the environment into a `Config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` or `TENANT_ID` is missing, or if
    /// any value cannot be parsed into its expected type.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        let mut config = envy::from_env::<Config>()?;
        config.registry_cache_secs = config.registry_cache_secs.min(MAX_REGISTRY_CACHE_SECS);
        Ok(config)
    }
}
