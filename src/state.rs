//! Shared application state passed to every handler.

use std::sync::Arc;
use std::time::Duration;

use crate::{config::Config, db::DbPool, services::registry::TenantRegistry};

/// Everything a request handler needs: the connection pool, the startup
/// configuration, and the tenant-credential cache. Cloned per request;
/// all fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub registry: TenantRegistry,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> Self {
        let registry = TenantRegistry::new(Duration::from_secs(config.registry_cache_secs));
        Self {
            pool,
            config: Arc::new(config),
            registry,
        }
    }

    /// Idempotency reservation lifetime as a chrono duration.
    pub fn idempotency_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.config.idempotency_ttl_hours)
    }
}
