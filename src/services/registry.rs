//! Tenant registry: vendor credential resolution with a bounded cache.
//!
//! A credential resolves to `(tenant_id, signing_secret)` by `api_key`
//! first, then `slug`, then (when it parses as a UUID) by `id`; the first
//! match wins, case-sensitively. Results are cached in memory so the hot
//! path costs one read lock, with a freshness bound of at most 60 seconds
//! so rotated secrets propagate without a restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{db::DbPool, models::tenant::Tenant};

/// Why a credential failed to resolve.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Credential empty after trimming.
    #[error("credential is empty or shape-invalid")]
    Validation,

    /// No tenant matches the credential.
    #[error("no tenant matches the credential")]
    NotFound,

    /// The store could not be queried.
    #[error("tenant lookup failed")]
    Lookup(#[from] sqlx::Error),
}

/// The resolved identity the pipeline needs: who the vendor is and how to
/// check their signatures.
#[derive(Debug, Clone)]
pub struct TenantCredential {
    pub tenant_id: Uuid,
    pub signing_secret: String,
}

struct CacheEntry {
    credential: TenantCredential,
    cached_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.cached_at) <= ttl
    }
}

/// Stale successful lookups beyond this many entries are swept on insert so
/// the cache stays bounded.
const CACHE_SWEEP_THRESHOLD: usize = 1024;

/// Concurrent-safe credential cache in front of the tenants table.
#[derive(Clone)]
pub struct TenantRegistry {
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl TenantRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Resolve a vendor credential to its tenant identity.
    pub async fn resolve(
        &self,
        pool: &DbPool,
        credential: &str,
    ) -> Result<TenantCredential, RegistryError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(RegistryError::Validation);
        }

        let now = Instant::now();
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(credential) {
                if entry.is_fresh(now, self.ttl) {
                    return Ok(entry.credential.clone());
                }
            }
        }

        let tenant = lookup(pool, credential).await?.ok_or(RegistryError::NotFound)?;
        let resolved = TenantCredential {
            tenant_id: tenant.id,
            signing_secret: tenant.signing_secret,
        };

        let mut cache = self.cache.write().await;
        if cache.len() >= CACHE_SWEEP_THRESHOLD {
            cache.retain(|_, entry| entry.is_fresh(now, self.ttl));
        }
        cache.insert(
            credential.to_string(),
            CacheEntry {
                credential: resolved.clone(),
                cached_at: now,
            },
        );

        Ok(resolved)
    }
}

/// Ordered lookup: api_key, then slug, then id. Case-sensitive.
async fn lookup(pool: &DbPool, credential: &str) -> Result<Option<Tenant>, sqlx::Error> {
    if let Some(tenant) = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE api_key = $1")
        .bind(credential)
        .fetch_optional(pool)
        .await?
    {
        return Ok(Some(tenant));
    }

    if let Some(tenant) = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE slug = $1")
        .bind(credential)
        .fetch_optional(pool)
        .await?
    {
        return Ok(Some(tenant));
    }

    if let Ok(id) = Uuid::parse_str(credential) {
        return sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await;
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A pool that never connects; cache hits and validation failures must
    /// not touch the store.
    fn offline_pool() -> DbPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/flow402_never_connected")
            .unwrap()
    }

    #[tokio::test]
    async fn empty_credential_is_a_validation_error() {
        let registry = TenantRegistry::new(Duration::from_secs(60));

        let result = registry.resolve(&offline_pool(), "   ").await;

        assert!(matches!(result, Err(RegistryError::Validation)));
    }

    #[tokio::test]
    async fn fresh_cache_entries_short_circuit_the_store() {
        let registry = TenantRegistry::new(Duration::from_secs(60));
        let tenant_id = Uuid::new_v4();
        registry.cache.write().await.insert(
            "vendor-key".to_string(),
            CacheEntry {
                credential: TenantCredential {
                    tenant_id,
                    signing_secret: "demo-signing-secret".to_string(),
                },
                cached_at: Instant::now(),
            },
        );

        let resolved = registry
            .resolve(&offline_pool(), "vendor-key")
            .await
            .unwrap();

        assert_eq!(resolved.tenant_id, tenant_id);
        assert_eq!(resolved.signing_secret, "demo-signing-secret");
    }

    #[test]
    fn freshness_bound_is_inclusive() {
        let now = Instant::now();
        let entry = CacheEntry {
            credential: TenantCredential {
                tenant_id: Uuid::new_v4(),
                signing_secret: String::new(),
            },
            cached_at: now,
        };

        assert!(entry.is_fresh(now + Duration::from_secs(60), Duration::from_secs(60)));
        assert!(!entry.is_fresh(now + Duration::from_secs(61), Duration::from_secs(60)));
    }
}
