//! DB-derived brand/type dictionary with a 24-hour in-process TTL cache.
//! Readers may see a stale snapshot across a refresh; that is fine — the
//! dictionary only biases token classification.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::info;

use crate::db::rankings;
use crate::error::Result;

const DICT_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Clone)]
struct Snapshot {
    brands: Arc<HashSet<String>>,
    types: Arc<HashSet<String>>,
    refreshed_at: Instant,
}

/// Process-wide dictionary cache; cheap to clone and share.
#[derive(Clone, Default)]
pub struct DictCache {
    inner: Arc<RwLock<Option<Snapshot>>>,
}

impl DictCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current brand and type sets, refreshing from the store when the cached
    /// snapshot is older than the TTL.
    pub async fn get(
        &self,
        pool: &SqlitePool,
    ) -> Result<(Arc<HashSet<String>>, Arc<HashSet<String>>)> {
        if let Some(snap) = self.inner.read().await.as_ref() {
            if snap.refreshed_at.elapsed() < DICT_TTL {
                return Ok((Arc::clone(&snap.brands), Arc::clone(&snap.types)));
            }
        }

        let mut guard = self.inner.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(snap) = guard.as_ref() {
            if snap.refreshed_at.elapsed() < DICT_TTL {
                return Ok((Arc::clone(&snap.brands), Arc::clone(&snap.types)));
            }
        }

        let (brands, types) = rankings::dictionary_terms(pool).await?;
        info!(
            brands = brands.len(),
            types = types.len(),
            "keyword dictionary refreshed"
        );
        let snap = Snapshot {
            brands: Arc::new(brands),
            types: Arc::new(types),
            refreshed_at: Instant::now(),
        };
        let result = (Arc::clone(&snap.brands), Arc::clone(&snap.types));
        *guard = Some(snap);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn empty_store_yields_empty_dictionary() {
        let pool = test_pool().await;
        let cache = DictCache::new();
        let (brands, types) = cache.get(&pool).await.unwrap();
        assert!(brands.is_empty());
        assert!(types.is_empty());
    }
}
