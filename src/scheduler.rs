//! Periodic crawl scheduling and the retention sweep.
//!
//! One process-wide ticker; per-tenant due times decide who actually runs.
//! Missed ticks coalesce (at most one catch-up) and shutdown lets the
//! in-flight tick finish instead of cancelling mid-persist.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::api::health::HealthState;
use crate::config::{Config, CLEANUP_INTERVAL_HOURS};
use crate::coordinator::CrawlCoordinator;
use crate::db::{catalog, logs, rankings};
use crate::error::{AppError, Result};
use crate::fetcher::MarketClient;
use crate::types::now_secs;

pub struct Scheduler<M> {
    pool: SqlitePool,
    cfg: Config,
    coordinator: Arc<CrawlCoordinator<M>>,
    health: Arc<HealthState>,
}

impl<M: MarketClient> Scheduler<M> {
    pub fn new(
        pool: SqlitePool,
        cfg: Config,
        coordinator: Arc<CrawlCoordinator<M>>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            pool,
            cfg,
            coordinator,
            health,
        }
    }

    /// Main crawl loop. Returns when the shutdown signal fires; the tick in
    /// progress completes first.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.cfg.scheduler_check_interval_min.max(1) * 60);
        let mut ticker = interval(period);
        // Overdue ticks coalesce into a single catch-up run.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // consume the immediate first tick

        self.health.set_scheduler_running(true);
        info!(
            period_min = self.cfg.scheduler_check_interval_min,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(&shutdown).await;
                    self.health.set_last_tick_at(now_secs());
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        self.health.set_scheduler_running(false);
        info!("scheduler stopped");
    }

    async fn tick(&self, shutdown: &watch::Receiver<bool>) {
        let tenants = match catalog::list_tenants(&self.pool).await {
            Ok(t) => t,
            Err(e) => {
                error!("scheduler tenant load failed: {e}");
                return;
            }
        };

        let now = now_secs();
        for tenant in tenants {
            // Finish the current tenant but accept no more once shutdown fires.
            if *shutdown.borrow() {
                break;
            }
            if tenant.crawl_interval_min <= 0 {
                continue;
            }

            let last = match catalog::tenant_last_crawled_at(&self.pool, tenant.id).await {
                Ok(last) => last,
                Err(e) => {
                    error!(tenant_id = tenant.id, "due-time read failed: {e}");
                    continue;
                }
            };
            if !is_due(last, tenant.crawl_interval_min, now) {
                debug!(tenant_id = tenant.id, "not due yet, skipping");
                continue;
            }

            info!(
                tenant_id = tenant.id,
                tenant = %tenant.name,
                interval_min = tenant.crawl_interval_min,
                "scheduled crawl starting"
            );
            match self.coordinator.crawl_tenant(tenant.id).await {
                Ok(stats) => info!(
                    tenant_id = tenant.id,
                    total = stats.total,
                    success = stats.success,
                    failed = stats.failed,
                    "scheduled crawl finished"
                ),
                // A manual run holds the lock; this tick just skips the tenant.
                Err(AppError::AlreadyRunning { .. }) => {
                    debug!(tenant_id = tenant.id, "already running, skipped")
                }
                Err(e) => error!(tenant_id = tenant.id, "scheduled crawl failed: {e}"),
            }
        }
    }

    /// Retention sweep loop, every 24 h.
    pub async fn run_cleanup(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(CLEANUP_INTERVAL_HOURS * 3600));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match sweep_retention(
                        &self.pool,
                        self.cfg.retention_days,
                        self.cfg.cleanup_batch_size,
                    )
                    .await
                    {
                        Ok((rankings, logs)) => info!(rankings, logs, "retention sweep complete"),
                        Err(e) => error!("retention sweep failed: {e}"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

/// A tenant is due when it has never been crawled or the interval has elapsed.
pub fn is_due(last_crawled_at: Option<i64>, interval_min: i64, now: i64) -> bool {
    match last_crawled_at {
        None => true,
        Some(last) => now - last >= interval_min * 60,
    }
}

/// Delete rankings and crawl logs past the retention horizon, in batches;
/// each batch commits on its own so a long sweep never holds one giant
/// transaction. Returns (rankings deleted, logs deleted).
pub async fn sweep_retention(
    pool: &SqlitePool,
    retention_days: i64,
    batch_size: i64,
) -> Result<(u64, u64)> {
    let cutoff = now_secs() - retention_days * 86400;

    let mut rankings_deleted = 0u64;
    loop {
        let deleted = rankings::delete_rankings_before(pool, cutoff, batch_size).await?;
        rankings_deleted += deleted;
        if deleted < batch_size as u64 {
            break;
        }
    }

    let mut logs_deleted = 0u64;
    loop {
        let deleted = logs::delete_logs_before(pool, cutoff, batch_size).await?;
        logs_deleted += deleted;
        if deleted < batch_size as u64 {
            break;
        }
    }

    Ok((rankings_deleted, logs_deleted))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::types::{Listing, Verdict};

    #[test]
    fn due_time_decision() {
        let now = 100_000;
        assert!(is_due(None, 60, now));
        assert!(is_due(Some(now - 3600), 60, now));
        assert!(!is_due(Some(now - 3599), 60, now));
        assert!(!is_due(Some(now), 60, now));
    }

    #[tokio::test]
    async fn sweep_deletes_only_expired_rows() {
        let pool = test_pool().await;
        let tenant = catalog::create_tenant(&pool, "t", None, 60).await.unwrap();
        let product = catalog::create_product(
            &pool, tenant.id, "p", None, 0, 1000, None, None, None,
        )
        .await
        .unwrap();
        let kw = catalog::create_keyword(
            &pool,
            product.id,
            "kw",
            crate::types::SortMode::Relevance,
            true,
            5,
        )
        .await
        .unwrap();

        let old = now_secs() - 40 * 86400;
        let fresh = now_secs();
        for (i, at) in [(0, old), (1, old), (2, fresh)] {
            let listing = Listing {
                rank: i + 1,
                listing_id: format!("L{i}"),
                ..Default::default()
            };
            rankings::insert_ranking(
                &pool,
                kw.id,
                &listing,
                false,
                Verdict { relevant: true, reason: None },
                at,
            )
            .await
            .unwrap();
        }

        let (deleted, _) = sweep_retention(&pool, 30, 10).await.unwrap();
        assert_eq!(deleted, 2);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rankings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
