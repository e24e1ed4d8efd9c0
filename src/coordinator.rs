//! Crawl coordination: per-scope mutual exclusion, the fetch/persist
//! pipeline, and keyword deduplication.
//!
//! A run fetches every distinct `(text, sort_mode)` pair once under a
//! semaphore, then persists strictly sequentially — one writer per run, one
//! transaction shape per keyword, so a failed keyword never poisons the rest.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tracing::{error, info, warn};

use crate::alerts::AlertEngine;
use crate::api::metrics::CrawlDurations;
use crate::config::Config;
use crate::db::models::{KeywordRow, ProductRow};
use crate::db::{catalog, logs, overrides, rankings};
use crate::enricher::ShippingEnricher;
use crate::error::{AppError, Result};
use crate::fetcher::MarketClient;
use crate::relevance::{classify, RelevanceContext};
use crate::types::{
    now_secs, CrawlStatus, KeywordCrawlSummary, RunStats, SearchOutcome, SortMode,
};

type LockMap = DashMap<i64, Arc<Mutex<()>>>;

pub struct CrawlCoordinator<M> {
    pool: SqlitePool,
    client: Arc<M>,
    cfg: Config,
    alerts: AlertEngine,
    durations: Arc<CrawlDurations>,
    /// Lazily created, never evicted — bounded by the number of tenants and
    /// products. Acquisition is fail-fast; no queueing.
    tenant_locks: LockMap,
    product_locks: LockMap,
}

/// Everything the persist phase needs, loaded up front in batched queries.
struct RunPlan {
    own_store_label: Option<String>,
    products: HashMap<i64, ProductRow>,
    /// Deduplicated fetch units: one entry per distinct (text, sort_mode).
    buckets: Vec<Bucket>,
    blacklist: HashMap<i64, HashSet<String>>,
    includes: HashMap<i64, HashSet<String>>,
    shipping_overrides: HashMap<i64, HashMap<String, i64>>,
    own_listing_ids: HashSet<String>,
}

struct Bucket {
    text: String,
    sort_mode: SortMode,
    keywords: Vec<KeywordRow>,
}

struct FetchedBucket {
    bucket: Bucket,
    outcome: SearchOutcome,
    duration_ms: i64,
}

impl<M: MarketClient> CrawlCoordinator<M> {
    pub fn new(
        pool: SqlitePool,
        client: Arc<M>,
        cfg: Config,
        alerts: AlertEngine,
        durations: Arc<CrawlDurations>,
    ) -> Self {
        Self {
            pool,
            client,
            cfg,
            alerts,
            durations,
            tenant_locks: DashMap::new(),
            product_locks: DashMap::new(),
        }
    }

    /// On-demand crawl of a single product. Fails fast with `AlreadyRunning`
    /// when another product-scoped run holds the lock.
    pub async fn crawl_product(&self, product_id: i64) -> Result<Vec<KeywordCrawlSummary>> {
        let _guard = acquire(&self.product_locks, product_id, "product")?;

        let product = catalog::get_product(&self.pool, product_id)
            .await?
            .ok_or(AppError::NotFound("product"))?;
        let keywords = catalog::active_keywords_for_product(&self.pool, product_id).await?;
        let plan = self.build_plan(product.tenant_id, vec![product], keywords).await?;
        let fetched = self.fetch_phase(&plan).await;
        let (summaries, _) = self.persist_phase(&plan, fetched).await;
        Ok(summaries)
    }

    /// Full tenant run on the scheduler's behalf. Does not take product locks
    /// — overlap with a manual product run is tolerated; keyword dedup and
    /// the serial write stage keep it harmless.
    pub async fn crawl_tenant(&self, tenant_id: i64) -> Result<RunStats> {
        let _guard = acquire(&self.tenant_locks, tenant_id, "tenant")?;

        catalog::get_tenant(&self.pool, tenant_id)
            .await?
            .ok_or(AppError::NotFound("tenant"))?;
        let products = catalog::active_products_for_tenant(&self.pool, tenant_id).await?;
        let keywords = catalog::active_keywords_for_tenant(&self.pool, tenant_id).await?;
        let plan = self.build_plan(tenant_id, products, keywords).await?;

        let keyword_total: usize = plan.buckets.iter().map(|b| b.keywords.len()).sum();
        info!(
            tenant_id,
            keywords = keyword_total,
            distinct = plan.buckets.len(),
            "tenant crawl started"
        );

        let fetched = self.fetch_phase(&plan).await;
        let (_, stats) = self.persist_phase(&plan, fetched).await;
        info!(
            tenant_id,
            total = stats.total,
            success = stats.success,
            failed = stats.failed,
            "tenant crawl finished"
        );
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Plan
    // -----------------------------------------------------------------------

    async fn build_plan(
        &self,
        tenant_id: i64,
        products: Vec<ProductRow>,
        keywords: Vec<KeywordRow>,
    ) -> Result<RunPlan> {
        let tenant = catalog::get_tenant(&self.pool, tenant_id)
            .await?
            .ok_or(AppError::NotFound("tenant"))?;

        // Dedup by (lowercased trimmed text, sort_mode) — shared keywords hit
        // the marketplace once and fan back out at persist time.
        let mut index: HashMap<(String, SortMode), usize> = HashMap::new();
        let mut buckets: Vec<Bucket> = Vec::new();
        for kw in keywords {
            let key = (
                kw.text.trim().to_lowercase(),
                SortMode::parse(&kw.sort_mode),
            );
            match index.get(&key) {
                Some(&i) => buckets[i].keywords.push(kw),
                None => {
                    index.insert(key.clone(), buckets.len());
                    buckets.push(Bucket {
                        text: kw.text.trim().to_string(),
                        sort_mode: key.1,
                        keywords: vec![kw],
                    });
                }
            }
        }

        let blacklist = overrides::blacklist_by_product(&self.pool, tenant_id).await?;
        let includes = overrides::includes_by_product(&self.pool, tenant_id).await?;
        let shipping = overrides::shipping_overrides_by_product(&self.pool, tenant_id).await?;
        let own_listing_ids = catalog::own_listing_ids(&self.pool, tenant_id).await?;

        Ok(RunPlan {
            own_store_label: tenant.own_store_label,
            products: products.into_iter().map(|p| (p.id, p)).collect(),
            buckets,
            blacklist: blacklist
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect(),
            includes: includes
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect(),
            shipping_overrides: shipping,
            own_listing_ids,
        })
    }

    // -----------------------------------------------------------------------
    // Fetch — parallel, no database access
    // -----------------------------------------------------------------------

    async fn fetch_phase(&self, plan: &RunPlan) -> Vec<FetchedBucket> {
        let semaphore = Arc::new(Semaphore::new(self.cfg.crawl_concurrency.max(1)));
        let enricher = Arc::new(ShippingEnricher::new(
            Arc::clone(&self.client),
            self.cfg.shipping_concurrency,
        ));

        let futures: Vec<_> = plan
            .buckets
            .iter()
            .map(|bucket| {
                let semaphore = Arc::clone(&semaphore);
                let enricher = Arc::clone(&enricher);
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore never closed");
                    let started = Instant::now();
                    let outcome = self.fetch_one(&bucket.text, bucket.sort_mode, &enricher).await;
                    let elapsed = started.elapsed();
                    self.durations.record(elapsed);
                    (outcome, elapsed.as_millis() as i64)
                }
            })
            .collect();

        let results = futures_util::future::join_all(futures).await;

        // Reunite outcomes with their buckets. Plan order is preserved by
        // join_all even though completion order is not.
        let mut fetched = Vec::with_capacity(results.len());
        for (bucket, (outcome, duration_ms)) in plan
            .buckets
            .iter()
            .map(|b| Bucket {
                text: b.text.clone(),
                sort_mode: b.sort_mode,
                keywords: b.keywords.clone(),
            })
            .zip(results)
        {
            fetched.push(FetchedBucket {
                bucket,
                outcome,
                duration_ms,
            });
        }
        fetched
    }

    async fn fetch_one(
        &self,
        text: &str,
        sort_mode: SortMode,
        enricher: &ShippingEnricher<M>,
    ) -> SearchOutcome {
        let attempts = self.cfg.max_retries.max(1);
        let mut last = SearchOutcome::failure("no attempts made");

        for attempt in 1..=attempts {
            self.sleep_jitter().await;
            let mut outcome = self.client.search(text, sort_mode).await;
            if outcome.ok {
                enricher.enrich(&mut outcome.listings).await;
                return outcome;
            }
            warn!(
                keyword = text,
                attempt,
                error = outcome.error.as_deref().unwrap_or(""),
                "search attempt failed"
            );
            last = outcome;
        }
        last
    }

    async fn sleep_jitter(&self) {
        let (min, max) = (self.cfg.request_delay_min, self.cfg.request_delay_max);
        if max <= 0.0 {
            return;
        }
        let secs = if max > min {
            rand::thread_rng().gen_range(min..max)
        } else {
            min
        };
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    // -----------------------------------------------------------------------
    // Persist — strictly sequential, single writer per run
    // -----------------------------------------------------------------------

    async fn persist_phase(
        &self,
        plan: &RunPlan,
        fetched: Vec<FetchedBucket>,
    ) -> (Vec<KeywordCrawlSummary>, RunStats) {
        let mut summaries = Vec::new();
        let mut stats = RunStats::default();
        let mut touched_products: Vec<i64> = Vec::new();
        // Own-price auto-updates must be visible to later keywords in the run.
        let mut selling_prices: HashMap<i64, i64> =
            plan.products.iter().map(|(&id, p)| (id, p.selling_price)).collect();

        for item in fetched {
            for kw in &item.bucket.keywords {
                let result = self
                    .persist_keyword(plan, kw, &item.outcome, item.duration_ms, &mut selling_prices)
                    .await;

                stats.total += 1;
                let (status, error) = match result {
                    Ok(status) => {
                        if status == CrawlStatus::Success {
                            stats.success += 1;
                        } else {
                            stats.failed += 1;
                        }
                        (status, item.outcome.error.clone())
                    }
                    Err(e) => {
                        // One keyword's persistence failure never aborts the run.
                        error!(keyword_id = kw.id, "persist failed: {e}");
                        stats.failed += 1;
                        (CrawlStatus::Failed, Some(e.to_string()))
                    }
                };

                if !touched_products.contains(&kw.product_id) {
                    touched_products.push(kw.product_id);
                }
                summaries.push(KeywordCrawlSummary {
                    keyword_id: kw.id,
                    text: kw.text.clone(),
                    sort_mode: SortMode::parse(&kw.sort_mode),
                    status,
                    listing_count: item.outcome.listings.len(),
                    duration_ms: item.duration_ms,
                    error,
                });
            }
        }

        for product_id in touched_products {
            if let Err(e) = self.alerts.check_product(product_id).await {
                warn!(product_id, "alert check failed: {e}");
            }
        }

        (summaries, stats)
    }

    async fn persist_keyword(
        &self,
        plan: &RunPlan,
        kw: &KeywordRow,
        outcome: &SearchOutcome,
        duration_ms: i64,
        selling_prices: &mut HashMap<i64, i64>,
    ) -> Result<CrawlStatus> {
        let crawled_at = now_secs();

        if !outcome.ok {
            catalog::mark_keyword_crawled(&self.pool, kw.id, CrawlStatus::Failed, crawled_at)
                .await?;
            logs::insert_crawl_log(
                &self.pool,
                kw.id,
                CrawlStatus::Failed,
                outcome.error.as_deref(),
                duration_ms,
            )
            .await?;
            return Ok(CrawlStatus::Failed);
        }

        let Some(product) = plan.products.get(&kw.product_id) else {
            return Err(AppError::NotFound("product"));
        };
        let empty_set = HashSet::new();
        let empty_fees = HashMap::new();
        let blacklist = plan.blacklist.get(&product.id).unwrap_or(&empty_set);
        let includes = plan.includes.get(&product.id).unwrap_or(&empty_set);
        let fee_overrides = plan.shipping_overrides.get(&product.id).unwrap_or(&empty_fees);

        // Price filters compare against the possibly-updated selling price.
        let mut product_now = product.clone();
        if let Some(&price) = selling_prices.get(&product.id) {
            product_now.selling_price = price;
        }

        for listing in &outcome.listings {
            let mut listing = listing.clone();
            if let Some(&fee) = fee_overrides.get(&listing.listing_id) {
                listing.shipping_fee = fee;
                listing.shipping_fee_type = crate::types::ShippingFeeType::Paid;
            }

            let is_own_store = mall_matches_label(&listing.mall, plan.own_store_label.as_deref());
            let ctx = RelevanceContext {
                product: &product_now,
                blacklist,
                include_overrides: includes,
                own_listing_ids: &plan.own_listing_ids,
            };
            let verdict = classify(&listing, &ctx);

            rankings::insert_ranking(&self.pool, kw.id, &listing, is_own_store, verdict, crawled_at)
                .await?;

            // The only catalog mutation in the pipeline: our own listing
            // reported a different price, adopt it.
            if product_now.own_listing_id.as_deref() == Some(listing.listing_id.as_str())
                && !listing.listing_id.is_empty()
                && listing.price != 0
                && listing.price != product_now.selling_price
            {
                info!(
                    product_id = product.id,
                    old = product_now.selling_price,
                    new = listing.price,
                    "own listing price changed, updating selling price"
                );
                catalog::update_selling_price(&self.pool, product.id, listing.price).await?;
                product_now.selling_price = listing.price;
                selling_prices.insert(product.id, listing.price);
            }
        }

        catalog::mark_keyword_crawled(&self.pool, kw.id, CrawlStatus::Success, crawled_at).await?;
        logs::insert_crawl_log(&self.pool, kw.id, CrawlStatus::Success, None, duration_ms).await?;
        Ok(CrawlStatus::Success)
    }
}

/// Fail-fast scope lock. The guard is held for the whole run; dropping it
/// releases the scope.
fn acquire(map: &LockMap, id: i64, scope: &'static str) -> Result<OwnedMutexGuard<()>> {
    let lock = {
        let entry = map.entry(id).or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    };
    lock.try_lock_owned()
        .map_err(|_| AppError::AlreadyRunning { scope })
}

fn mall_matches_label(mall: &str, label: Option<&str>) -> bool {
    match label {
        Some(label) if !label.trim().is_empty() => {
            mall.trim().to_lowercase() == label.trim().to_lowercase()
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::push::PushClient;
    use crate::types::{Listing, ShippingFeeType};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeMarket {
        search_calls: AtomicU32,
        shipping_calls: AtomicU32,
        listings: Vec<Listing>,
        /// Artificial latency so a second caller can observe the held lock.
        search_delay: Duration,
    }

    impl FakeMarket {
        fn returning(listings: Vec<Listing>) -> Self {
            Self {
                search_calls: AtomicU32::new(0),
                shipping_calls: AtomicU32::new(0),
                listings,
                search_delay: Duration::ZERO,
            }
        }
    }

    impl MarketClient for FakeMarket {
        async fn search(&self, _keyword: &str, _sort_mode: SortMode) -> SearchOutcome {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            if !self.search_delay.is_zero() {
                tokio::time::sleep(self.search_delay).await;
            }
            if self.listings.is_empty() {
                SearchOutcome::failure("no results: test")
            } else {
                SearchOutcome {
                    listings: self.listings.clone(),
                    ok: true,
                    error: None,
                }
            }
        }

        async fn fetch_shipping(&self, _url: &str) -> (i64, ShippingFeeType) {
            self.shipping_calls.fetch_add(1, Ordering::SeqCst);
            (0, ShippingFeeType::Free)
        }
    }

    fn test_config() -> Config {
        Config {
            log_level: "info".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 0,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            default_interval_min: 60,
            max_retries: 1,
            request_delay_min: 0.0,
            request_delay_max: 0.0,
            crawl_concurrency: 5,
            shipping_concurrency: 3,
            shipping_timeout_secs: 8,
            api_timeout_secs: 10,
            scheduler_check_interval_min: 10,
            retention_days: 30,
            cleanup_batch_size: 10_000,
            alert_dedup_hours: 24,
            max_keywords_per_product: 5,
            sparkline_days: 7,
            vapid_public_key: String::new(),
            vapid_private_key: String::new(),
            vapid_claim_email: String::new(),
        }
    }

    async fn coordinator(
        pool: &SqlitePool,
        market: Arc<FakeMarket>,
    ) -> CrawlCoordinator<FakeMarket> {
        let cfg = test_config();
        let push = PushClient::new(&cfg).unwrap();
        let alerts = AlertEngine::new(pool.clone(), push, cfg.alert_dedup_hours);
        CrawlCoordinator::new(
            pool.clone(),
            market,
            cfg,
            alerts,
            Arc::new(CrawlDurations::new()),
        )
    }

    fn listing(rank: i64, id: &str, mall: &str, price: i64) -> Listing {
        Listing {
            rank,
            title: format!("상품 {rank}"),
            price,
            mall: mall.to_string(),
            listing_id: id.to_string(),
            link: format!("https://smartstore.naver.com/s/products/{id}"),
            ..Default::default()
        }
    }

    async fn seed_product(pool: &SqlitePool, own_listing: Option<&str>) -> (i64, i64) {
        let tenant = catalog::create_tenant(pool, "tenant", Some("마이스토어"), 60)
            .await
            .unwrap();
        let product = catalog::create_product(
            pool, tenant.id, "위젯", None, 10000, 20000, own_listing, None, None,
        )
        .await
        .unwrap();
        catalog::create_keyword(pool, product.id, "widget", SortMode::Relevance, true, 5)
            .await
            .unwrap();
        (tenant.id, product.id)
    }

    #[tokio::test]
    async fn happy_path_own_price_update_and_undercut_alert() {
        let pool = test_pool().await;
        let (tenant_id, product_id) = seed_product(&pool, Some("L1")).await;

        let listings = vec![
            listing(1, "X1", "몰A", 25000),
            listing(3, "L1", "마이스토어", 19500),
            listing(5, "X2", "other", 18000),
        ];
        let market = Arc::new(FakeMarket::returning(listings));
        let coord = coordinator(&pool, Arc::clone(&market)).await;

        let summaries = coord.crawl_product(product_id).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].status, CrawlStatus::Success);
        assert_eq!(summaries[0].listing_count, 3);

        // Own listing reported 19500 — selling price follows.
        let product = catalog::get_product(&pool, product_id).await.unwrap().unwrap();
        assert_eq!(product.selling_price, 19500);

        // Competitor at 18000 undercuts 19500.
        let alerts = crate::db::alerts::list_alerts(&pool, tenant_id, true, 10)
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, "price_undercut");
        assert!(alerts[0].body.as_deref().unwrap_or("").contains("18000"));

        // One success log for the single keyword.
        let log_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM crawl_logs WHERE status = 'success'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(log_count, 1);
    }

    #[tokio::test]
    async fn already_running_fails_fast_without_writes() {
        let pool = test_pool().await;
        let (_, product_id) = seed_product(&pool, None).await;

        let market = Arc::new(FakeMarket {
            search_calls: AtomicU32::new(0),
            shipping_calls: AtomicU32::new(0),
            listings: vec![listing(1, "A1", "몰A", 15000)],
            search_delay: Duration::from_millis(300),
        });
        let coord = Arc::new(coordinator(&pool, Arc::clone(&market)).await);

        let first = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move { coord.crawl_product(product_id).await })
        };
        // Let the first run take the lock and park in the fetch phase.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = coord.crawl_product(product_id).await;
        assert!(matches!(
            second,
            Err(AppError::AlreadyRunning { scope: "product" })
        ));

        let summaries = first.await.unwrap().unwrap();
        assert_eq!(summaries.len(), 1);

        // Exactly one keyword's worth of log rows — the rejected run wrote nothing.
        let log_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM crawl_logs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(log_count, 1);
    }

    #[tokio::test]
    async fn shared_keywords_fetched_once_with_identical_listings() {
        let pool = test_pool().await;
        let tenant = catalog::create_tenant(&pool, "tenant", None, 60).await.unwrap();
        let p1 = catalog::create_product(&pool, tenant.id, "상품1", None, 0, 10000, None, None, None)
            .await
            .unwrap();
        let p2 = catalog::create_product(&pool, tenant.id, "상품2", None, 0, 10000, None, None, None)
            .await
            .unwrap();
        // Same text modulo case/whitespace, same sort mode → one fetch.
        let k1 = catalog::create_keyword(&pool, p1.id, "Widget Pro", SortMode::Relevance, true, 5)
            .await
            .unwrap();
        let k2 = catalog::create_keyword(&pool, p2.id, "widget pro ", SortMode::Relevance, true, 5)
            .await
            .unwrap();

        let market = Arc::new(FakeMarket::returning(vec![listing(1, "Z1", "몰A", 9000)]));
        let coord = coordinator(&pool, Arc::clone(&market)).await;

        let stats = coord.crawl_tenant(tenant.id).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.success, 2);
        assert_eq!(market.search_calls.load(Ordering::SeqCst), 1);

        // Both keywords received the identical listing set.
        for kw_id in [k1.id, k2.id] {
            let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rankings WHERE keyword_id = ?")
                .bind(kw_id)
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(rows, 1);
        }
    }

    #[tokio::test]
    async fn failed_search_records_failed_log_and_status() {
        let pool = test_pool().await;
        let (_, product_id) = seed_product(&pool, None).await;

        let market = Arc::new(FakeMarket::returning(Vec::new()));
        let coord = coordinator(&pool, Arc::clone(&market)).await;

        let summaries = coord.crawl_product(product_id).await.unwrap();
        assert_eq!(summaries[0].status, CrawlStatus::Failed);
        assert!(summaries[0].error.as_deref().unwrap_or("").contains("no results"));

        let status: String =
            sqlx::query_scalar("SELECT last_status FROM keywords WHERE product_id = ?")
                .bind(product_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "failed");
    }

    #[tokio::test]
    async fn blacklist_wins_over_model_code_at_persist() {
        let pool = test_pool().await;
        let tenant = catalog::create_tenant(&pool, "tenant", None, 60).await.unwrap();
        let product = catalog::create_product(
            &pool, tenant.id, "가젯", None, 0, 20000, None, Some("X7"), None,
        )
        .await
        .unwrap();
        catalog::create_keyword(&pool, product.id, "gadget", SortMode::Relevance, true, 5)
            .await
            .unwrap();
        overrides::add_blacklist(&pool, product.id, "B1", None, None)
            .await
            .unwrap();

        let mut hit = listing(1, "B1", "몰A", 15000);
        hit.title = "X7 gadget".to_string();
        let market = Arc::new(FakeMarket::returning(vec![hit]));
        let coord = coordinator(&pool, Arc::clone(&market)).await;
        coord.crawl_product(product.id).await.unwrap();

        let (relevant, reason): (bool, Option<String>) = sqlx::query_as(
            "SELECT is_relevant, relevance_reason FROM rankings WHERE listing_id = 'B1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(!relevant);
        assert_eq!(reason.as_deref(), Some("manual_blacklist"));
    }

    #[tokio::test]
    async fn shipping_override_applied_at_write() {
        let pool = test_pool().await;
        let (_, product_id) = seed_product(&pool, None).await;
        overrides::upsert_shipping_override(&pool, product_id, "S9", 4000, None, None)
            .await
            .unwrap();

        let market = Arc::new(FakeMarket::returning(vec![listing(1, "S9", "몰A", 15000)]));
        let coord = coordinator(&pool, Arc::clone(&market)).await;
        coord.crawl_product(product_id).await.unwrap();

        let (fee, fee_type): (i64, String) = sqlx::query_as(
            "SELECT shipping_fee, shipping_fee_type FROM rankings WHERE listing_id = 'S9'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(fee, 4000);
        assert_eq!(fee_type, "paid");
    }
}
