//! Alert engine: threshold checks after persistence, a 24-hour unread dedup
//! window per (product, kind), and push fanout.

use std::collections::{HashMap, HashSet};

use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;

use crate::db::models::{KeywordRow, ProductRow, RankingRow, TenantRow};
use crate::db::{alerts as alert_db, catalog, overrides, rankings};
use crate::error::Result;
use crate::push::PushClient;
use crate::types::{now_secs, AlertKind};

const RANK_WINDOW_DAYS: i64 = 7;

pub struct AlertEngine {
    pool: SqlitePool,
    push: PushClient,
    dedup_hours: i64,
}

impl AlertEngine {
    pub fn new(pool: SqlitePool, push: PushClient, dedup_hours: i64) -> Self {
        Self {
            pool,
            push,
            dedup_hours,
        }
    }

    /// Run every check for one product. Called by the coordinator after all
    /// of the product's keywords have been persisted.
    pub async fn check_product(&self, product_id: i64) -> Result<()> {
        let Some(product) = catalog::get_product(&self.pool, product_id).await? else {
            return Ok(());
        };
        let Some(tenant) = catalog::get_tenant(&self.pool, product.tenant_id).await? else {
            return Ok(());
        };
        let keywords = catalog::active_keywords_for_product(&self.pool, product_id).await?;
        if keywords.is_empty() {
            return Ok(());
        }

        self.check_price_undercut(&tenant, &product, &keywords).await?;
        self.check_rank_drop(&tenant, &product, &keywords).await?;
        Ok(())
    }

    fn dedup_since(&self) -> i64 {
        now_secs() - self.dedup_hours * 3600
    }

    /// Lowest relevant competitor total under our selling price → alert.
    async fn check_price_undercut(
        &self,
        tenant: &TenantRow,
        product: &ProductRow,
        keywords: &[KeywordRow],
    ) -> Result<()> {
        let (enabled, _) =
            alert_db::setting(&self.pool, tenant.id, AlertKind::PriceUndercut).await?;
        if !enabled {
            return Ok(());
        }

        let blacklisted: HashSet<String> = overrides::list_blacklist(&self.pool, product.id)
            .await?
            .into_iter()
            .map(|b| b.listing_id)
            .collect();

        let latest = rankings::latest_rankings_for_product(&self.pool, product.id).await?;
        let lowest = latest
            .values()
            .flatten()
            .filter(|r| r.is_relevant)
            .filter(|r| match r.listing_id.as_deref() {
                Some(id) => !blacklisted.contains(id),
                None => true,
            })
            .min_by_key(|r| r.total_price());

        let Some(lowest) = lowest else {
            return Ok(());
        };
        let lowest_total = lowest.total_price();
        if lowest_total >= product.selling_price {
            return Ok(());
        }

        if alert_db::has_recent_unread(
            &self.pool,
            tenant.id,
            product.id,
            AlertKind::PriceUndercut,
            self.dedup_since(),
        )
        .await?
        {
            return Ok(());
        }

        let gap = product.selling_price - lowest_total;
        let gap_percent = if product.selling_price > 0 {
            (gap as f64 / product.selling_price as f64) * 100.0
        } else {
            0.0
        };
        let keyword_text = keywords
            .iter()
            .find(|k| k.id == lowest.keyword_id)
            .map(|k| k.text.clone())
            .unwrap_or_default();

        let title = format!("{} - 최저가 이탈", product.name);
        let body = format!(
            "{} {}원 (내 가격 대비 -{}원, -{:.1}%)",
            lowest.mall, lowest_total, gap, gap_percent
        );
        let payload = json!({
            "keyword": keyword_text,
            "my_price": product.selling_price,
            "competitor_price": lowest_total,
            "competitor_name": lowest.mall,
            "gap": gap,
            "gap_percent": (gap_percent * 10.0).round() / 10.0,
        });

        alert_db::insert_alert(
            &self.pool,
            tenant.id,
            Some(product.id),
            AlertKind::PriceUndercut,
            &title,
            &body,
            &payload,
        )
        .await?;
        info!(
            product_id = product.id,
            lowest_total, "price undercut alert created"
        );

        self.push
            .send_to_tenant(
                &self.pool,
                tenant.id,
                &title,
                &body,
                json!({"type": "price_undercut", "product_id": product.id}),
            )
            .await;
        Ok(())
    }

    /// Our best rank worsened between the two most recent crawls → alert.
    async fn check_rank_drop(
        &self,
        tenant: &TenantRow,
        product: &ProductRow,
        keywords: &[KeywordRow],
    ) -> Result<()> {
        // Without a store label we cannot tell our listings apart.
        let Some(label) = tenant.own_store_label.as_deref() else {
            return Ok(());
        };
        if label.trim().is_empty() {
            return Ok(());
        }

        let (enabled, _) = alert_db::setting(&self.pool, tenant.id, AlertKind::RankDrop).await?;
        if !enabled {
            return Ok(());
        }

        let since = now_secs() - RANK_WINDOW_DAYS * 86400;
        let own_rows = rankings::own_rankings_since(&self.pool, product.id, tenant.id, since).await?;
        if own_rows.is_empty() {
            return Ok(());
        }

        let mut by_keyword: HashMap<i64, Vec<&RankingRow>> = HashMap::new();
        for row in &own_rows {
            by_keyword.entry(row.keyword_id).or_default().push(row);
        }

        for (keyword_id, rows) in by_keyword {
            // Rows arrive newest first; pick the two most recent distinct instants.
            let mut instants: Vec<i64> = Vec::new();
            for row in &rows {
                if instants.last() != Some(&row.crawled_at) {
                    instants.push(row.crawled_at);
                }
                if instants.len() >= 2 {
                    break;
                }
            }
            if instants.len() < 2 {
                continue;
            }

            let best_at = |at: i64| {
                rows.iter()
                    .filter(|r| r.crawled_at == at)
                    .map(|r| r.rank)
                    .min()
            };
            let (Some(current), Some(previous)) = (best_at(instants[0]), best_at(instants[1]))
            else {
                continue;
            };
            if current <= previous {
                continue;
            }

            if alert_db::has_recent_unread(
                &self.pool,
                tenant.id,
                product.id,
                AlertKind::RankDrop,
                self.dedup_since(),
            )
            .await?
            {
                continue;
            }

            let keyword_text = keywords
                .iter()
                .find(|k| k.id == keyword_id)
                .map(|k| k.text.clone())
                .unwrap_or_default();
            let title = format!("{} - 순위 하락", product.name);
            let body = format!(
                "'{}' 키워드에서 {}위 → {}위로 하락",
                keyword_text, previous, current
            );
            let payload = json!({
                "keyword_id": keyword_id,
                "keyword": keyword_text,
                "prev_rank": previous,
                "current_rank": current,
            });

            alert_db::insert_alert(
                &self.pool,
                tenant.id,
                Some(product.id),
                AlertKind::RankDrop,
                &title,
                &body,
                &payload,
            )
            .await?;
            info!(
                product_id = product.id,
                keyword_id, previous, current, "rank drop alert created"
            );

            self.push
                .send_to_tenant(
                    &self.pool,
                    tenant.id,
                    &title,
                    &body,
                    json!({"type": "rank_drop", "product_id": product.id}),
                )
                .await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_pool;
    use crate::types::{Listing, SortMode, Verdict};

    fn push_config() -> Config {
        Config {
            log_level: "info".into(),
            db_path: ":memory:".into(),
            api_port: 0,
            client_id: "id".into(),
            client_secret: "secret".into(),
            default_interval_min: 60,
            max_retries: 3,
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

    async fn engine(pool: &SqlitePool) -> AlertEngine {
        let cfg = push_config();
        AlertEngine::new(pool.clone(), PushClient::new(&cfg).unwrap(), cfg.alert_dedup_hours)
    }

    async fn seed(pool: &SqlitePool) -> (TenantRow, ProductRow, KeywordRow) {
        let tenant = catalog::create_tenant(pool, "tenant", Some("마이스토어"), 60)
            .await
            .unwrap();
        let product = catalog::create_product(
            pool, tenant.id, "위젯", None, 10000, 20000, None, None, None,
        )
        .await
        .unwrap();
        let keyword = catalog::create_keyword(pool, product.id, "widget", SortMode::Relevance, true, 5)
            .await
            .unwrap();
        (tenant, product, keyword)
    }

    async fn insert_row(
        pool: &SqlitePool,
        keyword_id: i64,
        rank: i64,
        listing_id: &str,
        price: i64,
        own: bool,
        at: i64,
    ) {
        let listing = Listing {
            rank,
            title: format!("상품 {rank}"),
            price,
            mall: if own { "마이스토어".into() } else { "몰A".into() },
            listing_id: listing_id.to_string(),
            ..Default::default()
        };
        rankings::insert_ranking(
            pool,
            keyword_id,
            &listing,
            own,
            Verdict { relevant: !own, reason: None },
            at,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn undercut_fires_once_within_dedup_window() {
        let pool = test_pool().await;
        let (tenant, product, keyword) = seed(&pool).await;
        let now = now_secs();
        insert_row(&pool, keyword.id, 1, "C1", 18000, false, now).await;

        let engine = engine(&pool).await;
        engine.check_product(product.id).await.unwrap();
        engine.check_product(product.id).await.unwrap();

        let alerts = alert_db::list_alerts(&pool, tenant.id, false, 10).await.unwrap();
        let undercuts: Vec<_> = alerts.iter().filter(|a| a.kind == "price_undercut").collect();
        assert_eq!(undercuts.len(), 1, "dedup window must suppress the second alert");

        // Once read, the condition may fire again.
        alert_db::mark_read(&pool, undercuts[0].id).await.unwrap();
        engine.check_product(product.id).await.unwrap();
        let alerts = alert_db::list_alerts(&pool, tenant.id, false, 10).await.unwrap();
        assert_eq!(
            alerts.iter().filter(|a| a.kind == "price_undercut").count(),
            2
        );
    }

    #[tokio::test]
    async fn undercut_ignores_blacklisted_and_irrelevant_rows() {
        let pool = test_pool().await;
        let (tenant, product, keyword) = seed(&pool).await;
        let now = now_secs();

        // Irrelevant cheap row.
        let listing = Listing {
            rank: 1,
            price: 1000,
            listing_id: "IRR".into(),
            ..Default::default()
        };
        rankings::insert_ranking(
            &pool,
            keyword.id,
            &listing,
            false,
            Verdict { relevant: false, reason: None },
            now,
        )
        .await
        .unwrap();
        // Blacklisted cheap row (blacklist added after crawl, row still relevant).
        insert_row(&pool, keyword.id, 2, "BL", 2000, false, now).await;
        sqlx::query("INSERT INTO blacklist (product_id, listing_id, created_at) VALUES (?, 'BL', 0)")
            .bind(product.id)
            .execute(&pool)
            .await
            .unwrap();
        // Competitor above our price.
        insert_row(&pool, keyword.id, 3, "HI", 25000, false, now).await;

        let engine = engine(&pool).await;
        engine.check_product(product.id).await.unwrap();
        let alerts = alert_db::list_alerts(&pool, tenant.id, false, 10).await.unwrap();
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn undercut_respects_disabled_setting() {
        let pool = test_pool().await;
        let (tenant, product, keyword) = seed(&pool).await;
        alert_db::upsert_setting(&pool, tenant.id, AlertKind::PriceUndercut, false, None)
            .await
            .unwrap();
        insert_row(&pool, keyword.id, 1, "C1", 18000, false, now_secs()).await;

        let engine = engine(&pool).await;
        engine.check_product(product.id).await.unwrap();
        let alerts = alert_db::list_alerts(&pool, tenant.id, false, 10).await.unwrap();
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn rank_drop_compares_best_rank_of_two_instants() {
        let pool = test_pool().await;
        let (tenant, product, keyword) = seed(&pool).await;
        let t0 = now_secs() - 3600;
        let t1 = now_secs();

        // Two own listings per instant: min(2,7)=2 then min(4,9)=4 → drop.
        insert_row(&pool, keyword.id, 2, "O1", 20000, true, t0).await;
        insert_row(&pool, keyword.id, 7, "O2", 21000, true, t0).await;
        insert_row(&pool, keyword.id, 4, "O1", 20000, true, t1).await;
        insert_row(&pool, keyword.id, 9, "O2", 21000, true, t1).await;

        let engine = engine(&pool).await;
        engine.check_product(product.id).await.unwrap();

        let alerts = alert_db::list_alerts(&pool, tenant.id, false, 10).await.unwrap();
        let drops: Vec<_> = alerts.iter().filter(|a| a.kind == "rank_drop").collect();
        assert_eq!(drops.len(), 1);
        let payload: serde_json::Value =
            serde_json::from_str(drops[0].payload.as_deref().unwrap()).unwrap();
        assert_eq!(payload["prev_rank"], 2);
        assert_eq!(payload["current_rank"], 4);
    }

    #[tokio::test]
    async fn rank_improvement_is_silent() {
        let pool = test_pool().await;
        let (tenant, product, keyword) = seed(&pool).await;
        let t0 = now_secs() - 3600;
        let t1 = now_secs();

        insert_row(&pool, keyword.id, 5, "O1", 20000, true, t0).await;
        insert_row(&pool, keyword.id, 2, "O1", 20000, true, t1).await;

        let engine = engine(&pool).await;
        engine.check_product(product.id).await.unwrap();
        let alerts = alert_db::list_alerts(&pool, tenant.id, false, 10).await.unwrap();
        assert!(alerts.iter().all(|a| a.kind != "rank_drop"));
    }

    #[tokio::test]
    async fn rank_drop_requires_store_label() {
        let pool = test_pool().await;
        let tenant = catalog::create_tenant(&pool, "nolabel", None, 60).await.unwrap();
        let product = catalog::create_product(
            &pool, tenant.id, "위젯", None, 0, 20000, None, None, None,
        )
        .await
        .unwrap();
        let keyword = catalog::create_keyword(&pool, product.id, "w", SortMode::Relevance, true, 5)
            .await
            .unwrap();
        insert_row(&pool, keyword.id, 2, "O1", 20000, true, now_secs() - 3600).await;
        insert_row(&pool, keyword.id, 6, "O1", 20000, true, now_secs()).await;

        let engine = engine(&pool).await;
        engine.check_product(product.id).await.unwrap();
        let alerts = alert_db::list_alerts(&pool, tenant.id, false, 10).await.unwrap();
        assert!(alerts.is_empty());
    }
}
