use std::collections::{HashMap, HashSet};

use sqlx::SqlitePool;

use crate::db::models::RankingRow;
use crate::error::Result;
use crate::types::{Listing, Verdict};

/// Insert one ranking row. Shipping overrides are applied by the caller
/// before the listing reaches this point; rows are immutable afterwards.
pub async fn insert_ranking(
    pool: &SqlitePool,
    keyword_id: i64,
    listing: &Listing,
    is_own_store: bool,
    verdict: Verdict,
    crawled_at: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO rankings (
            keyword_id, rank, title, price, mall, listing_id, link, image, hprice,
            brand, maker, product_type, category1, category2, category3, category4,
            shipping_fee, shipping_fee_type, is_own_store, is_relevant,
            relevance_reason, crawled_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(keyword_id)
    .bind(listing.rank)
    .bind(&listing.title)
    .bind(listing.price)
    .bind(&listing.mall)
    .bind(if listing.listing_id.is_empty() {
        None
    } else {
        Some(listing.listing_id.as_str())
    })
    .bind(&listing.link)
    .bind(&listing.image)
    .bind(listing.hprice)
    .bind(&listing.brand)
    .bind(&listing.maker)
    .bind(&listing.product_type)
    .bind(&listing.category1)
    .bind(&listing.category2)
    .bind(&listing.category3)
    .bind(&listing.category4)
    .bind(listing.shipping_fee)
    .bind(listing.shipping_fee_type.to_string())
    .bind(is_own_store)
    .bind(verdict.relevant)
    .bind(verdict.reason.map(|r| r.to_string()))
    .bind(crawled_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Latest crawl per keyword for one product: rows sharing MAX(crawled_at),
/// resolved in a single query via the per-keyword subquery join.
pub async fn latest_rankings_for_product(
    pool: &SqlitePool,
    product_id: i64,
) -> Result<HashMap<i64, Vec<RankingRow>>> {
    let rows = sqlx::query_as::<_, RankingRow>(
        "SELECT r.* FROM rankings r
         JOIN (
             SELECT keyword_id, MAX(crawled_at) AS max_at
             FROM rankings
             WHERE keyword_id IN (SELECT id FROM keywords WHERE product_id = ? AND active = 1)
             GROUP BY keyword_id
         ) latest ON latest.keyword_id = r.keyword_id AND latest.max_at = r.crawled_at
         ORDER BY r.keyword_id, r.rank",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<i64, Vec<RankingRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.keyword_id).or_default().push(row);
    }
    Ok(grouped)
}

/// Per-day minimum of price + shipping over the window, relevant rows only,
/// blacklisted listings excluded in the aggregate itself.
pub async fn sparkline(
    pool: &SqlitePool,
    product_id: i64,
    since: i64,
) -> Result<Vec<i64>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT crawled_at / 86400 AS day, MIN(price + shipping_fee) AS min_total
         FROM rankings
         WHERE keyword_id IN (SELECT id FROM keywords WHERE product_id = ? AND active = 1)
           AND crawled_at >= ?
           AND is_relevant = 1
           AND (listing_id IS NULL OR listing_id NOT IN
                (SELECT listing_id FROM blacklist WHERE product_id = ?))
         GROUP BY day
         ORDER BY day",
    )
    .bind(product_id)
    .bind(since)
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(_, min)| min).collect())
}

/// Rankings of the tenant's own listings for one product since `since`,
/// newest first. Matches either the store-label flag set at persist time or a
/// registered own listing id.
pub async fn own_rankings_since(
    pool: &SqlitePool,
    product_id: i64,
    tenant_id: i64,
    since: i64,
) -> Result<Vec<RankingRow>> {
    let rows = sqlx::query_as::<_, RankingRow>(
        "SELECT r.* FROM rankings r
         WHERE r.keyword_id IN (SELECT id FROM keywords WHERE product_id = ? AND active = 1)
           AND r.crawled_at >= ?
           AND (r.is_own_store = 1 OR (r.listing_id IS NOT NULL AND r.listing_id IN
                (SELECT own_listing_id FROM products
                 WHERE tenant_id = ? AND own_listing_id IS NOT NULL)))
         ORDER BY r.crawled_at DESC, r.rank",
    )
    .bind(product_id)
    .bind(since)
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// My best rank in the latest crawl of each keyword, lowest across keywords.
pub fn best_own_rank(
    latest: &HashMap<i64, Vec<RankingRow>>,
    own_listing_id: Option<&str>,
) -> Option<i64> {
    latest
        .values()
        .flatten()
        .filter(|r| match own_listing_id {
            Some(id) => r.listing_id.as_deref() == Some(id),
            None => r.is_own_store,
        })
        .map(|r| r.rank)
        .min()
}

/// Distinct brand/maker and category1..4 values, lowercased — feeds the
/// keyword generator's DB dictionary.
pub async fn dictionary_terms(pool: &SqlitePool) -> Result<(HashSet<String>, HashSet<String>)> {
    let brand_rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT LOWER(brand) FROM rankings WHERE brand IS NOT NULL AND brand != ''
         UNION
         SELECT DISTINCT LOWER(maker) FROM rankings WHERE maker IS NOT NULL AND maker != ''",
    )
    .fetch_all(pool)
    .await?;

    let type_rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT LOWER(category1) FROM rankings WHERE category1 IS NOT NULL AND category1 != ''
         UNION SELECT DISTINCT LOWER(category2) FROM rankings WHERE category2 IS NOT NULL AND category2 != ''
         UNION SELECT DISTINCT LOWER(category3) FROM rankings WHERE category3 IS NOT NULL AND category3 != ''
         UNION SELECT DISTINCT LOWER(category4) FROM rankings WHERE category4 IS NOT NULL AND category4 != ''",
    )
    .fetch_all(pool)
    .await?;

    let brands = brand_rows.into_iter().map(|(b,)| b.trim().to_string()).collect();
    let types = type_rows.into_iter().map(|(t,)| t.trim().to_string()).collect();
    Ok((brands, types))
}

/// Delete one batch of rankings older than the cutoff. Returns rows deleted;
/// the sweep repeats until a short batch.
pub async fn delete_rankings_before(
    pool: &SqlitePool,
    cutoff: i64,
    batch_size: i64,
) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM rankings WHERE id IN
         (SELECT id FROM rankings WHERE crawled_at < ? LIMIT ?)",
    )
    .bind(cutoff)
    .bind(batch_size)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog;
    use crate::db::test_pool;
    use crate::types::SortMode;

    async fn seed(pool: &SqlitePool) -> (i64, i64, i64) {
        let tenant = catalog::create_tenant(pool, "shop", Some("마이스토어"), 60)
            .await
            .unwrap();
        let product = catalog::create_product(
            pool, tenant.id, "상품", None, 1000, 20000, Some("OWN1"), None, None,
        )
        .await
        .unwrap();
        let kw = catalog::create_keyword(pool, product.id, "위젯", SortMode::Relevance, true, 5)
            .await
            .unwrap();
        (tenant.id, product.id, kw.id)
    }

    fn listing(rank: i64, id: &str, price: i64) -> Listing {
        Listing {
            rank,
            title: format!("상품 {rank}"),
            price,
            listing_id: id.to_string(),
            ..Default::default()
        }
    }

    fn relevant() -> Verdict {
        Verdict { relevant: true, reason: None }
    }

    #[tokio::test]
    async fn latest_rankings_picks_newest_crawl() {
        let pool = test_pool().await;
        let (_, product_id, kw_id) = seed(&pool).await;

        insert_ranking(&pool, kw_id, &listing(1, "A", 100), false, relevant(), 1000)
            .await
            .unwrap();
        insert_ranking(&pool, kw_id, &listing(1, "B", 200), false, relevant(), 2000)
            .await
            .unwrap();
        insert_ranking(&pool, kw_id, &listing(2, "C", 300), false, relevant(), 2000)
            .await
            .unwrap();

        let latest = latest_rankings_for_product(&pool, product_id).await.unwrap();
        let rows = latest.get(&kw_id).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.crawled_at == 2000));
    }

    #[tokio::test]
    async fn retention_delete_works_in_batches() {
        let pool = test_pool().await;
        let (_, _, kw_id) = seed(&pool).await;

        for i in 0..25 {
            insert_ranking(&pool, kw_id, &listing(1, &format!("L{i}"), 100), false, relevant(), 50)
                .await
                .unwrap();
        }

        let mut batches = Vec::new();
        loop {
            let deleted = delete_rankings_before(&pool, 100, 10).await.unwrap();
            batches.push(deleted);
            if deleted < 10 {
                break;
            }
        }
        assert_eq!(batches, vec![10, 10, 5]);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rankings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn sparkline_excludes_blacklisted_and_irrelevant() {
        let pool = test_pool().await;
        let (_, product_id, kw_id) = seed(&pool).await;
        let day = 86400;

        insert_ranking(&pool, kw_id, &listing(1, "OK", 5000), false, relevant(), day)
            .await
            .unwrap();
        insert_ranking(&pool, kw_id, &listing(2, "BAD", 100), false, relevant(), day)
            .await
            .unwrap();
        let irrelevant = Verdict { relevant: false, reason: None };
        insert_ranking(&pool, kw_id, &listing(3, "IRR", 50), false, irrelevant, day)
            .await
            .unwrap();
        sqlx::query("INSERT INTO blacklist (product_id, listing_id, created_at) VALUES (?, ?, 0)")
            .bind(product_id)
            .bind("BAD")
            .execute(&pool)
            .await
            .unwrap();

        let points = sparkline(&pool, product_id, 0).await.unwrap();
        assert_eq!(points, vec![5000]);
    }
}
