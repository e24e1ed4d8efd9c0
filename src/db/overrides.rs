use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::db::models::{BlacklistRow, IncludeOverrideRow, ShippingOverrideRow};
use crate::error::{AppError, Result};
use crate::types::{now_secs, RelevanceReason, ShippingFeeType};

// ---------------------------------------------------------------------------
// Blacklist
// ---------------------------------------------------------------------------

pub async fn list_blacklist(pool: &SqlitePool, product_id: i64) -> Result<Vec<BlacklistRow>> {
    let rows = sqlx::query_as::<_, BlacklistRow>(
        "SELECT * FROM blacklist WHERE product_id = ? ORDER BY created_at DESC",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Keyed by listing_id; mall is kept denormalized for display only. Extant
/// rankings for the listing flip to irrelevant immediately.
pub async fn add_blacklist(
    pool: &SqlitePool,
    product_id: i64,
    listing_id: &str,
    title: Option<&str>,
    mall: Option<&str>,
) -> Result<BlacklistRow> {
    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM blacklist WHERE product_id = ? AND listing_id = ?",
    )
    .bind(product_id)
    .bind(listing_id)
    .fetch_one(pool)
    .await?;
    if existing > 0 {
        return Err(AppError::Conflict("listing already blacklisted".to_string()));
    }

    let row = sqlx::query_as::<_, BlacklistRow>(
        "INSERT INTO blacklist (product_id, listing_id, title, mall, created_at)
         VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(product_id)
    .bind(listing_id)
    .bind(title)
    .bind(mall)
    .bind(now_secs())
    .fetch_one(pool)
    .await?;

    set_ranking_relevance(
        pool,
        product_id,
        listing_id,
        false,
        Some(RelevanceReason::ManualBlacklist),
    )
    .await?;
    Ok(row)
}

pub async fn remove_blacklist(pool: &SqlitePool, product_id: i64, listing_id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM blacklist WHERE product_id = ? AND listing_id = ?")
        .bind(product_id)
        .bind(listing_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("blacklist entry"));
    }
    set_ranking_relevance(pool, product_id, listing_id, true, None).await?;
    Ok(())
}

/// Blacklisted listing_ids per product for a whole tenant, one query.
pub async fn blacklist_by_product(
    pool: &SqlitePool,
    tenant_id: i64,
) -> Result<HashMap<i64, Vec<String>>> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT b.product_id, b.listing_id FROM blacklist b
         JOIN products p ON p.id = b.product_id
         WHERE p.tenant_id = ?",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<i64, Vec<String>> = HashMap::new();
    for (product_id, listing_id) in rows {
        grouped.entry(product_id).or_default().push(listing_id);
    }
    Ok(grouped)
}

async fn set_ranking_relevance(
    pool: &SqlitePool,
    product_id: i64,
    listing_id: &str,
    relevant: bool,
    reason: Option<RelevanceReason>,
) -> Result<()> {
    sqlx::query(
        "UPDATE rankings SET is_relevant = ?, relevance_reason = ?
         WHERE listing_id = ?
           AND keyword_id IN (SELECT id FROM keywords WHERE product_id = ?)",
    )
    .bind(relevant)
    .bind(reason.map(|r| r.to_string()))
    .bind(listing_id)
    .bind(product_id)
    .execute(pool)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Include overrides
// ---------------------------------------------------------------------------

pub async fn list_includes(pool: &SqlitePool, product_id: i64) -> Result<Vec<IncludeOverrideRow>> {
    let rows = sqlx::query_as::<_, IncludeOverrideRow>(
        "SELECT * FROM include_overrides WHERE product_id = ? ORDER BY created_at DESC",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn add_include(
    pool: &SqlitePool,
    product_id: i64,
    listing_id: &str,
) -> Result<IncludeOverrideRow> {
    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM include_overrides WHERE product_id = ? AND listing_id = ?",
    )
    .bind(product_id)
    .bind(listing_id)
    .fetch_one(pool)
    .await?;
    if existing > 0 {
        return Err(AppError::Conflict("listing already force-included".to_string()));
    }

    let row = sqlx::query_as::<_, IncludeOverrideRow>(
        "INSERT INTO include_overrides (product_id, listing_id, created_at)
         VALUES (?, ?, ?) RETURNING *",
    )
    .bind(product_id)
    .bind(listing_id)
    .bind(now_secs())
    .fetch_one(pool)
    .await?;

    set_ranking_relevance(
        pool,
        product_id,
        listing_id,
        true,
        Some(RelevanceReason::IncludedOverride),
    )
    .await?;
    Ok(row)
}

pub async fn remove_include(pool: &SqlitePool, product_id: i64, listing_id: &str) -> Result<()> {
    let result =
        sqlx::query("DELETE FROM include_overrides WHERE product_id = ? AND listing_id = ?")
            .bind(product_id)
            .bind(listing_id)
            .execute(pool)
            .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("include override"));
    }
    Ok(())
}

pub async fn includes_by_product(
    pool: &SqlitePool,
    tenant_id: i64,
) -> Result<HashMap<i64, Vec<String>>> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT o.product_id, o.listing_id FROM include_overrides o
         JOIN products p ON p.id = o.product_id
         WHERE p.tenant_id = ?",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<i64, Vec<String>> = HashMap::new();
    for (product_id, listing_id) in rows {
        grouped.entry(product_id).or_default().push(listing_id);
    }
    Ok(grouped)
}

// ---------------------------------------------------------------------------
// Shipping overrides
// ---------------------------------------------------------------------------

pub async fn list_shipping_overrides(
    pool: &SqlitePool,
    product_id: i64,
) -> Result<Vec<ShippingOverrideRow>> {
    let rows = sqlx::query_as::<_, ShippingOverrideRow>(
        "SELECT * FROM shipping_overrides WHERE product_id = ? ORDER BY created_at DESC",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Insert or update; extant rankings pick up the fee immediately. Removal is
/// not backfilled — the next crawl restores the scraped fee.
pub async fn upsert_shipping_override(
    pool: &SqlitePool,
    product_id: i64,
    listing_id: &str,
    shipping_fee: i64,
    title: Option<&str>,
    mall: Option<&str>,
) -> Result<ShippingOverrideRow> {
    let row = sqlx::query_as::<_, ShippingOverrideRow>(
        "INSERT INTO shipping_overrides (product_id, listing_id, shipping_fee, title, mall, created_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(product_id, listing_id) DO UPDATE SET shipping_fee = excluded.shipping_fee
         RETURNING *",
    )
    .bind(product_id)
    .bind(listing_id)
    .bind(shipping_fee)
    .bind(title)
    .bind(mall)
    .bind(now_secs())
    .fetch_one(pool)
    .await?;

    sqlx::query(
        "UPDATE rankings SET shipping_fee = ?, shipping_fee_type = ?
         WHERE listing_id = ?
           AND keyword_id IN (SELECT id FROM keywords WHERE product_id = ?)",
    )
    .bind(shipping_fee)
    .bind(ShippingFeeType::Paid.to_string())
    .bind(listing_id)
    .bind(product_id)
    .execute(pool)
    .await?;

    Ok(row)
}

pub async fn remove_shipping_override(
    pool: &SqlitePool,
    product_id: i64,
    listing_id: &str,
) -> Result<()> {
    let result =
        sqlx::query("DELETE FROM shipping_overrides WHERE product_id = ? AND listing_id = ?")
            .bind(product_id)
            .bind(listing_id)
            .execute(pool)
            .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("shipping override"));
    }
    Ok(())
}

/// listing_id → fee, per product, one query per tenant run.
pub async fn shipping_overrides_by_product(
    pool: &SqlitePool,
    tenant_id: i64,
) -> Result<HashMap<i64, HashMap<String, i64>>> {
    let rows: Vec<(i64, String, i64)> = sqlx::query_as(
        "SELECT s.product_id, s.listing_id, s.shipping_fee FROM shipping_overrides s
         JOIN products p ON p.id = s.product_id
         WHERE p.tenant_id = ?",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<i64, HashMap<String, i64>> = HashMap::new();
    for (product_id, listing_id, fee) in rows {
        grouped.entry(product_id).or_default().insert(listing_id, fee);
    }
    Ok(grouped)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{catalog, rankings, test_pool};
    use crate::types::{Listing, SortMode, Verdict};

    #[tokio::test]
    async fn blacklist_add_flips_existing_rankings() {
        let pool = test_pool().await;
        let tenant = catalog::create_tenant(&pool, "shop", None, 60).await.unwrap();
        let product = catalog::create_product(
            &pool, tenant.id, "상품", None, 1000, 2000, None, None, None,
        )
        .await
        .unwrap();
        let kw = catalog::create_keyword(&pool, product.id, "kw", SortMode::Relevance, true, 5)
            .await
            .unwrap();

        let listing = Listing {
            rank: 1,
            listing_id: "B1".to_string(),
            ..Default::default()
        };
        rankings::insert_ranking(
            &pool,
            kw.id,
            &listing,
            false,
            Verdict { relevant: true, reason: None },
            100,
        )
        .await
        .unwrap();

        add_blacklist(&pool, product.id, "B1", None, None).await.unwrap();

        let (relevant, reason): (bool, Option<String>) = sqlx::query_as(
            "SELECT is_relevant, relevance_reason FROM rankings WHERE listing_id = 'B1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(!relevant);
        assert_eq!(reason.as_deref(), Some("manual_blacklist"));

        // Removal restores relevance.
        remove_blacklist(&pool, product.id, "B1").await.unwrap();
        let relevant: bool =
            sqlx::query_scalar("SELECT is_relevant FROM rankings WHERE listing_id = 'B1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(relevant);
    }

    #[tokio::test]
    async fn shipping_override_backfills_fee() {
        let pool = test_pool().await;
        let tenant = catalog::create_tenant(&pool, "shop", None, 60).await.unwrap();
        let product = catalog::create_product(
            &pool, tenant.id, "상품", None, 1000, 2000, None, None, None,
        )
        .await
        .unwrap();
        let kw = catalog::create_keyword(&pool, product.id, "kw", SortMode::Relevance, true, 5)
            .await
            .unwrap();

        let listing = Listing {
            rank: 1,
            listing_id: "S1".to_string(),
            ..Default::default()
        };
        rankings::insert_ranking(
            &pool,
            kw.id,
            &listing,
            false,
            Verdict { relevant: true, reason: None },
            100,
        )
        .await
        .unwrap();

        upsert_shipping_override(&pool, product.id, "S1", 2500, None, None)
            .await
            .unwrap();

        let (fee, fee_type): (i64, String) = sqlx::query_as(
            "SELECT shipping_fee, shipping_fee_type FROM rankings WHERE listing_id = 'S1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(fee, 2500);
        assert_eq!(fee_type, "paid");
    }
}
