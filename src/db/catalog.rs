use std::collections::HashSet;

use sqlx::SqlitePool;

use crate::db::models::{CostItemRow, CostPresetRow, KeywordRow, ProductRow, TenantRow};
use crate::error::{AppError, Result};
use crate::types::{now_secs, CrawlStatus, SortMode};

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

pub async fn list_tenants(pool: &SqlitePool) -> Result<Vec<TenantRow>> {
    let rows = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn get_tenant(pool: &SqlitePool, tenant_id: i64) -> Result<Option<TenantRow>> {
    let row = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = ?")
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn create_tenant(
    pool: &SqlitePool,
    name: &str,
    own_store_label: Option<&str>,
    crawl_interval_min: i64,
) -> Result<TenantRow> {
    let row = sqlx::query_as::<_, TenantRow>(
        "INSERT INTO tenants (name, own_store_label, crawl_interval_min, created_at)
         VALUES (?, ?, ?, ?) RETURNING *",
    )
    .bind(name)
    .bind(own_store_label)
    .bind(crawl_interval_min)
    .bind(now_secs())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn update_tenant(
    pool: &SqlitePool,
    tenant_id: i64,
    own_store_label: Option<&str>,
    crawl_interval_min: i64,
) -> Result<Option<TenantRow>> {
    let row = sqlx::query_as::<_, TenantRow>(
        "UPDATE tenants SET own_store_label = ?, crawl_interval_min = ? WHERE id = ? RETURNING *",
    )
    .bind(own_store_label)
    .bind(crawl_interval_min)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Cascades to every owned row via foreign keys.
pub async fn delete_tenant(pool: &SqlitePool, tenant_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
        .bind(tenant_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

pub async fn get_product(pool: &SqlitePool, product_id: i64) -> Result<Option<ProductRow>> {
    let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ?")
        .bind(product_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn active_products_for_tenant(
    pool: &SqlitePool,
    tenant_id: i64,
) -> Result<Vec<ProductRow>> {
    let rows = sqlx::query_as::<_, ProductRow>(
        "SELECT * FROM products WHERE tenant_id = ? AND is_active = 1 ORDER BY id",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[allow(clippy::too_many_arguments)]
pub async fn create_product(
    pool: &SqlitePool,
    tenant_id: i64,
    name: &str,
    category: Option<&str>,
    cost_price: i64,
    selling_price: i64,
    own_listing_id: Option<&str>,
    model_code: Option<&str>,
    spec_keywords: Option<&str>,
) -> Result<ProductRow> {
    if cost_price < 0 || selling_price < 0 {
        return Err(AppError::Conflict("prices must be non-negative".to_string()));
    }
    let now = now_secs();
    let row = sqlx::query_as::<_, ProductRow>(
        "INSERT INTO products (tenant_id, name, category, cost_price, selling_price,
                               own_listing_id, model_code, spec_keywords, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(tenant_id)
    .bind(name)
    .bind(category)
    .bind(cost_price)
    .bind(selling_price)
    .bind(own_listing_id)
    .bind(model_code)
    .bind(spec_keywords)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Crawl-pipeline side effect: the tenant's own listing reported a different
/// price, adopt it as the selling price.
pub async fn update_selling_price(
    pool: &SqlitePool,
    product_id: i64,
    selling_price: i64,
) -> Result<()> {
    sqlx::query("UPDATE products SET selling_price = ?, updated_at = ? WHERE id = ?")
        .bind(selling_price)
        .bind(now_secs())
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_product(pool: &SqlitePool, product_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Every own_listing_id registered under a tenant. Used by the relevance
/// classifier to rule out the tenant's other SKUs.
pub async fn own_listing_ids(pool: &SqlitePool, tenant_id: i64) -> Result<HashSet<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT own_listing_id FROM products
         WHERE tenant_id = ? AND own_listing_id IS NOT NULL AND own_listing_id != ''",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

pub async fn active_keywords_for_product(
    pool: &SqlitePool,
    product_id: i64,
) -> Result<Vec<KeywordRow>> {
    let rows = sqlx::query_as::<_, KeywordRow>(
        "SELECT * FROM keywords WHERE product_id = ? AND active = 1 ORDER BY id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn active_keywords_for_tenant(
    pool: &SqlitePool,
    tenant_id: i64,
) -> Result<Vec<KeywordRow>> {
    let rows = sqlx::query_as::<_, KeywordRow>(
        "SELECT k.* FROM keywords k
         JOIN products p ON p.id = k.product_id
         WHERE p.tenant_id = ? AND p.is_active = 1 AND k.active = 1
         ORDER BY k.id",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Enforces the active-keyword cap and `(product, text)` uniqueness.
pub async fn create_keyword(
    pool: &SqlitePool,
    product_id: i64,
    text: &str,
    sort_mode: SortMode,
    is_primary: bool,
    max_active: i64,
) -> Result<KeywordRow> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Conflict("keyword text must not be empty".to_string()));
    }

    let active_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM keywords WHERE product_id = ? AND active = 1")
            .bind(product_id)
            .fetch_one(pool)
            .await?;
    if active_count >= max_active {
        return Err(AppError::Conflict(format!(
            "product already has {max_active} active keywords"
        )));
    }

    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM keywords WHERE product_id = ? AND text = ?")
            .bind(product_id)
            .bind(text)
            .fetch_one(pool)
            .await?;
    if existing > 0 {
        return Err(AppError::Conflict("keyword already registered".to_string()));
    }

    if is_primary {
        let primaries: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM keywords WHERE product_id = ? AND is_primary = 1",
        )
        .bind(product_id)
        .fetch_one(pool)
        .await?;
        if primaries > 0 {
            return Err(AppError::Conflict(
                "product already has a primary keyword".to_string(),
            ));
        }
    }

    let row = sqlx::query_as::<_, KeywordRow>(
        "INSERT INTO keywords (product_id, text, sort_mode, is_primary, created_at)
         VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(product_id)
    .bind(text)
    .bind(sort_mode.to_string())
    .bind(is_primary)
    .bind(now_secs())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Primary keywords are undeletable.
pub async fn delete_keyword(pool: &SqlitePool, keyword_id: i64) -> Result<bool> {
    let is_primary: Option<bool> =
        sqlx::query_scalar("SELECT is_primary FROM keywords WHERE id = ?")
            .bind(keyword_id)
            .fetch_optional(pool)
            .await?;
    match is_primary {
        None => Ok(false),
        Some(true) => Err(AppError::Conflict(
            "the primary keyword cannot be deleted".to_string(),
        )),
        Some(false) => {
            sqlx::query("DELETE FROM keywords WHERE id = ?")
                .bind(keyword_id)
                .execute(pool)
                .await?;
            Ok(true)
        }
    }
}

pub async fn mark_keyword_crawled(
    pool: &SqlitePool,
    keyword_id: i64,
    status: CrawlStatus,
    crawled_at: i64,
) -> Result<()> {
    sqlx::query("UPDATE keywords SET last_crawled_at = ?, last_status = ? WHERE id = ?")
        .bind(crawled_at)
        .bind(status.to_string())
        .bind(keyword_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Most recent crawl instant across a tenant's active keywords — the
/// scheduler's due-time input.
pub async fn tenant_last_crawled_at(pool: &SqlitePool, tenant_id: i64) -> Result<Option<i64>> {
    let at: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(k.last_crawled_at) FROM keywords k
         JOIN products p ON p.id = k.product_id
         WHERE p.tenant_id = ? AND p.is_active = 1",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;
    Ok(at)
}

pub async fn total_active_keywords(pool: &SqlitePool, tenant_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM keywords k
         JOIN products p ON p.id = k.product_id
         WHERE p.tenant_id = ? AND p.is_active = 1 AND k.active = 1",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Cost items and presets (margin read-side)
// ---------------------------------------------------------------------------

pub async fn cost_items_for_product(
    pool: &SqlitePool,
    product_id: i64,
) -> Result<Vec<CostItemRow>> {
    let rows = sqlx::query_as::<_, CostItemRow>(
        "SELECT * FROM cost_items WHERE product_id = ? ORDER BY id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn create_cost_item(
    pool: &SqlitePool,
    product_id: i64,
    name: &str,
    kind: &str,
    value: f64,
) -> Result<CostItemRow> {
    let row = sqlx::query_as::<_, CostItemRow>(
        "INSERT INTO cost_items (product_id, name, kind, value, created_at)
         VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(product_id)
    .bind(name)
    .bind(kind)
    .bind(value)
    .bind(now_secs())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn delete_cost_item(pool: &SqlitePool, cost_item_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM cost_items WHERE id = ?")
        .bind(cost_item_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn cost_presets_for_tenant(
    pool: &SqlitePool,
    tenant_id: i64,
) -> Result<Vec<CostPresetRow>> {
    let rows = sqlx::query_as::<_, CostPresetRow>(
        "SELECT * FROM cost_presets WHERE tenant_id = ? ORDER BY id",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn create_cost_preset(
    pool: &SqlitePool,
    tenant_id: i64,
    name: &str,
    kind: &str,
    value: f64,
) -> Result<CostPresetRow> {
    let row = sqlx::query_as::<_, CostPresetRow>(
        "INSERT INTO cost_presets (tenant_id, name, kind, value, created_at)
         VALUES (?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(tenant_id)
    .bind(name)
    .bind(kind)
    .bind(value)
    .bind(now_secs())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn keyword_cap_enforced() {
        let pool = test_pool().await;
        let tenant = create_tenant(&pool, "shop", None, 60).await.unwrap();
        let product =
            create_product(&pool, tenant.id, "상품", None, 1000, 2000, None, None, None)
                .await
                .unwrap();

        for i in 0..5 {
            create_keyword(&pool, product.id, &format!("kw{i}"), SortMode::Relevance, i == 0, 5)
                .await
                .unwrap();
        }
        let err = create_keyword(&pool, product.id, "kw5", SortMode::Relevance, false, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_keyword_text_rejected() {
        let pool = test_pool().await;
        let tenant = create_tenant(&pool, "shop", None, 60).await.unwrap();
        let product =
            create_product(&pool, tenant.id, "상품", None, 1000, 2000, None, None, None)
                .await
                .unwrap();

        create_keyword(&pool, product.id, "무선 청소기", SortMode::Relevance, true, 5)
            .await
            .unwrap();
        let err = create_keyword(&pool, product.id, "무선 청소기", SortMode::PriceAsc, false, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn second_primary_keyword_rejected() {
        let pool = test_pool().await;
        let tenant = create_tenant(&pool, "shop", None, 60).await.unwrap();
        let product =
            create_product(&pool, tenant.id, "상품", None, 1000, 2000, None, None, None)
                .await
                .unwrap();

        create_keyword(&pool, product.id, "kw1", SortMode::Relevance, true, 5)
            .await
            .unwrap();
        let err = create_keyword(&pool, product.id, "kw2", SortMode::Relevance, true, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn primary_keyword_undeletable() {
        let pool = test_pool().await;
        let tenant = create_tenant(&pool, "shop", None, 60).await.unwrap();
        let product =
            create_product(&pool, tenant.id, "상품", None, 1000, 2000, None, None, None)
                .await
                .unwrap();
        let kw = create_keyword(&pool, product.id, "상품", SortMode::Relevance, true, 5)
            .await
            .unwrap();

        let err = delete_keyword(&pool, kw.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn tenant_cascade_removes_keywords() {
        let pool = test_pool().await;
        let tenant = create_tenant(&pool, "shop", None, 60).await.unwrap();
        let product =
            create_product(&pool, tenant.id, "상품", None, 1000, 2000, None, None, None)
                .await
                .unwrap();
        create_keyword(&pool, product.id, "kw", SortMode::Relevance, true, 5)
            .await
            .unwrap();

        assert!(delete_tenant(&pool, tenant.id).await.unwrap());
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM keywords")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
