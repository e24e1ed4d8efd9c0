use sqlx::SqlitePool;

use crate::db::models::CrawlLogRow;
use crate::error::Result;
use crate::types::{now_secs, CrawlStatus};

pub async fn insert_crawl_log(
    pool: &SqlitePool,
    keyword_id: i64,
    status: CrawlStatus,
    error: Option<&str>,
    duration_ms: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO crawl_logs (keyword_id, status, error, duration_ms, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(keyword_id)
    .bind(status.to_string())
    .bind(error)
    .bind(duration_ms)
    .bind(now_secs())
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlStats24h {
    pub success: i64,
    pub failed: i64,
    pub avg_duration_ms: Option<f64>,
}

/// Last-24h success/failure counts and mean duration for a tenant's keywords.
pub async fn stats_24h(pool: &SqlitePool, tenant_id: i64) -> Result<CrawlStats24h> {
    let since = now_secs() - 24 * 3600;
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT l.status, COUNT(*) FROM crawl_logs l
         JOIN keywords k ON k.id = l.keyword_id
         JOIN products p ON p.id = k.product_id
         WHERE p.tenant_id = ? AND l.created_at >= ?
         GROUP BY l.status",
    )
    .bind(tenant_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut stats = CrawlStats24h::default();
    for (status, count) in rows {
        match status.as_str() {
            "success" => stats.success = count,
            "failed" => stats.failed = count,
            _ => {}
        }
    }

    stats.avg_duration_ms = sqlx::query_scalar(
        "SELECT AVG(l.duration_ms) FROM crawl_logs l
         JOIN keywords k ON k.id = l.keyword_id
         JOIN products p ON p.id = k.product_id
         WHERE p.tenant_id = ? AND l.created_at >= ? AND l.duration_ms IS NOT NULL",
    )
    .bind(tenant_id)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(stats)
}

/// Success/failure counts across all tenants, for the health check.
pub async fn global_stats_24h(pool: &SqlitePool) -> Result<(i64, i64)> {
    let since = now_secs() - 24 * 3600;
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM crawl_logs WHERE created_at >= ? GROUP BY status",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut success = 0;
    let mut failed = 0;
    for (status, count) in rows {
        match status.as_str() {
            "success" => success = count,
            "failed" => failed = count,
            _ => {}
        }
    }
    Ok((success, failed))
}

pub async fn list_logs(
    pool: &SqlitePool,
    tenant_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<CrawlLogRow>> {
    let rows = sqlx::query_as::<_, CrawlLogRow>(
        "SELECT l.* FROM crawl_logs l
         JOIN keywords k ON k.id = l.keyword_id
         JOIN products p ON p.id = k.product_id
         WHERE p.tenant_id = ?
         ORDER BY l.created_at DESC
         LIMIT ? OFFSET ?",
    )
    .bind(tenant_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn delete_logs_before(pool: &SqlitePool, cutoff: i64, batch_size: i64) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM crawl_logs WHERE id IN
         (SELECT id FROM crawl_logs WHERE created_at < ? LIMIT ?)",
    )
    .bind(cutoff)
    .bind(batch_size)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Most recent crawl-log instant across the whole store — health input.
pub async fn last_crawl_at(pool: &SqlitePool) -> Result<Option<i64>> {
    let at: Option<i64> = sqlx::query_scalar("SELECT MAX(created_at) FROM crawl_logs")
        .fetch_one(pool)
        .await?;
    Ok(at)
}
