use sqlx::SqlitePool;

use crate::db::models::{AlertRow, AlertSettingRow};
use crate::error::{AppError, Result};
use crate::types::{now_secs, AlertKind};

pub async fn insert_alert(
    pool: &SqlitePool,
    tenant_id: i64,
    product_id: Option<i64>,
    kind: AlertKind,
    title: &str,
    body: &str,
    payload: &serde_json::Value,
) -> Result<AlertRow> {
    let row = sqlx::query_as::<_, AlertRow>(
        "INSERT INTO alerts (tenant_id, product_id, kind, title, body, payload, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(tenant_id)
    .bind(product_id)
    .bind(kind.to_string())
    .bind(title)
    .bind(body)
    .bind(payload.to_string())
    .bind(now_secs())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Dedup probe: an unread alert of the same kind for the same product inside
/// the window suppresses new ones.
pub async fn has_recent_unread(
    pool: &SqlitePool,
    tenant_id: i64,
    product_id: i64,
    kind: AlertKind,
    since: i64,
) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM alerts
         WHERE tenant_id = ? AND product_id = ? AND kind = ?
           AND is_read = 0 AND created_at > ?
         LIMIT 1",
    )
    .bind(tenant_id)
    .bind(product_id)
    .bind(kind.to_string())
    .bind(since)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

/// Absent row means the alert kind is enabled with no threshold.
pub async fn setting(
    pool: &SqlitePool,
    tenant_id: i64,
    kind: AlertKind,
) -> Result<(bool, Option<f64>)> {
    let row = sqlx::query_as::<_, AlertSettingRow>(
        "SELECT * FROM alert_settings WHERE tenant_id = ? AND kind = ?",
    )
    .bind(tenant_id)
    .bind(kind.to_string())
    .fetch_optional(pool)
    .await?;
    Ok(match row {
        Some(s) => (s.enabled, s.threshold),
        None => (true, None),
    })
}

pub async fn upsert_setting(
    pool: &SqlitePool,
    tenant_id: i64,
    kind: AlertKind,
    enabled: bool,
    threshold: Option<f64>,
) -> Result<AlertSettingRow> {
    let row = sqlx::query_as::<_, AlertSettingRow>(
        "INSERT INTO alert_settings (tenant_id, kind, enabled, threshold, created_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(tenant_id, kind) DO UPDATE SET
             enabled = excluded.enabled, threshold = excluded.threshold
         RETURNING *",
    )
    .bind(tenant_id)
    .bind(kind.to_string())
    .bind(enabled)
    .bind(threshold)
    .bind(now_secs())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn list_alerts(
    pool: &SqlitePool,
    tenant_id: i64,
    unread_only: bool,
    limit: i64,
) -> Result<Vec<AlertRow>> {
    let rows = if unread_only {
        sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM alerts WHERE tenant_id = ? AND is_read = 0
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM alerts WHERE tenant_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(pool)
        .await?
    };
    Ok(rows)
}

pub async fn mark_read(pool: &SqlitePool, alert_id: i64) -> Result<()> {
    let result = sqlx::query("UPDATE alerts SET is_read = 1 WHERE id = ?")
        .bind(alert_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("alert"));
    }
    Ok(())
}
