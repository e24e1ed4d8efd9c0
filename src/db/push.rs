use sqlx::SqlitePool;

use crate::db::models::PushSubscriptionRow;
use crate::error::Result;
use crate::types::now_secs;

pub async fn subscriptions_for_tenant(
    pool: &SqlitePool,
    tenant_id: i64,
) -> Result<Vec<PushSubscriptionRow>> {
    let rows = sqlx::query_as::<_, PushSubscriptionRow>(
        "SELECT * FROM push_subscriptions WHERE tenant_id = ?",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Re-subscribing an existing endpoint refreshes its keys.
pub async fn upsert_subscription(
    pool: &SqlitePool,
    tenant_id: i64,
    endpoint: &str,
    p256dh: &str,
    auth: &str,
) -> Result<PushSubscriptionRow> {
    let row = sqlx::query_as::<_, PushSubscriptionRow>(
        "INSERT INTO push_subscriptions (tenant_id, endpoint, p256dh, auth, created_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(endpoint) DO UPDATE SET
             tenant_id = excluded.tenant_id,
             p256dh = excluded.p256dh,
             auth = excluded.auth
         RETURNING *",
    )
    .bind(tenant_id)
    .bind(endpoint)
    .bind(p256dh)
    .bind(auth)
    .bind(now_secs())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Gone endpoints (push gateway 404/410) are dropped here.
pub async fn delete_subscription(pool: &SqlitePool, endpoint: &str) -> Result<()> {
    sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = ?")
        .bind(endpoint)
        .execute(pool)
        .await?;
    Ok(())
}
