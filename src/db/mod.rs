//! Typed access to the relational store. Each module owns the queries for one
//! slice of the schema; mutations run on the caller's pool connection and the
//! batched read shapes here are the only ones the core uses (no N+1 walks).

pub mod alerts;
pub mod catalog;
pub mod logs;
pub mod models;
pub mod overrides;
pub mod push;
pub mod rankings;

/// In-memory database for tests. A single connection keeps every query on the
/// same memory database.
#[cfg(test)]
pub async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations apply");
    pool
}
