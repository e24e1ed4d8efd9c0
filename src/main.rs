mod alerts;
mod api;
mod config;
mod coordinator;
mod db;
mod enricher;
mod error;
mod fetcher;
mod keywords;
mod push;
mod relevance;
mod scheduler;
mod types;

use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::alerts::AlertEngine;
use crate::api::health::HealthState;
use crate::api::metrics::CrawlDurations;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::coordinator::CrawlCoordinator;
use crate::error::Result;
use crate::fetcher::ShopClient;
use crate::keywords::DictCache;
use crate::push::PushClient;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let options = SqliteConnectOptions::new()
        .filename(&cfg.db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Process-wide resources ---
    let client = Arc::new(ShopClient::new(&cfg)?);
    let push = PushClient::new(&cfg)?;
    if !cfg.push_enabled() {
        info!("Push fanout disabled (VAPID keys not configured)");
    }
    let durations = Arc::new(CrawlDurations::new());
    let health = Arc::new(HealthState::new());
    let alert_engine = AlertEngine::new(pool.clone(), push, cfg.alert_dedup_hours);
    let coordinator = Arc::new(CrawlCoordinator::new(
        pool.clone(),
        client,
        cfg.clone(),
        alert_engine,
        Arc::clone(&durations),
    ));

    // --- Shutdown signal ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    // --- Scheduler: crawl ticks + retention sweep ---
    let scheduler = Arc::new(Scheduler::new(
        pool.clone(),
        cfg.clone(),
        Arc::clone(&coordinator),
        Arc::clone(&health),
    ));
    tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx.clone()));
    tokio::spawn(Arc::clone(&scheduler).run_cleanup(shutdown_rx.clone()));

    // --- HTTP API ---
    let api_state = ApiState {
        pool: pool.clone(),
        cfg: cfg.clone(),
        coordinator,
        health,
        durations,
        dict: DictCache::new(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    let mut shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    info!("Shutdown complete");
    Ok(())
}
