use crate::error::{AppError, Result};

pub const SEARCH_API_URL: &str = "https://openapi.naver.com/v1/search/shop.json";

/// Hosts whose product pages we are willing to scrape for shipping fees.
pub const ALLOWED_STORE_HOSTS: &[&str] = &[
    "smartstore.naver.com",
    "m.smartstore.naver.com",
    "brand.naver.com",
];

/// Mobile user agent for shipping-page fetches — the desktop page does not
/// embed the preloaded state blob we parse.
pub const SHIPPING_USER_AGENT: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";

/// Search results are capped by the marketplace at page granularity; we only
/// ever look at the first page.
pub const MAX_RESULTS: usize = 10;

/// Keepalive connections held by the shared search client.
pub const MAX_IDLE_CONNS: usize = 10;

/// Jitter bounds for the single shipping-fetch retry (seconds).
pub const SHIPPING_RETRY_JITTER: (f64, f64) = (0.2, 0.4);

/// Retention sweep cadence (hours).
pub const CLEANUP_INTERVAL_HOURS: u64 = 24;

/// Push payload caps applied before fanout.
pub const PUSH_TITLE_MAX: usize = 100;
pub const PUSH_BODY_MAX: usize = 200;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Marketplace API credentials — required, startup fails without them.
    pub client_id: String,
    pub client_secret: String,
    /// Default tenant crawl interval when unset (CRAWL_DEFAULT_INTERVAL_MIN).
    pub default_interval_min: i64,
    /// Per-keyword fetch attempts (CRAWL_MAX_RETRIES).
    pub max_retries: u32,
    /// Jitter bounds between fetches, seconds (CRAWL_REQUEST_DELAY_MIN/MAX).
    pub request_delay_min: f64,
    pub request_delay_max: f64,
    /// Fetch-phase semaphore size (CRAWL_CONCURRENCY).
    pub crawl_concurrency: usize,
    /// Shipping-enricher semaphore size (CRAWL_SHIPPING_CONCURRENCY).
    pub shipping_concurrency: usize,
    /// Per-call timeouts, seconds (CRAWL_SHIPPING_TIMEOUT / CRAWL_API_TIMEOUT).
    pub shipping_timeout_secs: u64,
    pub api_timeout_secs: u64,
    /// Scheduler tick period, minutes (SCHEDULER_CHECK_INTERVAL_MIN).
    pub scheduler_check_interval_min: u64,
    /// Retention sweep (DATA_RETENTION_DAYS / CLEANUP_BATCH_SIZE).
    pub retention_days: i64,
    pub cleanup_batch_size: i64,
    /// Alert suppression window, hours (ALERT_DEDUP_HOURS).
    pub alert_dedup_hours: i64,
    /// Active-keyword cap enforced at creation (MAX_KEYWORDS_PER_PRODUCT).
    pub max_keywords_per_product: i64,
    /// Per-day-minimum sparkline window, days (SPARKLINE_DAYS).
    pub sparkline_days: i64,
    /// Web push credentials; both keys required or push is disabled.
    pub vapid_public_key: String,
    pub vapid_private_key: String,
    pub vapid_claim_email: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let client_id = env_or("SHOP_CLIENT_ID", "");
        let client_secret = env_or("SHOP_CLIENT_SECRET", "");
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(AppError::Config(
                "SHOP_CLIENT_ID and SHOP_CLIENT_SECRET must be set".to_string(),
            ));
        }

        let cfg = Self {
            log_level: env_or("LOG_LEVEL", "info"),
            db_path: env_or("DB_PATH", "rankwatch.db"),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| {
                    AppError::Config("API_PORT must be a valid port number".to_string())
                })?,
            client_id,
            client_secret,
            default_interval_min: parse_or("CRAWL_DEFAULT_INTERVAL_MIN", 60),
            max_retries: parse_or("CRAWL_MAX_RETRIES", 3),
            request_delay_min: parse_or("CRAWL_REQUEST_DELAY_MIN", 2.0),
            request_delay_max: parse_or("CRAWL_REQUEST_DELAY_MAX", 5.0),
            crawl_concurrency: parse_or("CRAWL_CONCURRENCY", 5),
            shipping_concurrency: parse_or("CRAWL_SHIPPING_CONCURRENCY", 3),
            shipping_timeout_secs: parse_or("CRAWL_SHIPPING_TIMEOUT", 8),
            api_timeout_secs: parse_or("CRAWL_API_TIMEOUT", 10),
            scheduler_check_interval_min: parse_or("SCHEDULER_CHECK_INTERVAL_MIN", 10),
            retention_days: parse_or("DATA_RETENTION_DAYS", 30),
            cleanup_batch_size: parse_or("CLEANUP_BATCH_SIZE", 10_000),
            alert_dedup_hours: parse_or("ALERT_DEDUP_HOURS", 24),
            max_keywords_per_product: parse_or("MAX_KEYWORDS_PER_PRODUCT", 5),
            sparkline_days: parse_or("SPARKLINE_DAYS", 7),
            vapid_public_key: env_or("VAPID_PUBLIC_KEY", ""),
            vapid_private_key: env_or("VAPID_PRIVATE_KEY", ""),
            vapid_claim_email: env_or("VAPID_CLAIM_EMAIL", "admin@rankwatch.local"),
        };

        if cfg.request_delay_min > cfg.request_delay_max {
            return Err(AppError::Config(
                "CRAWL_REQUEST_DELAY_MIN must not exceed CRAWL_REQUEST_DELAY_MAX".to_string(),
            ));
        }

        Ok(cfg)
    }

    pub fn push_enabled(&self) -> bool {
        !self.vapid_public_key.is_empty() && !self.vapid_private_key.is_empty()
    }
}
