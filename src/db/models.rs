//! Row types for sqlx `query_as`. Timestamps are Unix epoch seconds;
//! monetary values are integer KRW.

use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TenantRow {
    pub id: i64,
    pub name: String,
    pub own_store_label: Option<String>,
    pub crawl_interval_min: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ProductRow {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub category: Option<String>,
    pub cost_price: i64,
    pub selling_price: i64,
    pub own_listing_id: Option<String>,
    pub model_code: Option<String>,
    /// JSON array of required title substrings.
    pub spec_keywords: Option<String>,
    pub price_filter_min_pct: Option<i64>,
    pub price_filter_max_pct: Option<i64>,
    pub price_locked: bool,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProductRow {
    pub fn spec_keyword_list(&self) -> Vec<String> {
        let Some(raw) = self.spec_keywords.as_deref() else {
            return Vec::new();
        };
        if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
            return list.into_iter().filter(|s| !s.is_empty()).collect();
        }
        // Older rows stored a comma-separated list.
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct KeywordRow {
    pub id: i64,
    pub product_id: i64,
    pub text: String,
    pub sort_mode: String,
    pub is_primary: bool,
    pub active: bool,
    pub last_crawled_at: Option<i64>,
    pub last_status: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct RankingRow {
    pub id: i64,
    pub keyword_id: i64,
    pub rank: i64,
    pub title: String,
    pub price: i64,
    pub mall: String,
    pub listing_id: Option<String>,
    pub link: Option<String>,
    pub image: Option<String>,
    pub hprice: i64,
    pub brand: Option<String>,
    pub maker: Option<String>,
    pub product_type: Option<String>,
    pub category1: Option<String>,
    pub category2: Option<String>,
    pub category3: Option<String>,
    pub category4: Option<String>,
    pub shipping_fee: i64,
    pub shipping_fee_type: String,
    pub is_own_store: bool,
    pub is_relevant: bool,
    pub relevance_reason: Option<String>,
    pub crawled_at: i64,
}

impl RankingRow {
    pub fn total_price(&self) -> i64 {
        self.price + self.shipping_fee
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BlacklistRow {
    pub id: i64,
    pub product_id: i64,
    pub listing_id: String,
    pub title: Option<String>,
    pub mall: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct IncludeOverrideRow {
    pub id: i64,
    pub product_id: i64,
    pub listing_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ShippingOverrideRow {
    pub id: i64,
    pub product_id: i64,
    pub listing_id: String,
    pub shipping_fee: i64,
    pub title: Option<String>,
    pub mall: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CrawlLogRow {
    pub id: i64,
    pub keyword_id: Option<i64>,
    pub status: String,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AlertRow {
    pub id: i64,
    pub tenant_id: i64,
    pub product_id: Option<i64>,
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
    /// JSON payload, shape depends on kind.
    pub payload: Option<String>,
    pub is_read: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AlertSettingRow {
    pub id: i64,
    pub tenant_id: i64,
    pub kind: String,
    pub enabled: bool,
    pub threshold: Option<f64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PushSubscriptionRow {
    pub id: i64,
    pub tenant_id: i64,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CostItemRow {
    pub id: i64,
    pub product_id: i64,
    pub name: String,
    /// "percent" of selling price or "fixed" amount.
    pub kind: String,
    pub value: f64,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CostPresetRow {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub kind: String,
    pub value: f64,
    pub created_at: i64,
}
