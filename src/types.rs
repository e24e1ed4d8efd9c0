use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix epoch seconds — all persisted timestamps use this.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ---------------------------------------------------------------------------
// Sort mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Marketplace relevance order.
    Relevance,
    /// Lowest price first.
    PriceAsc,
}

impl SortMode {
    /// Query parameter value understood by the search API.
    pub fn api_param(self) -> &'static str {
        match self {
            SortMode::Relevance => "sim",
            SortMode::PriceAsc => "asc",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "price_asc" => SortMode::PriceAsc,
            _ => SortMode::Relevance,
        }
    }
}

impl std::fmt::Display for SortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortMode::Relevance => write!(f, "relevance"),
            SortMode::PriceAsc => write!(f, "price_asc"),
        }
    }
}

// ---------------------------------------------------------------------------
// Crawl status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Pending,
    Success,
    Failed,
}

impl std::fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CrawlStatus::Pending => "pending",
            CrawlStatus::Success => "success",
            CrawlStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Shipping fee classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingFeeType {
    /// A concrete fee was read off the product page.
    Paid,
    Free,
    /// Host not scrapeable, or no fetch attempted.
    Unknown,
    /// Page fetched but the fee could not be parsed.
    Error,
}

impl std::fmt::Display for ShippingFeeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShippingFeeType::Paid => "paid",
            ShippingFeeType::Free => "free",
            ShippingFeeType::Unknown => "unknown",
            ShippingFeeType::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl Default for ShippingFeeType {
    fn default() -> Self {
        ShippingFeeType::Unknown
    }
}

// ---------------------------------------------------------------------------
// Relevance
// ---------------------------------------------------------------------------

/// Why a listing was ruled in or out as a competitor. Persisted verbatim on
/// the ranking row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceReason {
    ManualBlacklist,
    MyProduct,
    IncludedOverride,
    PriceFilterMin,
    PriceFilterMax,
    ModelCode,
    SpecKeywords,
}

impl std::fmt::Display for RelevanceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RelevanceReason::ManualBlacklist => "manual_blacklist",
            RelevanceReason::MyProduct => "my_product",
            RelevanceReason::IncludedOverride => "included_override",
            RelevanceReason::PriceFilterMin => "price_filter_min",
            RelevanceReason::PriceFilterMax => "price_filter_max",
            RelevanceReason::ModelCode => "model_code",
            RelevanceReason::SpecKeywords => "spec_keywords",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub relevant: bool,
    pub reason: Option<RelevanceReason>,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PriceUndercut,
    RankDrop,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::PriceUndercut => write!(f, "price_undercut"),
            AlertKind::RankDrop => write!(f, "rank_drop"),
        }
    }
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// One search hit, in marketplace order. Title is HTML-stripped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Listing {
    pub rank: i64,
    pub title: String,
    pub price: i64,
    pub mall: String,
    pub link: String,
    pub image: String,
    pub listing_id: String,
    pub hprice: i64,
    pub brand: String,
    pub maker: String,
    pub product_type: String,
    pub category1: String,
    pub category2: String,
    pub category3: String,
    pub category4: String,
    pub shipping_fee: i64,
    pub shipping_fee_type: ShippingFeeType,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub listings: Vec<Listing>,
    pub ok: bool,
    pub error: Option<String>,
}

impl SearchOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            listings: Vec::new(),
            ok: false,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Run summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct KeywordCrawlSummary {
    pub keyword_id: i64,
    pub text: String,
    pub sort_mode: SortMode,
    pub status: CrawlStatus,
    pub listing_count: usize,
    pub duration_ms: i64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunStats {
    pub total: u32,
    pub success: u32,
    pub failed: u32,
}
