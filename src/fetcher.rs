use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{
    Config, ALLOWED_STORE_HOSTS, MAX_IDLE_CONNS, MAX_RESULTS, SEARCH_API_URL, SHIPPING_USER_AGENT,
};
use crate::error::Result;
use crate::types::{Listing, SearchOutcome, ShippingFeeType, SortMode};

/// What the crawl pipeline needs from the marketplace. `ShopClient` is the
/// real implementation; tests substitute fakes.
pub trait MarketClient: Send + Sync + 'static {
    fn search(
        &self,
        keyword: &str,
        sort_mode: SortMode,
    ) -> impl std::future::Future<Output = SearchOutcome> + Send;

    fn fetch_shipping(
        &self,
        listing_url: &str,
    ) -> impl std::future::Future<Output = (i64, ShippingFeeType)> + Send;
}

impl MarketClient for ShopClient {
    fn search(
        &self,
        keyword: &str,
        sort_mode: SortMode,
    ) -> impl std::future::Future<Output = SearchOutcome> + Send {
        ShopClient::search(self, keyword, sort_mode)
    }

    fn fetch_shipping(
        &self,
        listing_url: &str,
    ) -> impl std::future::Future<Output = (i64, ShippingFeeType)> + Send {
        ShopClient::fetch_shipping(self, listing_url)
    }
}

/// Shared marketplace client: one-shot keyword search plus shipping-page
/// scrape. Safe for concurrent use; both inner clients hold keepalive pools.
pub struct ShopClient {
    search: reqwest::Client,
    shipping: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl ShopClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let search = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.api_timeout_secs))
            .pool_max_idle_per_host(MAX_IDLE_CONNS)
            .build()?;
        let shipping = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.shipping_timeout_secs))
            .user_agent(SHIPPING_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            search,
            shipping,
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
        })
    }

    /// Search the shopping API for one keyword. Listings preserve marketplace
    /// order (rank 1..10); titles come back HTML-stripped.
    pub async fn search(&self, keyword: &str, sort_mode: SortMode) -> SearchOutcome {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return SearchOutcome::failure("marketplace credentials not configured");
        }

        let display = MAX_RESULTS.to_string();
        let resp = self
            .search
            .get(SEARCH_API_URL)
            .query(&[
                ("query", keyword),
                ("display", display.as_str()),
                ("sort", sort_mode.api_param()),
                ("exclude", "used:rental:cbshop"),
            ])
            .header("X-Naver-Client-Id", &self.client_id)
            .header("X-Naver-Client-Secret", &self.client_secret)
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => return SearchOutcome::failure(format!("search request failed: {e}")),
        };

        let status = resp.status();
        if !status.is_success() {
            return SearchOutcome::failure(format!("search API error: {}", status.as_u16()));
        }

        let body: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => return SearchOutcome::failure(format!("search response parse failed: {e}")),
        };

        let items = match body.get("items").and_then(|i| i.as_array()) {
            Some(a) if !a.is_empty() => a,
            _ => return SearchOutcome::failure(format!("no results: {keyword}")),
        };

        let listings: Vec<Listing> = items
            .iter()
            .take(MAX_RESULTS)
            .enumerate()
            .map(|(idx, item)| parse_search_item(item, idx as i64 + 1))
            .collect();

        debug!(keyword, count = listings.len(), "search complete");
        SearchOutcome {
            listings,
            ok: true,
            error: None,
        }
    }

    /// Fetch the shipping fee off a product page. Only hosts in the allowed
    /// store set are scraped; anything else is `(0, unknown)` without a
    /// request. Parse failures come back as `(0, error)` so the enricher can
    /// retry once.
    pub async fn fetch_shipping(&self, listing_url: &str) -> (i64, ShippingFeeType) {
        if !host_allowed(listing_url) {
            return (0, ShippingFeeType::Unknown);
        }

        let resp = match self.shipping.get(listing_url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("shipping fetch failed for {listing_url}: {e}");
                return (0, ShippingFeeType::Error);
            }
        };
        if !resp.status().is_success() {
            return (0, ShippingFeeType::Error);
        }

        let html = match resp.text().await {
            Ok(t) => t,
            Err(_) => return (0, ShippingFeeType::Error),
        };

        parse_shipping_page(&html)
    }
}

fn parse_search_item(item: &Value, rank: i64) -> Listing {
    let text = |key: &str| -> String {
        item.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    // Prices arrive as integer strings ("12900"); hprice may be empty.
    let int = |key: &str| -> i64 {
        item.get(key)
            .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0)
    };

    Listing {
        rank,
        title: strip_html(&text("title")),
        price: int("lprice"),
        mall: text("mallName"),
        link: text("link"),
        image: text("image"),
        listing_id: item
            .get("productId")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default(),
        hprice: int("hprice"),
        brand: text("brand"),
        maker: text("maker"),
        product_type: item
            .get("productType")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default(),
        category1: text("category1"),
        category2: text("category2"),
        category3: text("category3"),
        category4: text("category4"),
        shipping_fee: 0,
        shipping_fee_type: ShippingFeeType::Unknown,
    }
}

/// Remove HTML tags (`<b>` highlighting in search titles).
pub fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

pub fn host_allowed(url: &str) -> bool {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| ALLOWED_STORE_HOSTS.contains(&h)))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Shipping page parsing
// ---------------------------------------------------------------------------

const STATE_PREFIX: &str = "window.__PRELOADED_STATE__=";

/// Parse the embedded state blob out of a product page and read the shipping
/// fee. The vendor has shipped two shapes of the delivery object; both
/// extractors live behind this single entry point so either can be replaced
/// without touching call sites.
pub fn parse_shipping_page(html: &str) -> (i64, ShippingFeeType) {
    if is_error_page(html) {
        return (0, ShippingFeeType::Error);
    }

    let Some(raw) = extract_state_json(html) else {
        return (0, ShippingFeeType::Error);
    };
    let Ok(state) = serde_json::from_str::<Value>(raw) else {
        return (0, ShippingFeeType::Error);
    };

    shipping_from_current(&state)
        .or_else(|| shipping_from_legacy(&state))
        .unwrap_or((0, ShippingFeeType::Error))
}

/// `<title>` substring check — the store serves a styled error page with a
/// 200 status.
fn is_error_page(html: &str) -> bool {
    let Some(start) = html.find("<title>") else {
        return false;
    };
    let rest = &html[start + "<title>".len()..];
    let title = match rest.find("</title>") {
        Some(end) => &rest[..end],
        None => rest,
    };
    let lower = title.to_lowercase();
    lower.contains("에러") || lower.contains("error")
}

/// Locate the state assignment and scan the balanced JSON object that follows
/// it, stopping before the terminating `</script>`.
fn extract_state_json(html: &str) -> Option<&str> {
    let start = html.find(STATE_PREFIX)? + STATE_PREFIX.len();
    let script_end = html[start..].find("</script>").map(|i| start + i)?;
    let region = &html[start..script_end];

    let open = region.find('{')?;
    let bytes = region.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&region[open..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Current shape: `product.A.productDeliveryInfo.{deliveryFeeType, baseFee}`.
fn shipping_from_current(state: &Value) -> Option<(i64, ShippingFeeType)> {
    let info = state.get("product")?.get("A")?.get("productDeliveryInfo")?;
    read_delivery_object(info, "deliveryFeeType", "baseFee")
}

/// Legacy shape: `productDetail.delivery.{feeType, fee}`.
fn shipping_from_legacy(state: &Value) -> Option<(i64, ShippingFeeType)> {
    let info = state.get("productDetail")?.get("delivery")?;
    read_delivery_object(info, "feeType", "fee")
}

fn read_delivery_object(
    info: &Value,
    type_key: &str,
    fee_key: &str,
) -> Option<(i64, ShippingFeeType)> {
    let fee_type = info.get(type_key)?.as_str()?;
    if fee_type.eq_ignore_ascii_case("free") {
        return Some((0, ShippingFeeType::Free));
    }
    let fee = info
        .get(fee_key)
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0);
    if fee == 0 {
        // PAID with no fee amount — CONDITIONAL_FREE shows up like this.
        return Some((0, ShippingFeeType::Free));
    }
    Some((fee, ShippingFeeType::Paid))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_highlight_tags() {
        assert_eq!(strip_html("<b>무선</b> 청소기"), "무선 청소기");
        assert_eq!(strip_html("plain title"), "plain title");
    }

    #[test]
    fn host_filter_accepts_store_hosts_only() {
        assert!(host_allowed("https://smartstore.naver.com/shop/products/123"));
        assert!(host_allowed("https://brand.naver.com/x/products/9"));
        assert!(!host_allowed("https://shopping.naver.com/catalog/123"));
        assert!(!host_allowed("not a url"));
    }

    #[test]
    fn extracts_balanced_state_object() {
        let html = concat!(
            "<script>window.__PRELOADED_STATE__=",
            r#"{"a":{"b":"}"},"c":1};</script>"#,
        );
        let raw = extract_state_json(html).unwrap();
        assert_eq!(raw, r#"{"a":{"b":"}"},"c":1}"#);
    }

    #[test]
    fn current_shape_paid_fee() {
        let html = concat!(
            "<html><script>window.__PRELOADED_STATE__=",
            r#"{"product":{"A":{"productDeliveryInfo":{"deliveryFeeType":"PAID","baseFee":3000}}}}"#,
            ";</script></html>",
        );
        assert_eq!(parse_shipping_page(html), (3000, ShippingFeeType::Paid));
    }

    #[test]
    fn current_shape_free() {
        let html = concat!(
            "<script>window.__PRELOADED_STATE__=",
            r#"{"product":{"A":{"productDeliveryInfo":{"deliveryFeeType":"FREE"}}}}"#,
            ";</script>",
        );
        assert_eq!(parse_shipping_page(html), (0, ShippingFeeType::Free));
    }

    #[test]
    fn legacy_shape_fallback() {
        let html = concat!(
            "<script>window.__PRELOADED_STATE__=",
            r#"{"productDetail":{"delivery":{"feeType":"PAID","fee":"2500"}}}"#,
            ";</script>",
        );
        assert_eq!(parse_shipping_page(html), (2500, ShippingFeeType::Paid));
    }

    #[test]
    fn missing_blob_is_parse_error() {
        let html = "<html><body>nothing here</body></html>";
        assert_eq!(parse_shipping_page(html), (0, ShippingFeeType::Error));
    }

    #[test]
    fn error_page_detected_by_title() {
        let html = concat!(
            "<html><head><title>에러 페이지</title></head>",
            "<script>window.__PRELOADED_STATE__=",
            r#"{"product":{"A":{"productDeliveryInfo":{"deliveryFeeType":"FREE"}}}}"#,
            ";</script></html>",
        );
        assert_eq!(parse_shipping_page(html), (0, ShippingFeeType::Error));
    }

    #[test]
    fn search_item_parses_string_prices() {
        let item = serde_json::json!({
            "title": "<b>삼성</b> 충전기",
            "lprice": "12900",
            "hprice": "",
            "mallName": "테스트몰",
            "link": "https://smartstore.naver.com/x/products/1",
            "image": "https://img/1.jpg",
            "productId": 88223344,
            "brand": "삼성",
            "maker": "삼성전자",
            "productType": "2",
            "category1": "디지털/가전",
        });
        let listing = parse_search_item(&item, 3);
        assert_eq!(listing.rank, 3);
        assert_eq!(listing.title, "삼성 충전기");
        assert_eq!(listing.price, 12900);
        assert_eq!(listing.listing_id, "88223344");
        assert_eq!(listing.shipping_fee_type, ShippingFeeType::Unknown);
    }
}
