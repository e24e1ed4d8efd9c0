//! Thin HTTP handlers over the core. Everything here is read-shape and
//! delegation; the crawl pipeline, alert engine, and scheduler never depend
//! on this module.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::health::HealthState;
use crate::api::metrics::CrawlDurations;
use crate::config::Config;
use crate::coordinator::CrawlCoordinator;
use crate::db::models::{CostItemRow, ProductRow};
use crate::db::{alerts as alert_db, catalog, logs, overrides, push as push_db, rankings};
use crate::error::{AppError, Result};
use crate::fetcher::MarketClient;
use crate::keywords::{suggest_keywords, DictCache};
use crate::types::{now_secs, AlertKind, SortMode};

pub struct ApiState<M> {
    pub pool: sqlx::SqlitePool,
    pub cfg: Config,
    pub coordinator: Arc<CrawlCoordinator<M>>,
    pub health: Arc<HealthState>,
    pub durations: Arc<CrawlDurations>,
    pub dict: DictCache,
}

impl<M> Clone for ApiState<M> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            cfg: self.cfg.clone(),
            coordinator: Arc::clone(&self.coordinator),
            health: Arc::clone(&self.health),
            durations: Arc::clone(&self.durations),
            dict: self.dict.clone(),
        }
    }
}

pub fn router<M: MarketClient>(state: ApiState<M>) -> Router {
    Router::new()
        // Tenants
        .route("/tenants", get(list_tenants::<M>).post(create_tenant::<M>))
        .route(
            "/tenants/:id",
            get(get_tenant::<M>).put(update_tenant::<M>).delete(delete_tenant::<M>),
        )
        // Products
        .route(
            "/tenants/:id/products",
            get(list_products::<M>).post(create_product::<M>),
        )
        .route("/products/:id", get(get_product::<M>).delete(delete_product::<M>))
        // Keywords
        .route(
            "/products/:id/keywords",
            get(list_keywords::<M>).post(create_keyword::<M>),
        )
        .route("/products/:id/keywords/suggest", get(suggest_product_keywords::<M>))
        .route("/keywords/:id", delete(delete_keyword::<M>))
        // Blacklist / include / shipping overrides
        .route(
            "/products/:id/blacklist",
            get(list_blacklist::<M>).post(add_blacklist::<M>),
        )
        .route("/products/:id/blacklist/:listing_id", delete(remove_blacklist::<M>))
        .route(
            "/products/:id/includes",
            get(list_includes::<M>).post(add_include::<M>),
        )
        .route("/products/:id/includes/:listing_id", delete(remove_include::<M>))
        .route(
            "/products/:id/shipping-overrides",
            get(list_shipping_overrides::<M>).put(upsert_shipping_override::<M>),
        )
        .route(
            "/products/:id/shipping-overrides/:listing_id",
            delete(remove_shipping_override::<M>),
        )
        // Costs
        .route("/products/:id/costs", get(list_costs::<M>).post(create_cost::<M>))
        .route("/costs/:id", delete(delete_cost::<M>))
        .route(
            "/tenants/:id/cost-presets",
            get(list_cost_presets::<M>).post(create_cost_preset::<M>),
        )
        // Alerts
        .route("/tenants/:id/alerts", get(list_alerts::<M>))
        .route("/alerts/:id/read", post(mark_alert_read::<M>))
        .route("/tenants/:id/alert-settings", put(put_alert_setting::<M>))
        // Push subscriptions
        .route("/tenants/:id/push-subscriptions", post(subscribe_push::<M>))
        .route("/push-subscriptions", delete(unsubscribe_push::<M>))
        // Crawl operations
        .route("/crawl/product/:id", post(crawl_product::<M>))
        .route("/crawl/user/:id", post(crawl_tenant::<M>))
        .route("/crawl/status/:id", get(crawl_status::<M>))
        .route("/crawl/logs/:id", get(crawl_logs::<M>))
        .route("/crawl/metrics", get(crawl_metrics::<M>))
        // Export + health
        .route("/export/products/:id", get(export_products_csv::<M>))
        .route("/health", get(health::<M>))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct TenantBody {
    pub name: String,
    pub own_store_label: Option<String>,
    pub crawl_interval_min: Option<i64>,
}

#[derive(Deserialize)]
pub struct ProductBody {
    pub name: String,
    pub category: Option<String>,
    #[serde(default)]
    pub cost_price: i64,
    #[serde(default)]
    pub selling_price: i64,
    pub own_listing_id: Option<String>,
    pub model_code: Option<String>,
    pub spec_keywords: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct KeywordBody {
    pub text: String,
    pub sort_mode: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Deserialize)]
pub struct BlacklistBody {
    pub listing_id: String,
    pub title: Option<String>,
    pub mall: Option<String>,
}

#[derive(Deserialize)]
pub struct IncludeBody {
    pub listing_id: String,
}

#[derive(Deserialize)]
pub struct ShippingOverrideBody {
    pub listing_id: String,
    pub shipping_fee: i64,
    pub title: Option<String>,
    pub mall: Option<String>,
}

#[derive(Deserialize)]
pub struct CostBody {
    pub name: String,
    pub kind: String,
    pub value: f64,
}

#[derive(Deserialize)]
pub struct AlertSettingBody {
    pub kind: AlertKind,
    pub enabled: bool,
    pub threshold: Option<f64>,
}

#[derive(Deserialize)]
pub struct PushSubscribeBody {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Deserialize)]
pub struct PushUnsubscribeBody {
    pub endpoint: String,
}

#[derive(Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub unread: bool,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ProductListItem {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub selling_price: i64,
    pub cost_price: i64,
    pub price_locked: bool,
    pub status: &'static str,
    pub lowest_total: Option<i64>,
    pub lowest_seller: Option<String>,
    pub price_gap: Option<i64>,
    pub price_gap_percent: Option<f64>,
    pub my_rank: Option<i64>,
    pub keyword_count: usize,
    pub margin_amount: i64,
    pub margin_percent: f64,
    pub sparkline: Vec<i64>,
    pub last_crawled_at: Option<i64>,
}

// ---------------------------------------------------------------------------
// Status / margin calculators (read side)
// ---------------------------------------------------------------------------

const CLOSE_BAND_PCT: f64 = 3.0;

pub fn calculate_status(selling_price: i64, lowest_total: Option<i64>) -> &'static str {
    let Some(lowest) = lowest_total else {
        return "winning";
    };
    if lowest == 0 {
        return "losing";
    }
    if selling_price <= lowest {
        return "winning";
    }
    let gap_percent = ((selling_price - lowest) as f64 / lowest as f64) * 100.0;
    if gap_percent <= CLOSE_BAND_PCT {
        "close"
    } else {
        "losing"
    }
}

pub struct Margin {
    pub total_costs: i64,
    pub net_margin: i64,
    pub margin_percent: f64,
}

pub fn calculate_margin(selling_price: i64, cost_price: i64, items: &[CostItemRow]) -> Margin {
    let total_costs: i64 = items
        .iter()
        .map(|item| {
            if item.kind == "percent" {
                (selling_price as f64 * item.value / 100.0) as i64
            } else {
                item.value as i64
            }
        })
        .sum();
    let net_margin = selling_price - cost_price - total_costs;
    let margin_percent = if selling_price > 0 {
        ((net_margin as f64 / selling_price as f64) * 1000.0).round() / 10.0
    } else {
        0.0
    };
    Margin {
        total_costs,
        net_margin,
        margin_percent,
    }
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

async fn list_tenants<M: MarketClient>(
    State(state): State<ApiState<M>>,
) -> Result<impl IntoResponse> {
    Ok(Json(catalog::list_tenants(&state.pool).await?))
}

async fn create_tenant<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Json(body): Json<TenantBody>,
) -> Result<impl IntoResponse> {
    let interval = body
        .crawl_interval_min
        .unwrap_or(state.cfg.default_interval_min);
    let tenant = catalog::create_tenant(
        &state.pool,
        &body.name,
        body.own_store_label.as_deref(),
        interval,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

async fn get_tenant<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let tenant = catalog::get_tenant(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("tenant"))?;
    Ok(Json(tenant))
}

async fn update_tenant<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(id): Path<i64>,
    Json(body): Json<TenantBody>,
) -> Result<impl IntoResponse> {
    let interval = body
        .crawl_interval_min
        .unwrap_or(state.cfg.default_interval_min);
    let tenant =
        catalog::update_tenant(&state.pool, id, body.own_store_label.as_deref(), interval)
            .await?
            .ok_or(AppError::NotFound("tenant"))?;
    Ok(Json(tenant))
}

async fn delete_tenant<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    if !catalog::delete_tenant(&state.pool, id).await? {
        return Err(AppError::NotFound("tenant"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

async fn build_list_item<M: MarketClient>(
    state: &ApiState<M>,
    product: &ProductRow,
) -> Result<ProductListItem> {
    let keywords = catalog::active_keywords_for_product(&state.pool, product.id).await?;
    let latest = rankings::latest_rankings_for_product(&state.pool, product.id).await?;
    let blacklisted: std::collections::HashSet<String> =
        overrides::list_blacklist(&state.pool, product.id)
            .await?
            .into_iter()
            .map(|b| b.listing_id)
            .collect();

    let lowest = latest
        .values()
        .flatten()
        .filter(|r| r.is_relevant)
        .filter(|r| match r.listing_id.as_deref() {
            Some(id) => !blacklisted.contains(id),
            None => true,
        })
        .min_by_key(|r| r.total_price());
    let lowest_total = lowest.map(|r| r.total_price());
    let lowest_seller = lowest.map(|r| r.mall.clone());

    let price_gap = lowest_total.map(|l| product.selling_price - l);
    let price_gap_percent = lowest_total.and_then(|l| {
        if l > 0 {
            Some((((product.selling_price - l) as f64 / l as f64) * 1000.0).round() / 10.0)
        } else {
            None
        }
    });

    let my_rank = rankings::best_own_rank(&latest, product.own_listing_id.as_deref());
    let cost_items = catalog::cost_items_for_product(&state.pool, product.id).await?;
    let margin = calculate_margin(product.selling_price, product.cost_price, &cost_items);

    let since = now_secs() - state.cfg.sparkline_days * 86400;
    let sparkline = rankings::sparkline(&state.pool, product.id, since).await?;

    let last_crawled_at = keywords.iter().filter_map(|k| k.last_crawled_at).max();

    Ok(ProductListItem {
        id: product.id,
        name: product.name.clone(),
        category: product.category.clone(),
        selling_price: product.selling_price,
        cost_price: product.cost_price,
        price_locked: product.price_locked,
        status: calculate_status(product.selling_price, lowest_total),
        lowest_total,
        lowest_seller,
        price_gap,
        price_gap_percent,
        my_rank,
        keyword_count: keywords.len(),
        margin_amount: margin.net_margin,
        margin_percent: margin.margin_percent,
        sparkline,
        last_crawled_at,
    })
}

async fn list_products<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(tenant_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let products = catalog::active_products_for_tenant(&state.pool, tenant_id).await?;
    let mut items = Vec::with_capacity(products.len());
    for product in &products {
        items.push(build_list_item(&state, product).await?);
    }
    Ok(Json(items))
}

async fn create_product<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(tenant_id): Path<i64>,
    Json(body): Json<ProductBody>,
) -> Result<impl IntoResponse> {
    catalog::get_tenant(&state.pool, tenant_id)
        .await?
        .ok_or(AppError::NotFound("tenant"))?;
    let spec_keywords = body
        .spec_keywords
        .as_ref()
        .map(|list| serde_json::to_string(list))
        .transpose()?;
    let product = catalog::create_product(
        &state.pool,
        tenant_id,
        &body.name,
        body.category.as_deref(),
        body.cost_price,
        body.selling_price,
        body.own_listing_id.as_deref(),
        body.model_code.as_deref(),
        spec_keywords.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn get_product<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let product = catalog::get_product(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("product"))?;
    let item = build_list_item(&state, &product).await?;
    let latest = rankings::latest_rankings_for_product(&state.pool, id).await?;
    Ok(Json(json!({
        "product": product,
        "summary": item,
        "latest_rankings": latest,
    })))
}

async fn delete_product<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    if !catalog::delete_product(&state.pool, id).await? {
        return Err(AppError::NotFound("product"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

async fn list_keywords<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        catalog::active_keywords_for_product(&state.pool, product_id).await?,
    ))
}

async fn create_keyword<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(product_id): Path<i64>,
    Json(body): Json<KeywordBody>,
) -> Result<impl IntoResponse> {
    catalog::get_product(&state.pool, product_id)
        .await?
        .ok_or(AppError::NotFound("product"))?;
    let sort_mode = SortMode::parse(body.sort_mode.as_deref().unwrap_or("relevance"));
    let keyword = catalog::create_keyword(
        &state.pool,
        product_id,
        &body.text,
        sort_mode,
        body.is_primary,
        state.cfg.max_keywords_per_product,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(keyword)))
}

async fn delete_keyword<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    if !catalog::delete_keyword(&state.pool, id).await? {
        return Err(AppError::NotFound("keyword"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn suggest_product_keywords<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let product = catalog::get_product(&state.pool, product_id)
        .await?
        .ok_or(AppError::NotFound("product"))?;
    let tenant = catalog::get_tenant(&state.pool, product.tenant_id)
        .await?
        .ok_or(AppError::NotFound("tenant"))?;

    let (brands, types) = state.dict.get(&state.pool).await?;
    let suggestions = suggest_keywords(
        &product.name,
        tenant.own_store_label.as_deref(),
        &brands,
        &types,
        state.cfg.max_keywords_per_product as usize,
    );
    Ok(Json(json!({ "suggestions": suggestions })))
}

// ---------------------------------------------------------------------------
// Blacklist / include / shipping overrides
// ---------------------------------------------------------------------------

async fn list_blacklist<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(overrides::list_blacklist(&state.pool, product_id).await?))
}

async fn add_blacklist<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(product_id): Path<i64>,
    Json(body): Json<BlacklistBody>,
) -> Result<impl IntoResponse> {
    catalog::get_product(&state.pool, product_id)
        .await?
        .ok_or(AppError::NotFound("product"))?;
    let entry = overrides::add_blacklist(
        &state.pool,
        product_id,
        &body.listing_id,
        body.title.as_deref(),
        body.mall.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn remove_blacklist<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path((product_id, listing_id)): Path<(i64, String)>,
) -> Result<impl IntoResponse> {
    overrides::remove_blacklist(&state.pool, product_id, &listing_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_includes<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(overrides::list_includes(&state.pool, product_id).await?))
}

async fn add_include<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(product_id): Path<i64>,
    Json(body): Json<IncludeBody>,
) -> Result<impl IntoResponse> {
    catalog::get_product(&state.pool, product_id)
        .await?
        .ok_or(AppError::NotFound("product"))?;
    let entry = overrides::add_include(&state.pool, product_id, &body.listing_id).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn remove_include<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path((product_id, listing_id)): Path<(i64, String)>,
) -> Result<impl IntoResponse> {
    overrides::remove_include(&state.pool, product_id, &listing_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_shipping_overrides<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        overrides::list_shipping_overrides(&state.pool, product_id).await?,
    ))
}

async fn upsert_shipping_override<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(product_id): Path<i64>,
    Json(body): Json<ShippingOverrideBody>,
) -> Result<impl IntoResponse> {
    catalog::get_product(&state.pool, product_id)
        .await?
        .ok_or(AppError::NotFound("product"))?;
    let row = overrides::upsert_shipping_override(
        &state.pool,
        product_id,
        &body.listing_id,
        body.shipping_fee,
        body.title.as_deref(),
        body.mall.as_deref(),
    )
    .await?;
    Ok(Json(row))
}

async fn remove_shipping_override<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path((product_id, listing_id)): Path<(i64, String)>,
) -> Result<impl IntoResponse> {
    overrides::remove_shipping_override(&state.pool, product_id, &listing_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Costs
// ---------------------------------------------------------------------------

async fn list_costs<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(product_id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        catalog::cost_items_for_product(&state.pool, product_id).await?,
    ))
}

async fn create_cost<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(product_id): Path<i64>,
    Json(body): Json<CostBody>,
) -> Result<impl IntoResponse> {
    catalog::get_product(&state.pool, product_id)
        .await?
        .ok_or(AppError::NotFound("product"))?;
    let item =
        catalog::create_cost_item(&state.pool, product_id, &body.name, &body.kind, body.value)
            .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn delete_cost<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    if !catalog::delete_cost_item(&state.pool, id).await? {
        return Err(AppError::NotFound("cost item"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn list_cost_presets<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(tenant_id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        catalog::cost_presets_for_tenant(&state.pool, tenant_id).await?,
    ))
}

async fn create_cost_preset<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(tenant_id): Path<i64>,
    Json(body): Json<CostBody>,
) -> Result<impl IntoResponse> {
    catalog::get_tenant(&state.pool, tenant_id)
        .await?
        .ok_or(AppError::NotFound("tenant"))?;
    let preset =
        catalog::create_cost_preset(&state.pool, tenant_id, &body.name, &body.kind, body.value)
            .await?;
    Ok((StatusCode::CREATED, Json(preset)))
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

async fn list_alerts<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(tenant_id): Path<i64>,
    Query(params): Query<AlertsQuery>,
) -> Result<impl IntoResponse> {
    let limit = params.limit.unwrap_or(50);
    Ok(Json(
        alert_db::list_alerts(&state.pool, tenant_id, params.unread, limit).await?,
    ))
}

async fn mark_alert_read<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    alert_db::mark_read(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn put_alert_setting<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(tenant_id): Path<i64>,
    Json(body): Json<AlertSettingBody>,
) -> Result<impl IntoResponse> {
    let setting = alert_db::upsert_setting(
        &state.pool,
        tenant_id,
        body.kind,
        body.enabled,
        body.threshold,
    )
    .await?;
    Ok(Json(setting))
}

// ---------------------------------------------------------------------------
// Push subscriptions
// ---------------------------------------------------------------------------

async fn subscribe_push<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(tenant_id): Path<i64>,
    Json(body): Json<PushSubscribeBody>,
) -> Result<impl IntoResponse> {
    catalog::get_tenant(&state.pool, tenant_id)
        .await?
        .ok_or(AppError::NotFound("tenant"))?;
    let sub = push_db::upsert_subscription(
        &state.pool,
        tenant_id,
        &body.endpoint,
        &body.p256dh,
        &body.auth,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(sub)))
}

async fn unsubscribe_push<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Json(body): Json<PushUnsubscribeBody>,
) -> Result<impl IntoResponse> {
    push_db::delete_subscription(&state.pool, &body.endpoint).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Crawl operations
// ---------------------------------------------------------------------------

async fn crawl_product<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let summaries = state.coordinator.crawl_product(id).await?;
    Ok(Json(summaries))
}

async fn crawl_tenant<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let stats = state.coordinator.crawl_tenant(id).await?;
    Ok(Json(stats))
}

async fn crawl_status<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(tenant_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let total_keywords = catalog::total_active_keywords(&state.pool, tenant_id).await?;
    let stats = logs::stats_24h(&state.pool, tenant_id).await?;
    Ok(Json(json!({
        "total_keywords": total_keywords,
        "last_24h_success": stats.success,
        "last_24h_failed": stats.failed,
        "avg_duration_ms": stats.avg_duration_ms,
    })))
}

#[derive(Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

async fn crawl_logs<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(tenant_id): Path<i64>,
    Query(params): Query<LogsQuery>,
) -> Result<impl IntoResponse> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0).max(0);
    Ok(Json(
        logs::list_logs(&state.pool, tenant_id, limit, offset).await?,
    ))
}

async fn crawl_metrics<M: MarketClient>(
    State(state): State<ApiState<M>>,
) -> Result<impl IntoResponse> {
    let (p50, p95, p99) = state.durations.percentiles();
    Ok(Json(json!({
        "samples": state.durations.len(),
        "p50_ms": p50,
        "p95_ms": p95,
        "p99_ms": p99,
    })))
}

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

async fn export_products_csv<M: MarketClient>(
    State(state): State<ApiState<M>>,
    Path(tenant_id): Path<i64>,
) -> Result<impl IntoResponse> {
    catalog::get_tenant(&state.pool, tenant_id)
        .await?
        .ok_or(AppError::NotFound("tenant"))?;
    let products = catalog::active_products_for_tenant(&state.pool, tenant_id).await?;

    let mut csv = String::from(
        "name,category,selling_price,lowest_total,gap,gap_pct,rank,margin,margin_pct,status,price_locked\n",
    );
    for product in &products {
        let item = build_list_item(&state, product).await?;
        let row = [
            csv_field(&item.name),
            csv_field(item.category.as_deref().unwrap_or("")),
            item.selling_price.to_string(),
            item.lowest_total.map(|v| v.to_string()).unwrap_or_default(),
            item.price_gap.map(|v| v.to_string()).unwrap_or_default(),
            item.price_gap_percent.map(|v| format!("{v:.1}")).unwrap_or_default(),
            item.my_rank.map(|v| v.to_string()).unwrap_or_default(),
            item.margin_amount.to_string(),
            format!("{:.1}", item.margin_percent),
            item.status.to_string(),
            if item.price_locked { "Y" } else { "N" }.to_string(),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"products.csv\"",
            ),
        ],
        csv,
    ))
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health<M: MarketClient>(State(state): State<ApiState<M>>) -> impl IntoResponse {
    let database_ok = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();
    let last_crawl_at = if database_ok {
        logs::last_crawl_at(&state.pool).await.unwrap_or(None)
    } else {
        None
    };
    let (success_24h, failed_24h) = if database_ok {
        logs::global_stats_24h(&state.pool).await.unwrap_or((0, 0))
    } else {
        (0, 0)
    };
    let scheduler_ok = state.health.scheduler_running();

    let status = if !database_ok {
        "unhealthy"
    } else if !scheduler_ok || (failed_24h > 0 && failed_24h > success_24h) {
        "degraded"
    } else {
        "healthy"
    };

    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status,
            "checks": {
                "database": database_ok,
                "last_crawl_at": last_crawl_at,
                "scheduler": scheduler_ok,
                "scheduler_last_tick_at": state.health.last_tick_at(),
                "crawl_metrics_24h": {
                    "success": success_24h,
                    "failed": failed_24h,
                },
            },
        })),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
