//! HTTP Server for ride insights
//!
//! クエリ文字列をFilterSpecに変換し、各ビューへ委譲する薄い層。

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::{
    analytics::{AnomalyDetector, AnomalyReport},
    config::AnalyticsConfig,
    error::{Error, Result},
    filter::RawFilterQuery,
    handlers::database::RideStore,
    views::{
        DailyCount, HeatmapCell, Page, RideViews, RouteCount, TripListing, TripTotals, Zone,
        ZoneStats,
    },
};

/// 一覧の1ページあたり上限
pub const MAX_PAGE_SIZE: u32 = 500;

/// ハンドラ間で共有される状態
#[derive(Clone)]
pub struct AppState {
    pub views: RideViews,
    pub detector: Arc<AnomalyDetector>,
    pub analytics: Arc<AnalyticsConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn RideStore>, analytics: AnalyticsConfig) -> Self {
        Self {
            views: RideViews::new(store).with_route_limit(analytics.route_limit),
            detector: Arc::new(AnomalyDetector::new(analytics.detector_config())),
            analytics: Arc::new(analytics),
        }
    }
}

/// クエリ文字列のキーと値の組
///
/// 同じキーの繰り返しを許すため、構造体ではなく組の列として受け取る
type QueryPairs = Query<Vec<(String, String)>>;

/// ページ指定（未指定は設定の既定値）
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PageQuery {
    /// 数値として読めない値は捨て、読めた最後の値を採用する
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut page = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "limit" => &mut page.limit,
                "offset" => &mut page.offset,
                _ => continue,
            };
            match value.trim().parse::<u32>() {
                Ok(n) => *slot = Some(n),
                Err(_) => debug!(key = %key, value = %value, "dropping malformed page value"),
            }
        }
        page
    }

    /// 既定値と上限を適用
    pub fn resolve(self, default_limit: u32) -> Page {
        Page {
            limit: self.limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(0),
        }
    }
}

/// ゾーン統計の対象
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ZoneQuery {
    pub zone_id: Option<String>,
}

impl ZoneQuery {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let zone_id = pairs
            .iter()
            .filter(|(key, _)| matches!(key.as_str(), "zoneId" | "zone" | "zone_id"))
            .map(|(_, value)| value.clone())
            .last();
        Self { zone_id }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // 詳細はログのみ。クライアントには分類だけを返す
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, "rejected request");
        }

        let message = match &self {
            Error::InvalidInput(m) | Error::MissingParameter(m) => m.clone(),
            _ => "internal error".to_string(),
        };
        let body = json!({ "error": self.kind(), "message": message });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/routes", get(route_ranking))
        .route("/api/heatmap", get(heat_map))
        .route("/api/timeseries", get(time_series))
        .route("/api/totals", get(filtered_totals))
        .route("/api/overview", get(city_overview))
        .route("/api/trips", get(filtered_listing))
        .route("/api/zones", get(list_zones))
        .route("/api/zone-stats", get(zone_stats))
        .route("/api/anomalies", get(anomalies))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTPサーバーを起動
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let app = router(state);

    info!(addr, "starting HTTP server");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    state.views.store().ping().await?;
    Ok(Json(json!({
        "status": "ok",
        "dialect": state.views.store().dialect().to_string(),
    })))
}

async fn route_ranking(
    State(state): State<AppState>,
    Query(pairs): QueryPairs,
) -> Result<Json<Vec<RouteCount>>> {
    let spec = RawFilterQuery::from_pairs(pairs).into_spec();
    Ok(Json(state.views.route_ranking(&spec).await?))
}

async fn heat_map(
    State(state): State<AppState>,
    Query(pairs): QueryPairs,
) -> Result<Json<Vec<HeatmapCell>>> {
    let spec = RawFilterQuery::from_pairs(pairs).into_spec();
    Ok(Json(state.views.heat_map(&spec).await?))
}

async fn time_series(
    State(state): State<AppState>,
    Query(pairs): QueryPairs,
) -> Result<Json<Vec<DailyCount>>> {
    let spec = RawFilterQuery::from_pairs(pairs).into_spec();
    Ok(Json(state.views.time_series(&spec).await?))
}

async fn filtered_totals(
    State(state): State<AppState>,
    Query(pairs): QueryPairs,
) -> Result<Json<TripTotals>> {
    let spec = RawFilterQuery::from_pairs(pairs).into_spec();
    Ok(Json(state.views.filtered_totals(&spec).await?))
}

async fn city_overview(State(state): State<AppState>) -> Result<Json<TripTotals>> {
    Ok(Json(state.views.city_overview().await?))
}

async fn filtered_listing(
    State(state): State<AppState>,
    Query(pairs): QueryPairs,
) -> Result<Json<Vec<TripListing>>> {
    let page = PageQuery::from_pairs(&pairs).resolve(state.analytics.listing_page_size);
    let spec = RawFilterQuery::from_pairs(pairs).into_spec();
    Ok(Json(state.views.filtered_listing(&spec, page).await?))
}

async fn list_zones(State(state): State<AppState>) -> Result<Json<Vec<Zone>>> {
    Ok(Json(state.views.list_zones().await?))
}

async fn zone_stats(
    State(state): State<AppState>,
    Query(pairs): QueryPairs,
) -> Result<Json<ZoneStats>> {
    let query = ZoneQuery::from_pairs(&pairs);
    let raw = query
        .zone_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::MissingParameter("zoneId is required".to_string()))?;
    let zone_id = raw
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| Error::InvalidInput(format!("invalid zone id: {}", raw)))?;

    state
        .views
        .zone_stats(zone_id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::InvalidInput(format!("unknown zone id: {}", zone_id)))
}

async fn anomalies(State(state): State<AppState>) -> Result<Json<AnomalyReport>> {
    let rides = state
        .views
        .fetch_anomaly_snapshot(state.analytics.snapshot_limit)
        .await?;
    Ok(Json(state.detector.detect(&rides)))
}
