use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, OpLatency};
use crate::cache::{CacheLayer, CacheStatsSnapshot};
use crate::error::AppError;
use crate::leaderboard::{
    parse_date, ItemDetail, LeaderboardPage, LeaderboardParams, LeaderboardQuery,
    LeaderboardService, Sparkline, TimeSeries, DEFAULT_SERIES_DAYS, DEFAULT_SPARKLINE_DAYS,
};
use crate::metrics::DerivedMetricsEngine;
use crate::ranking::ranker::DateRankSummary;
use crate::ranking::{RankedEntry, RankingEngine};
use crate::types::DerivedMetrics;

#[derive(Clone)]
pub struct ApiState {
    pub leaderboard: Arc<LeaderboardService>,
    pub derived: Arc<DerivedMetricsEngine>,
    pub ranking: Arc<RankingEngine>,
    pub cache: Arc<CacheLayer>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

/// Thin HTTP glue. Auth and billing checks belong in front of this router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/leaderboard", get(get_leaderboard))
        .route("/items/:id", get(get_item_detail))
        .route("/items/:id/series", get(get_time_series))
        .route("/items/:id/sparkline", get(get_sparkline))
        .route("/admin/items/:id/recompute", post(post_recompute_item))
        .route("/admin/ranks/backfill", post(post_backfill_ranks))
        .route("/admin/ranks/:date", post(post_recompute_ranks))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Deserialize)]
pub struct SeriesQuery {
    pub days: Option<u32>,
    pub end: Option<String>,
}

#[derive(Deserialize)]
pub struct BackfillQuery {
    pub start: String,
    pub end: String,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub last_ranking_at_ns: Option<u64>,
    pub last_ranked_count: u64,
    pub ranking_runs: u64,
    pub cache: CacheStatsSnapshot,
}

#[derive(Serialize)]
pub struct RecomputeResponse {
    pub item_id: String,
    pub date: String,
    pub derived: DerivedMetrics,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_leaderboard(
    State(state): State<ApiState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<LeaderboardPage>, AppError> {
    let query = LeaderboardQuery::try_from(params)?;
    Ok(Json(state.leaderboard.ranked_page(&query).await?))
}

async fn get_item_detail(
    State(state): State<ApiState>,
    Path(item_id): Path<String>,
    Query(params): Query<DateQuery>,
) -> Result<Json<ItemDetail>, AppError> {
    let date = params.date.as_deref().map(parse_date).transpose()?;
    Ok(Json(state.leaderboard.item_detail(&item_id, date).await?))
}

async fn get_time_series(
    State(state): State<ApiState>,
    Path(item_id): Path<String>,
    Query(params): Query<SeriesQuery>,
) -> Result<Json<TimeSeries>, AppError> {
    let end = params.end.as_deref().map(parse_date).transpose()?;
    let days = params.days.unwrap_or(DEFAULT_SERIES_DAYS);
    Ok(Json(state.leaderboard.time_series(&item_id, days, end).await?))
}

async fn get_sparkline(
    State(state): State<ApiState>,
    Path(item_id): Path<String>,
    Query(params): Query<SeriesQuery>,
) -> Result<Json<Sparkline>, AppError> {
    let end = params.end.as_deref().map(parse_date).transpose()?;
    let days = params.days.unwrap_or(DEFAULT_SPARKLINE_DAYS);
    Ok(Json(state.leaderboard.sparkline(&item_id, days, end).await?))
}

async fn post_recompute_item(
    State(state): State<ApiState>,
    Path(item_id): Path<String>,
    Query(params): Query<DateQuery>,
) -> Result<Json<RecomputeResponse>, AppError> {
    let date = match params.date.as_deref() {
        Some(d) => parse_date(d)?,
        None => chrono::Utc::now().date_naive(),
    };
    let derived = state.derived.update_all(&item_id, date).await?;
    Ok(Json(RecomputeResponse {
        item_id,
        date: date.to_string(),
        derived,
    }))
}

async fn post_recompute_ranks(
    State(state): State<ApiState>,
    Path(date): Path<String>,
) -> Result<Json<Vec<RankedEntry>>, AppError> {
    let date = parse_date(&date)?;
    Ok(Json(state.ranking.recompute_ranks(date).await?))
}

async fn post_backfill_ranks(
    State(state): State<ApiState>,
    Query(params): Query<BackfillQuery>,
) -> Result<Json<Vec<DateRankSummary>>, AppError> {
    let start = parse_date(&params.start)?;
    let end = parse_date(&params.end)?;
    Ok(Json(state.ranking.backfill_ranks(start, end).await?))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let last = state.health.last_ranking_at_ns();
    Json(HealthResponse {
        status: "ok",
        last_ranking_at_ns: (last > 0).then_some(last),
        last_ranked_count: state.health.last_ranked_count(),
        ranking_runs: state.health.ranking_runs(),
        cache: state.cache.stats(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<Vec<OpLatency>> {
    Json(state.latency.snapshot())
}
