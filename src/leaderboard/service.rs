use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::{
    validate_days, ItemDetail, LeaderboardEntry, LeaderboardPage, LeaderboardQuery, Sparkline,
    SparklinePoint, TimeSeries,
};
use crate::api::latency::LatencyStats;
use crate::cache::{keys, CacheLayer};
use crate::config::CacheConfig;
use crate::db::SnapshotRepository;
use crate::error::{AppError, Result};
use crate::metrics::derived::lookback_start;
use crate::types::{MetricSnapshot, SortDirection, SortField};

/// Read side: ranked pages, item detail, time series and sparklines.
///
/// Ranks are never recomputed here; pages show whatever the last ranking run
/// persisted. Cache misses are served from the store and the cache is filled
/// in the background.
pub struct LeaderboardService {
    repo: Arc<dyn SnapshotRepository>,
    cache: Arc<CacheLayer>,
    ttls: CacheConfig,
    latency: Arc<LatencyStats>,
    read_budget: Duration,
}

impl LeaderboardService {
    pub fn new(
        repo: Arc<dyn SnapshotRepository>,
        cache: Arc<CacheLayer>,
        ttls: CacheConfig,
        latency: Arc<LatencyStats>,
        read_budget: Duration,
    ) -> Self {
        Self {
            repo,
            cache,
            ttls,
            latency,
            read_budget,
        }
    }

    pub async fn ranked_page(&self, query: &LeaderboardQuery) -> Result<LeaderboardPage> {
        query.validate()?;
        let started = Instant::now();

        let key = query
            .is_cacheable()
            .then(|| keys::leaderboard(query.date, query.limit));
        if let Some(key) = &key {
            if let Some(page) = self.cache.get::<LeaderboardPage>(key).await {
                self.observe("ranked_page", started);
                return Ok(page);
            }
        }

        let page = self.build_page(query).await?;
        if let Some(key) = key {
            self.cache.spawn_set(key, &page, self.ttls.leaderboard_ttl);
        }
        self.observe("ranked_page", started);
        Ok(page)
    }

    /// Detail for one item on `date`, or on its most recent snapshot date.
    pub async fn item_detail(&self, item_id: &str, date: Option<NaiveDate>) -> Result<ItemDetail> {
        let started = Instant::now();
        let key = keys::item_detail(item_id, date);
        if let Some(detail) = self.cache.get::<ItemDetail>(&key).await {
            self.observe("item_detail", started);
            return Ok(detail);
        }

        let snapshot = match date {
            Some(d) => self.repo.get_snapshot(item_id, d).await?,
            None => self.repo.latest_snapshot(item_id).await?,
        }
        .ok_or_else(|| not_found(item_id, date))?;
        let item = self.repo.get_item(item_id).await?;

        let detail = ItemDetail {
            item_id: item_id.to_string(),
            item,
            snapshot,
        };
        self.cache.spawn_set(key, &detail, self.ttls.detail_ttl);
        self.observe("item_detail", started);
        Ok(detail)
    }

    /// The `days` calendar days ending at `end` (default: the item's latest snapshot).
    pub async fn time_series(
        &self,
        item_id: &str,
        days: u32,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeries> {
        validate_days(days)?;
        let started = Instant::now();
        let key = keys::time_series(item_id, days, end);
        if let Some(series) = self.cache.get::<TimeSeries>(&key).await {
            self.observe("time_series", started);
            return Ok(series);
        }

        let series = self.load_series(item_id, days, end).await?;
        self.cache.spawn_set(key, &series, self.ttls.series_ttl);
        self.observe("time_series", started);
        Ok(series)
    }

    /// Floor price and volume for the last `days` days.
    pub async fn sparkline(
        &self,
        item_id: &str,
        days: u32,
        end: Option<NaiveDate>,
    ) -> Result<Sparkline> {
        validate_days(days)?;
        let started = Instant::now();
        let key = keys::sparkline(item_id, days, end);
        if let Some(line) = self.cache.get::<Sparkline>(&key).await {
            self.observe("sparkline", started);
            return Ok(line);
        }

        let series = self.load_series(item_id, days, end).await?;
        let line = Sparkline {
            item_id: series.item_id,
            points: series
                .points
                .into_iter()
                .map(|s| SparklinePoint {
                    date: s.date,
                    floor_price: s.floor_price,
                    daily_volume: s.daily_volume,
                })
                .collect(),
        };
        self.cache.spawn_set(key, &line, self.ttls.series_ttl);
        self.observe("sparkline", started);
        Ok(line)
    }

    async fn build_page(&self, query: &LeaderboardQuery) -> Result<LeaderboardPage> {
        let (mut rows, store_ordered) = match query.date {
            Some(date) => (self.repo.snapshots_for_date(date).await?, true),
            None => (self.repo.latest_snapshots().await?, false),
        };

        // The store orders by rank, falling back to a lossy REAL cast; only
        // reuse that order when exact comparison agrees with it.
        let reuse_order = store_ordered
            && query.sort == SortField::PRIMARY
            && query.direction == SortDirection::Desc
            && is_sorted(&rows, query.sort, query.direction);
        if !reuse_order {
            sort_snapshots(&mut rows, query.sort, query.direction);
        }

        let total = rows.len();
        let window: Vec<MetricSnapshot> = rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();

        let ids: Vec<String> = window.iter().map(|s| s.item_id.clone()).collect();
        let items = self.repo.items_by_ids(&ids).await?;
        let entries = window
            .into_iter()
            .map(|snapshot| {
                let item = items.get(&snapshot.item_id);
                LeaderboardEntry {
                    name: item.map(|i| i.name.clone()),
                    category: item.and_then(|i| i.category.clone()),
                    snapshot,
                }
            })
            .collect();

        debug!(date = ?query.date, sort = %query.sort, total, "leaderboard page built from store");
        Ok(LeaderboardPage {
            date: query.date,
            sort: query.sort,
            direction: query.direction,
            limit: query.limit,
            offset: query.offset,
            total,
            entries,
        })
    }

    async fn load_series(
        &self,
        item_id: &str,
        days: u32,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeries> {
        let end = match end {
            Some(d) => d,
            None => self
                .repo
                .latest_snapshot(item_id)
                .await?
                .map(|s| s.date)
                .ok_or_else(|| not_found(item_id, None))?,
        };
        let start = lookback_start(end, days as usize);
        let points = self.repo.snapshots_in_range(item_id, start, end).await?;
        Ok(TimeSeries {
            item_id: item_id.to_string(),
            start,
            end,
            points,
        })
    }

    fn observe(&self, op: &'static str, started: Instant) {
        let elapsed = started.elapsed();
        self.latency.record(op, elapsed);
        if elapsed > self.read_budget {
            warn!(
                op,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.read_budget.as_millis() as u64,
                "read over latency budget"
            );
        }
    }
}

fn not_found(item_id: &str, date: Option<NaiveDate>) -> AppError {
    match date {
        Some(d) => AppError::NotFound(format!("no snapshot for item {item_id} on {d}")),
        None => AppError::NotFound(format!("no snapshots for item {item_id}")),
    }
}

/// Sort by `field` in `direction`; unknown values go last either way and
/// `item_id` breaks ties.
pub fn sort_snapshots(rows: &mut [MetricSnapshot], field: SortField, direction: SortDirection) {
    rows.sort_by(|a, b| compare(a, b, field, direction));
}

fn is_sorted(rows: &[MetricSnapshot], field: SortField, direction: SortDirection) -> bool {
    rows.windows(2)
        .all(|w| compare(&w[0], &w[1], field, direction) != Ordering::Greater)
}

fn compare(
    a: &MetricSnapshot,
    b: &MetricSnapshot,
    field: SortField,
    direction: SortDirection,
) -> Ordering {
    let ord = match (field.value(a), field.value(b)) {
        (Some(x), Some(y)) => match direction {
            SortDirection::Asc => x.cmp(&y),
            SortDirection::Desc => y.cmp(&x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    ord.then_with(|| a.item_id.cmp(&b.item_id))
}
