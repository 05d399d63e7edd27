use std::sync::Arc;

use chrono::{Days, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info, warn};

use crate::config::{clamps, liquidity_weights, MetricsConfig};
use crate::db::SnapshotRepository;
use crate::error::{AppError, Result};
use crate::metrics::aggregator;
use crate::types::{DerivedMetrics, MetricSnapshot};

/// Decimal places kept on persisted values.
const MONEY_DP: u32 = 2;
const RATIO_DP: u32 = 4;

/// Recomputes the derived indicators of a snapshot from the item's own history.
pub struct DerivedMetricsEngine {
    repo: Arc<dyn SnapshotRepository>,
    cfg: MetricsConfig,
}

impl DerivedMetricsEngine {
    pub fn new(repo: Arc<dyn SnapshotRepository>, cfg: MetricsConfig) -> Self {
        Self { repo, cfg }
    }

    /// Recompute and persist every derived field for `(item_id, date)`.
    ///
    /// Fails with `NoBaseSnapshot` when the row itself is missing. Short
    /// history is not an error; the affected fields are simply `None`.
    pub async fn update_all(&self, item_id: &str, date: NaiveDate) -> Result<DerivedMetrics> {
        let Some(base) = self.repo.get_snapshot(item_id, date).await? else {
            return Err(AppError::NoBaseSnapshot {
                item_id: item_id.to_string(),
                date,
            });
        };

        let start = lookback_start(date, self.cfg.sma_window);
        let history = self.repo.snapshots_in_range(item_id, start, date).await?;
        let derived = compute(&self.cfg, &base, &history);

        self.repo.update_derived(item_id, date, &derived).await?;
        debug!(
            item_id,
            %date,
            history = history.len(),
            ema = ?derived.volume_7d_ema,
            "derived metrics updated"
        );
        Ok(derived)
    }

    /// Run `update_all` for every item that has a snapshot on `date`.
    /// Returns the number of items updated; per-item failures are logged and skipped.
    pub async fn update_date(&self, date: NaiveDate) -> Result<usize> {
        let item_ids = self.repo.item_ids_for_date(date).await?;
        let mut updated = 0;
        for item_id in &item_ids {
            match self.update_all(item_id, date).await {
                Ok(_) => updated += 1,
                Err(e) => warn!(item_id = %item_id, %date, "derived metrics failed: {e}"),
            }
        }
        info!(%date, updated, total = item_ids.len(), "derived metrics pass complete");
        Ok(updated)
    }
}

/// First date of the inclusive lookback window ending at `date`.
pub fn lookback_start(date: NaiveDate, window_days: usize) -> NaiveDate {
    let back = window_days.saturating_sub(1) as u64;
    date.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN)
}

/// Pure derivation of every indicator for `base` given its history.
///
/// `history` must be the item's snapshots inside the lookback window in
/// ascending date order (it normally includes `base` itself). Nulls in the
/// history are skipped, never read as zero.
pub fn compute(
    cfg: &MetricsConfig,
    base: &MetricSnapshot,
    history: &[MetricSnapshot],
) -> DerivedMetrics {
    let volumes: Vec<Decimal> = history.iter().filter_map(|s| s.daily_volume).collect();
    let boxes_sold: Vec<Decimal> = history.iter().filter_map(|s| s.boxes_sold_per_day).collect();

    let ema_input = &volumes[volumes.len().saturating_sub(cfg.ema_lookback_values)..];
    let volume_7d_ema = aggregator::ema(ema_input, cfg.ema_window);
    let volume_30d_sma = aggregator::sma(&volumes, cfg.sma_window);
    let boxes_sold_30d_avg = aggregator::mean(&boxes_sold);

    let listings = base.active_listings_count.map(Decimal::from);
    let absorption_rate = absorption_rate(base.boxes_sold_per_day, listings);
    let liquidity_score = liquidity_score(cfg, absorption_rate, listings, volume_7d_ema);
    let expected_days_to_sell = expected_days_to_sell(listings, boxes_sold_30d_avg);
    let visible_market_cap = match (base.floor_price, listings) {
        (Some(price), Some(count)) => price.checked_mul(count),
        _ => None,
    };

    DerivedMetrics {
        volume_7d_ema: volume_7d_ema.map(|v| round(v, MONEY_DP)),
        volume_30d_sma: volume_30d_sma.map(|v| round(v, MONEY_DP)),
        absorption_rate: absorption_rate.map(|v| round(v, RATIO_DP)),
        liquidity_score: liquidity_score.map(|v| round(v, RATIO_DP)),
        boxes_sold_30d_avg: boxes_sold_30d_avg.map(|v| round(v, MONEY_DP)),
        expected_days_to_sell: expected_days_to_sell.map(|v| round(v, MONEY_DP)),
        visible_market_cap: visible_market_cap.map(|v| round(v, MONEY_DP)),
    }
}

/// Share of listed supply sold per day, in [0, 1].
fn absorption_rate(sold_per_day: Option<Decimal>, listings: Option<Decimal>) -> Option<Decimal> {
    let sold = sold_per_day.filter(|v| *v > Decimal::ZERO)?;
    let listings = listings.filter(|v| *v > Decimal::ZERO)?;
    let rate = sold.checked_div(listings)?;
    Some(rate.clamp(clamps::ABSORPTION_MIN, clamps::ABSORPTION_MAX))
}

fn liquidity_score(
    cfg: &MetricsConfig,
    absorption: Option<Decimal>,
    listings: Option<Decimal>,
    volume_ema: Option<Decimal>,
) -> Option<Decimal> {
    let absorption = absorption?;
    let depth = listings?.checked_div(cfg.max_expected_listings)?.min(Decimal::ONE);
    let velocity = volume_ema?.checked_div(cfg.max_volume_norm)?.min(Decimal::ONE);

    let score = liquidity_weights::ABSORPTION * absorption
        + liquidity_weights::DEPTH * depth
        + liquidity_weights::VELOCITY * velocity;
    Some(score.clamp(clamps::LIQUIDITY_MIN, clamps::LIQUIDITY_MAX))
}

fn expected_days_to_sell(listings: Option<Decimal>, avg_sold: Option<Decimal>) -> Option<Decimal> {
    let listings = listings.filter(|v| *v > Decimal::ZERO)?;
    let avg_sold = avg_sold.filter(|v| *v > Decimal::ZERO)?;
    let days = listings.checked_div(avg_sold)?;
    Some(days.clamp(clamps::DAYS_TO_SELL_MIN, clamps::DAYS_TO_SELL_MAX))
}

fn round(v: Decimal, dp: u32) -> Decimal {
    v.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}
