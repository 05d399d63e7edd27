//! Row types matching `migrations/`. Decimals come back as TEXT and are parsed
//! into domain types here, so nothing above the db layer sees raw rows.
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{AppError, Result};
use crate::types::{DerivedMetrics, Item, MetricSnapshot, RankInfo};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, sqlx::FromRow)]
pub struct ItemRow {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub supply_estimate: Option<i64>,
}

impl From<ItemRow> for Item {
    fn from(r: ItemRow) -> Self {
        Item {
            id: r.id,
            name: r.name,
            category: r.category,
            supply_estimate: r.supply_estimate,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub item_id: String,
    pub date: String,
    pub floor_price: Option<String>,
    pub active_listings_count: Option<i64>,
    pub boxes_sold_per_day: Option<String>,
    pub daily_volume: Option<String>,
    pub volume_7d_ema: Option<String>,
    pub volume_30d_sma: Option<String>,
    pub absorption_rate: Option<String>,
    pub liquidity_score: Option<String>,
    pub boxes_sold_30d_avg: Option<String>,
    pub expected_days_to_sell: Option<String>,
    pub visible_market_cap: Option<String>,
    pub current_rank: Option<i64>,
    pub previous_rank: Option<i64>,
    pub rank_change: Option<i64>,
}

impl TryFrom<SnapshotRow> for MetricSnapshot {
    type Error = AppError;

    fn try_from(r: SnapshotRow) -> Result<Self> {
        Ok(MetricSnapshot {
            date: parse_date(&r.date)?,
            floor_price: dec(r.floor_price)?,
            active_listings_count: r.active_listings_count,
            boxes_sold_per_day: dec(r.boxes_sold_per_day)?,
            daily_volume: dec(r.daily_volume)?,
            derived: DerivedMetrics {
                volume_7d_ema: dec(r.volume_7d_ema)?,
                volume_30d_sma: dec(r.volume_30d_sma)?,
                absorption_rate: dec(r.absorption_rate)?,
                liquidity_score: dec(r.liquidity_score)?,
                boxes_sold_30d_avg: dec(r.boxes_sold_30d_avg)?,
                expected_days_to_sell: dec(r.expected_days_to_sell)?,
                visible_market_cap: dec(r.visible_market_cap)?,
            },
            rank: RankInfo {
                current_rank: rank(r.current_rank)?,
                previous_rank: rank(r.previous_rank)?,
                rank_change: r.rank_change,
            },
            item_id: r.item_id,
        })
    }
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| AppError::Corrupt(format!("date {s:?}: {e}")))
}

pub fn date_key(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// Bind form of an optional decimal.
pub fn dec_text(v: Option<Decimal>) -> Option<String> {
    v.map(|d| d.to_string())
}

fn dec(v: Option<String>) -> Result<Option<Decimal>> {
    v.map(|s| Decimal::from_str(&s).map_err(|e| AppError::Corrupt(format!("decimal {s:?}: {e}"))))
        .transpose()
}

fn rank(v: Option<i64>) -> Result<Option<u32>> {
    v.map(|r| u32::try_from(r).map_err(|_| AppError::Corrupt(format!("rank {r}"))))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> SnapshotRow {
        SnapshotRow {
            item_id: "box-1".into(),
            date: "2024-03-07".into(),
            floor_price: Some("99.95".into()),
            active_listings_count: Some(4),
            boxes_sold_per_day: None,
            daily_volume: Some("1200".into()),
            volume_7d_ema: None,
            volume_30d_sma: None,
            absorption_rate: None,
            liquidity_score: None,
            boxes_sold_30d_avg: None,
            expected_days_to_sell: None,
            visible_market_cap: None,
            current_rank: Some(3),
            previous_rank: None,
            rank_change: None,
        }
    }

    #[test]
    fn row_converts_to_snapshot() {
        let s = MetricSnapshot::try_from(row()).unwrap();
        assert_eq!(s.date, NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
        assert_eq!(s.floor_price, Some(Decimal::new(9995, 2)));
        assert_eq!(s.rank.current_rank, Some(3));
        assert_eq!(s.rank.rank_change, None);
    }

    #[test]
    fn garbage_decimal_is_corrupt() {
        let mut r = row();
        r.daily_volume = Some("lots".into());
        assert!(matches!(MetricSnapshot::try_from(r), Err(AppError::Corrupt(_))));
    }
}
