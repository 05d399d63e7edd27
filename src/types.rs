use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// Static identity of a collectible. Owned by ingestion/admin; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub supply_estimate: Option<i64>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Indicators computed from an item's history. `None` means "unknown", never zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub volume_7d_ema: Option<Decimal>,
    pub volume_30d_sma: Option<Decimal>,
    pub absorption_rate: Option<Decimal>,
    pub liquidity_score: Option<Decimal>,
    pub boxes_sold_30d_avg: Option<Decimal>,
    pub expected_days_to_sell: Option<Decimal>,
    pub visible_market_cap: Option<Decimal>,
}

/// Per-date ranking outcome.
///
/// `rank_change = previous_rank - current_rank`: positive means the item moved
/// toward rank 1. It is `None` when the item had no rank on the preceding day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankInfo {
    pub current_rank: Option<u32>,
    pub previous_rank: Option<u32>,
    pub rank_change: Option<i64>,
}

/// One row per (item_id, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub item_id: String,
    pub date: NaiveDate,
    pub floor_price: Option<Decimal>,
    pub active_listings_count: Option<i64>,
    pub boxes_sold_per_day: Option<Decimal>,
    pub daily_volume: Option<Decimal>,
    pub derived: DerivedMetrics,
    pub rank: RankInfo,
}

impl MetricSnapshot {
    /// A snapshot carrying only raw inputs, as ingestion creates it.
    pub fn raw(item_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            item_id: item_id.into(),
            date,
            floor_price: None,
            active_listings_count: None,
            boxes_sold_per_day: None,
            daily_volume: None,
            derived: DerivedMetrics::default(),
            rank: RankInfo::default(),
        }
    }

    /// The metric the daily ranking is computed on.
    pub fn ranking_metric(&self) -> Option<Decimal> {
        self.derived.volume_7d_ema
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Primary ranking metric.
    Volume7dEma,
    FloorPrice,
    DailyVolume,
    LiquidityScore,
    AbsorptionRate,
    VisibleMarketCap,
    ExpectedDaysToSell,
    CurrentRank,
    RankChange,
}

impl SortField {
    pub const PRIMARY: SortField = SortField::Volume7dEma;

    /// Sort key for a snapshot; `None` sorts last in either direction.
    pub fn value(&self, s: &MetricSnapshot) -> Option<Decimal> {
        match self {
            SortField::Volume7dEma => s.derived.volume_7d_ema,
            SortField::FloorPrice => s.floor_price,
            SortField::DailyVolume => s.daily_volume,
            SortField::LiquidityScore => s.derived.liquidity_score,
            SortField::AbsorptionRate => s.derived.absorption_rate,
            SortField::VisibleMarketCap => s.derived.visible_market_cap,
            SortField::ExpectedDaysToSell => s.derived.expected_days_to_sell,
            SortField::CurrentRank => s.rank.current_rank.map(Decimal::from),
            SortField::RankChange => s.rank.rank_change.map(Decimal::from),
        }
    }
}

impl std::fmt::Display for SortField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SortField::Volume7dEma => "volume_7d_ema",
            SortField::FloorPrice => "floor_price",
            SortField::DailyVolume => "daily_volume",
            SortField::LiquidityScore => "liquidity_score",
            SortField::AbsorptionRate => "absorption_rate",
            SortField::VisibleMarketCap => "visible_market_cap",
            SortField::ExpectedDaysToSell => "expected_days_to_sell",
            SortField::CurrentRank => "current_rank",
            SortField::RankChange => "rank_change",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SortField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "volume_7d_ema" => Ok(SortField::Volume7dEma),
            "floor_price" => Ok(SortField::FloorPrice),
            "daily_volume" => Ok(SortField::DailyVolume),
            "liquidity_score" => Ok(SortField::LiquidityScore),
            "absorption_rate" => Ok(SortField::AbsorptionRate),
            "visible_market_cap" => Ok(SortField::VisibleMarketCap),
            "expected_days_to_sell" => Ok(SortField::ExpectedDaysToSell),
            "current_rank" => Ok(SortField::CurrentRank),
            "rank_change" => Ok(SortField::RankChange),
            other => Err(AppError::InvalidRequest(format!("unknown sort field: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(AppError::InvalidRequest(format!("unknown sort direction: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_field_round_trips_through_display() {
        for f in [
            SortField::Volume7dEma,
            SortField::FloorPrice,
            SortField::DailyVolume,
            SortField::LiquidityScore,
            SortField::AbsorptionRate,
            SortField::VisibleMarketCap,
            SortField::ExpectedDaysToSell,
            SortField::CurrentRank,
            SortField::RankChange,
        ] {
            assert_eq!(f.to_string().parse::<SortField>().unwrap(), f);
        }
    }

    #[test]
    fn unknown_sort_field_is_invalid_request() {
        let err = "price_per_gram".parse::<SortField>().unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert!(matches!("sideways".parse::<SortDirection>(), Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn decimals_and_dates_serialize_as_strings() {
        let mut s = MetricSnapshot::raw("box-1", NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        s.floor_price = Some(Decimal::new(12345, 2));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["date"], "2024-05-02");
        assert_eq!(json["floor_price"], "123.45");
        assert!(json["derived"]["volume_7d_ema"].is_null());

        let back: MetricSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }
}
