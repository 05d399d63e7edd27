pub mod service;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{CACHEABLE_PAGE_SIZES, MAX_PAGE_SIZE, MAX_SERIES_DAYS};
use crate::error::{AppError, Result};
use crate::types::{Item, MetricSnapshot, SortDirection, SortField};

pub use service::LeaderboardService;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_SERIES_DAYS: u32 = 30;
pub const DEFAULT_SPARKLINE_DAYS: u32 = 7;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Untrusted leaderboard parameters as they arrive from a caller.
#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardParams {
    pub date: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A validated leaderboard request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardQuery {
    pub date: Option<NaiveDate>,
    pub sort: SortField,
    pub direction: SortDirection,
    pub limit: u32,
    pub offset: u32,
}

impl Default for LeaderboardQuery {
    fn default() -> Self {
        Self {
            date: None,
            sort: SortField::PRIMARY,
            direction: SortDirection::Desc,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl LeaderboardQuery {
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > MAX_PAGE_SIZE {
            return Err(AppError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.limit
            )));
        }
        Ok(())
    }

    /// Only the dominant shape is cached: primary metric, descending, first
    /// page, one of the standard page sizes.
    pub fn is_cacheable(&self) -> bool {
        self.sort == SortField::PRIMARY
            && self.direction == SortDirection::Desc
            && self.offset == 0
            && CACHEABLE_PAGE_SIZES.contains(&self.limit)
    }
}

impl TryFrom<LeaderboardParams> for LeaderboardQuery {
    type Error = AppError;

    fn try_from(p: LeaderboardParams) -> Result<Self> {
        let defaults = LeaderboardQuery::default();
        let limit = match p.limit {
            Some(l) => u32::try_from(l)
                .map_err(|_| AppError::InvalidRequest(format!("limit out of range: {l}")))?,
            None => defaults.limit,
        };
        let offset = match p.offset {
            Some(o) => u32::try_from(o)
                .map_err(|_| AppError::InvalidRequest(format!("offset must be >= 0, got {o}")))?,
            None => 0,
        };
        let q = LeaderboardQuery {
            date: p.date.as_deref().map(parse_date).transpose()?,
            sort: p
                .sort
                .as_deref()
                .map(str::parse::<SortField>)
                .transpose()?
                .unwrap_or(defaults.sort),
            direction: p
                .direction
                .as_deref()
                .map(str::parse::<SortDirection>)
                .transpose()?
                .unwrap_or(defaults.direction),
            limit,
            offset,
        };
        q.validate()?;
        Ok(q)
    }
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidRequest(format!("invalid date {s:?}, expected YYYY-MM-DD")))
}

pub fn validate_days(days: u32) -> Result<()> {
    if days == 0 || days > MAX_SERIES_DAYS {
        return Err(AppError::InvalidRequest(format!(
            "days must be between 1 and {MAX_SERIES_DAYS}, got {days}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Responses (also the cache payloads)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: Option<String>,
    pub category: Option<String>,
    pub snapshot: MetricSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardPage {
    /// `None` when each item shows its own latest snapshot.
    pub date: Option<NaiveDate>,
    pub sort: SortField,
    pub direction: SortDirection,
    pub limit: u32,
    pub offset: u32,
    /// Rows across all pages.
    pub total: usize,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub item_id: String,
    pub item: Option<Item>,
    pub snapshot: MetricSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub item_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Ascending by date; days without a snapshot are absent.
    pub points: Vec<MetricSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparklinePoint {
    pub date: NaiveDate,
    pub floor_price: Option<Decimal>,
    pub daily_volume: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sparkline {
    pub item_id: String,
    pub points: Vec<SparklinePoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_to_primary_desc() {
        let q = LeaderboardQuery::try_from(LeaderboardParams::default()).unwrap();
        assert_eq!(q, LeaderboardQuery::default());
        assert!(q.is_cacheable());
    }

    fn params(edit: impl FnOnce(&mut LeaderboardParams)) -> LeaderboardParams {
        let mut p = LeaderboardParams::default();
        edit(&mut p);
        p
    }

    #[test]
    fn malformed_params_are_rejected() {
        let bad = [
            params(|p| p.limit = Some(0)),
            params(|p| p.limit = Some(101)),
            params(|p| p.offset = Some(-1)),
            params(|p| p.sort = Some("vibes".into())),
            params(|p| p.direction = Some("up".into())),
            params(|p| p.date = Some("03/01/2024".into())),
        ];
        for p in bad {
            assert!(matches!(
                LeaderboardQuery::try_from(p),
                Err(AppError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn cache_eligibility_is_narrow() {
        let base = LeaderboardQuery {
            limit: 10,
            ..Default::default()
        };
        assert!(base.is_cacheable());

        let cacheable_after = |edit: fn(&mut LeaderboardQuery)| {
            let mut q = base.clone();
            edit(&mut q);
            q.is_cacheable()
        };
        assert!(cacheable_after(|q| q.limit = 50));
        assert!(!cacheable_after(|q| q.limit = 25));
        assert!(!cacheable_after(|q| q.offset = 10));
        assert!(!cacheable_after(|q| q.direction = SortDirection::Asc));
        assert!(!cacheable_after(|q| q.sort = SortField::FloorPrice));
    }

    #[test]
    fn series_days_bounds() {
        assert!(validate_days(1).is_ok());
        assert!(validate_days(365).is_ok());
        assert!(validate_days(0).is_err());
        assert!(validate_days(366).is_err());
    }
}
