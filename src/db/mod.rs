pub mod models;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{DerivedMetrics, Item, MetricSnapshot, RankInfo};

pub use sqlite::SqliteRepository;

/// Ranking outcome for one item on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankUpdate {
    pub item_id: String,
    pub rank: RankInfo,
}

/// The authoritative snapshot store. Hands out owned values only.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn upsert_item(&self, item: &Item) -> Result<()>;

    async fn get_item(&self, item_id: &str) -> Result<Option<Item>>;

    async fn items_by_ids(&self, ids: &[String]) -> Result<HashMap<String, Item>>;

    /// Insert or update the raw inputs of `(item_id, date)`. Derived and
    /// ranking fields of an existing row are left untouched.
    async fn upsert_snapshot(&self, snapshot: &MetricSnapshot) -> Result<()>;

    async fn get_snapshot(&self, item_id: &str, date: NaiveDate) -> Result<Option<MetricSnapshot>>;

    async fn latest_snapshot(&self, item_id: &str) -> Result<Option<MetricSnapshot>>;

    /// Inclusive range, ascending by date.
    async fn snapshots_in_range(
        &self,
        item_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MetricSnapshot>>;

    /// Every snapshot on `date`, ordered by persisted rank (nulls last), then
    /// the ranking metric descending (nulls last), then `item_id` ascending.
    async fn snapshots_for_date(&self, date: NaiveDate) -> Result<Vec<MetricSnapshot>>;

    /// Each item's most recent snapshot, in the same order as `snapshots_for_date`.
    async fn latest_snapshots(&self) -> Result<Vec<MetricSnapshot>>;

    async fn item_ids_for_date(&self, date: NaiveDate) -> Result<Vec<String>>;

    async fn update_derived(
        &self,
        item_id: &str,
        date: NaiveDate,
        derived: &DerivedMetrics,
    ) -> Result<()>;

    /// Replace the ranking fields of every row on `date` in one transaction.
    /// Rows not named in `updates` have their ranking fields cleared.
    async fn update_ranks(&self, date: NaiveDate, updates: &[RankUpdate]) -> Result<()>;
}
