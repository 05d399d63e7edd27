use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::db::{RankUpdate, SnapshotRepository};
use crate::error::{AppError, Result};
use crate::types::{MetricSnapshot, RankInfo};

/// One ranked item for a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub item_id: String,
    pub metric: Decimal,
    pub rank: RankInfo,
}

/// Outcome of ranking a single date during a backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRankSummary {
    pub date: NaiveDate,
    pub ranked: usize,
}

/// Competition ranking over the snapshots that carry a ranking metric.
///
/// `rank(i) = 1 + #{j : metric[j] > metric[i]}`; tied values share a rank and
/// the next rank skips (1, 2, 2, 4). Within a tie, `item_id` ascending fixes
/// the order so page boundaries are stable.
pub fn assign_competition_ranks(snapshots: &[MetricSnapshot]) -> Vec<(String, Decimal, u32)> {
    let mut eligible: Vec<(&str, Decimal)> = snapshots
        .iter()
        .filter_map(|s| s.ranking_metric().map(|m| (s.item_id.as_str(), m)))
        .collect();
    eligible.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut out = Vec::with_capacity(eligible.len());
    let mut prev: Option<(Decimal, u32)> = None;
    for (idx, (item_id, metric)) in eligible.into_iter().enumerate() {
        let rank = match prev {
            Some((m, r)) if m == metric => r,
            _ => idx as u32 + 1,
        };
        prev = Some((metric, rank));
        out.push((item_id.to_string(), metric, rank));
    }
    out
}

/// `previous - current`; positive means the item climbed toward rank 1.
/// Unknown when the item was unranked the day before.
pub fn rank_change(previous: Option<u32>, current: u32) -> Option<i64> {
    previous.map(|p| i64::from(p) - i64::from(current))
}

/// Computes and persists the daily ranking.
pub struct RankingEngine {
    repo: Arc<dyn SnapshotRepository>,
}

impl RankingEngine {
    pub fn new(repo: Arc<dyn SnapshotRepository>) -> Self {
        Self { repo }
    }

    /// Rank every snapshot on `date` and persist the result.
    ///
    /// Reads the ranks already persisted for `date - 1`, so historical dates
    /// must be processed in ascending order (see `backfill_ranks`). A date with
    /// no snapshots yields an empty ranking and writes nothing.
    pub async fn recompute_ranks(&self, date: NaiveDate) -> Result<Vec<RankedEntry>> {
        let snapshots = self.repo.snapshots_for_date(date).await?;
        if snapshots.is_empty() {
            info!(%date, "no snapshots to rank");
            return Ok(Vec::new());
        }

        let previous = match date.pred_opt() {
            Some(prev_date) => self.previous_ranks(prev_date).await?,
            None => HashMap::new(),
        };

        let entries: Vec<RankedEntry> = assign_competition_ranks(&snapshots)
            .into_iter()
            .map(|(item_id, metric, current)| {
                let previous_rank = previous.get(&item_id).copied();
                RankedEntry {
                    rank: RankInfo {
                        current_rank: Some(current),
                        previous_rank,
                        rank_change: rank_change(previous_rank, current),
                    },
                    item_id,
                    metric,
                }
            })
            .collect();

        let updates: Vec<RankUpdate> = entries
            .iter()
            .map(|e| RankUpdate {
                item_id: e.item_id.clone(),
                rank: e.rank,
            })
            .collect();
        self.repo.update_ranks(date, &updates).await?;

        info!(
            %date,
            ranked = entries.len(),
            unranked = snapshots.len() - entries.len(),
            "ranking persisted"
        );
        Ok(entries)
    }

    /// Rank every date in `[start, end]`, one at a time, oldest first.
    /// Each date waits for the previous one to be persisted.
    pub async fn backfill_ranks(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DateRankSummary>> {
        if start > end {
            return Err(AppError::InvalidRequest(format!(
                "backfill start {start} is after end {end}"
            )));
        }

        let mut summaries = Vec::new();
        for date in start.iter_days().take_while(|d| *d <= end) {
            let ranked = self.recompute_ranks(date).await?.len();
            summaries.push(DateRankSummary { date, ranked });
        }
        info!(%start, %end, days = summaries.len(), "rank backfill complete");
        Ok(summaries)
    }

    async fn previous_ranks(&self, date: NaiveDate) -> Result<HashMap<String, u32>> {
        Ok(self
            .repo
            .snapshots_for_date(date)
            .await?
            .into_iter()
            .filter_map(|s| s.rank.current_rank.map(|r| (s.item_id, r)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_repo;
    use crate::types::DerivedMetrics;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn with_metric(id: &str, metric: Option<Decimal>) -> MetricSnapshot {
        let mut s = MetricSnapshot::raw(id, day(1));
        s.derived.volume_7d_ema = metric;
        s
    }

    async fn seed(repo: &Arc<dyn SnapshotRepository>, date: NaiveDate, rows: &[(&str, i64)]) {
        for (id, ema) in rows {
            repo.upsert_snapshot(&MetricSnapshot::raw(*id, date)).await.unwrap();
            let derived = DerivedMetrics {
                volume_7d_ema: Some(Decimal::from(*ema)),
                ..Default::default()
            };
            repo.update_derived(id, date, &derived).await.unwrap();
        }
    }

    #[test]
    fn ties_share_rank_and_next_rank_skips() {
        let snaps: Vec<_> = [("a", 10000), ("b", 9000), ("c", 9000), ("d", 8000), ("e", 7000)]
            .iter()
            .map(|(id, v)| with_metric(id, Some(Decimal::from(*v))))
            .collect();
        let ranks: Vec<u32> = assign_competition_ranks(&snaps).into_iter().map(|r| r.2).collect();
        assert_eq!(ranks, [1, 2, 2, 4, 5]);
    }

    #[test]
    fn rank_is_one_plus_count_of_strictly_greater() {
        let values = [5, 3, 5, 1, 3, 3, 9];
        let snaps: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| with_metric(&format!("i{i}"), Some(Decimal::from(*v))))
            .collect();
        for (id, metric, rank) in assign_competition_ranks(&snaps) {
            let greater = snaps.iter().filter(|s| s.ranking_metric().unwrap() > metric).count();
            assert_eq!(rank as usize, greater + 1, "item {id}");
        }
    }

    #[test]
    fn tie_order_falls_back_to_item_id() {
        let snaps = vec![
            with_metric("zeta", Some(dec!(5))),
            with_metric("alpha", Some(dec!(5))),
            with_metric("none", None),
        ];
        let ranked = assign_competition_ranks(&snaps);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, "alpha");
        assert_eq!(ranked[1].0, "zeta");
    }

    #[test]
    fn rank_change_sign_convention() {
        assert_eq!(rank_change(Some(1), 2), Some(-1));
        assert_eq!(rank_change(Some(2), 1), Some(1));
        assert_eq!(rank_change(Some(3), 3), Some(0));
        assert_eq!(rank_change(None, 3), None);
    }

    #[tokio::test]
    async fn deltas_against_previous_day() {
        let repo = memory_repo().await;
        seed(&repo, day(1), &[("A", 300), ("B", 200), ("C", 100)]).await;
        seed(&repo, day(2), &[("A", 200), ("B", 300), ("C", 100), ("D", 50)]).await;
        let engine = RankingEngine::new(repo.clone());

        engine.recompute_ranks(day(1)).await.unwrap();
        let entries = engine.recompute_ranks(day(2)).await.unwrap();
        let by_id: HashMap<_, _> = entries.iter().map(|e| (e.item_id.as_str(), e.rank)).collect();

        assert_eq!(by_id["A"].rank_change, Some(-1));
        assert_eq!(by_id["B"].rank_change, Some(1));
        assert_eq!(by_id["C"].rank_change, Some(0));
        assert_eq!(by_id["D"].previous_rank, None);
        assert_eq!(by_id["D"].rank_change, None);

        let stored = repo.get_snapshot("B", day(2)).await.unwrap().unwrap();
        assert_eq!(stored.rank.current_rank, Some(1));
        assert_eq!(stored.rank.previous_rank, Some(2));
    }

    #[tokio::test]
    async fn empty_date_is_not_an_error() {
        let repo = memory_repo().await;
        let engine = RankingEngine::new(repo);
        assert!(engine.recompute_ranks(day(9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn backfill_runs_oldest_first() {
        let repo = memory_repo().await;
        seed(&repo, day(1), &[("A", 10), ("B", 20)]).await;
        seed(&repo, day(2), &[("A", 30), ("B", 20)]).await;
        seed(&repo, day(3), &[("A", 30), ("B", 40)]).await;
        let engine = RankingEngine::new(repo.clone());

        let summary = engine.backfill_ranks(day(1), day(4)).await.unwrap();
        let dates: Vec<_> = summary.iter().map(|s| s.date).collect();
        assert_eq!(dates, [day(1), day(2), day(3), day(4)]);
        assert_eq!(summary[3].ranked, 0);

        // Day 3's delta is only right if day 2 was already persisted.
        let a3 = repo.get_snapshot("A", day(3)).await.unwrap().unwrap();
        assert_eq!(a3.rank.previous_rank, Some(1));
        assert_eq!(a3.rank.rank_change, Some(-1));
        let b1 = repo.get_snapshot("B", day(1)).await.unwrap().unwrap();
        assert_eq!(b1.rank.rank_change, None);
    }

    #[tokio::test]
    async fn backfill_rejects_inverted_range() {
        let engine = RankingEngine::new(memory_repo().await);
        let err = engine.backfill_ranks(day(5), day(1)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
