use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{NaiveDate, Utc};
use tracing::{error, info};

use crate::api::health::HealthState;
use crate::error::Result;
use crate::metrics::DerivedMetricsEngine;
use crate::ranking::RankingEngine;

/// Background task that refreshes today's derived metrics and ranking.
/// Live runs only touch the current UTC date; historical dates go through
/// `RankingEngine::backfill_ranks`.
pub struct RankingScheduler {
    derived: Arc<DerivedMetricsEngine>,
    ranking: Arc<RankingEngine>,
    health: Arc<HealthState>,
    interval: Duration,
}

impl RankingScheduler {
    pub fn new(
        derived: Arc<DerivedMetricsEngine>,
        ranking: Arc<RankingEngine>,
        health: Arc<HealthState>,
        interval: Duration,
    ) -> Self {
        Self {
            derived,
            ranking,
            health,
            interval,
        }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;
            let today = Utc::now().date_naive();
            if let Err(e) = self.run_once(today).await {
                error!("Ranking run error for {today}: {e}");
            }
        }
    }

    /// Derived metrics first, then ranks: the ranking reads the freshly written EMA.
    pub async fn run_once(&self, date: NaiveDate) -> Result<usize> {
        let updated = self.derived.update_date(date).await?;
        let ranked = self.ranking.recompute_ranks(date).await?.len();

        self.health.record_ranking_run(now_ns(), ranked as u64);
        info!(%date, updated, ranked, "scheduled ranking run complete");
        Ok(ranked)
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricsConfig;
    use crate::db::test_support::memory_repo;
    use crate::db::SnapshotRepository;
    use crate::types::MetricSnapshot;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn run_once_derives_then_ranks() {
        let repo = memory_repo().await;
        let end = NaiveDate::from_ymd_opt(2024, 7, 7).unwrap();
        for (id, base) in [("low", 10), ("high", 1000)] {
            for offset in 0..7u64 {
                let date = end - chrono::Days::new(offset);
                let mut s = MetricSnapshot::raw(id, date);
                s.daily_volume = Some(Decimal::from(base));
                repo.upsert_snapshot(&s).await.unwrap();
            }
        }

        let health = Arc::new(HealthState::new());
        let scheduler = RankingScheduler::new(
            Arc::new(DerivedMetricsEngine::new(repo.clone(), MetricsConfig::default())),
            Arc::new(RankingEngine::new(repo.clone())),
            health.clone(),
            Duration::from_secs(60),
        );

        assert_eq!(scheduler.run_once(end).await.unwrap(), 2);
        assert_eq!(health.last_ranked_count(), 2);
        assert!(health.last_ranking_at_ns() > 0);

        let high = repo.get_snapshot("high", end).await.unwrap().unwrap();
        assert_eq!(high.rank.current_rank, Some(1));
        assert_eq!(high.derived.volume_7d_ema, Some(Decimal::from(1000)));
    }
}
