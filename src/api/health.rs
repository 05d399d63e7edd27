//! Shared health state for the /health endpoint.
//! Updated by the ranking scheduler, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared health metrics.
#[derive(Default)]
pub struct HealthState {
    /// Nanosecond timestamp of the last completed ranking run (0 = none yet).
    pub last_ranking_at_ns: AtomicU64,
    /// Items ranked by that run.
    pub last_ranked_count: AtomicU64,
    /// Completed scheduled runs since startup.
    pub ranking_runs: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ranking_run(&self, at_ns: u64, ranked: u64) {
        self.last_ranking_at_ns.store(at_ns, Ordering::Relaxed);
        self.last_ranked_count.store(ranked, Ordering::Relaxed);
        self.ranking_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_ranking_at_ns(&self) -> u64 {
        self.last_ranking_at_ns.load(Ordering::Relaxed)
    }

    pub fn last_ranked_count(&self) -> u64 {
        self.last_ranked_count.load(Ordering::Relaxed)
    }

    pub fn ranking_runs(&self) -> u64 {
        self.ranking_runs.load(Ordering::Relaxed)
    }
}
