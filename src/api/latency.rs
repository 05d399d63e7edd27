//! In-memory latency histograms for read operations.
//! The serving layer records one sample per call; the API reads percentiles.

use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

/// Percentiles for one operation, in microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpLatency {
    pub op: &'static str,
    pub samples: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

/// Shared latency stats keyed by operation name. Values stored in microseconds.
#[derive(Default)]
pub struct LatencyStats {
    ops: DashMap<&'static str, hdrhistogram::Histogram<u64>>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a latency sample for `op`. Tracks 1us to 100s, 3 significant figures.
    pub fn record(&self, op: &'static str, d: Duration) {
        let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
        let mut entry = match self.ops.entry(op) {
            dashmap::mapref::entry::Entry::Occupied(e) => e.into_ref(),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let Ok(h) = hdrhistogram::Histogram::new_with_bounds(1, 100_000_000, 3) else {
                    return;
                };
                v.insert(h)
            }
        };
        let _ = entry.saturating_record(us.max(1));
    }

    /// Percentiles per operation, sorted by name. Operations with no samples are omitted.
    pub fn snapshot(&self) -> Vec<OpLatency> {
        let mut out: Vec<OpLatency> = self
            .ops
            .iter()
            .filter(|e| e.value().len() > 0)
            .map(|e| {
                let h = e.value();
                OpLatency {
                    op: *e.key(),
                    samples: h.len(),
                    p50_us: h.value_at_quantile(0.5),
                    p95_us: h.value_at_quantile(0.95),
                    p99_us: h.value_at_quantile(0.99),
                }
            })
            .collect();
        out.sort_by_key(|o| o.op);
        out
    }

    /// Sample count for `op`.
    pub fn samples(&self, op: &str) -> u64 {
        self.ops.get(op).map(|h| h.len()).unwrap_or(0)
    }
}
