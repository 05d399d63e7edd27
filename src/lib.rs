//! Derived metrics, daily ranking and cached leaderboard reads for
//! collectible market snapshots.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod leaderboard;
pub mod metrics;
pub mod ranking;
pub mod types;
