pub mod ranker;
pub mod scheduler;

pub use ranker::{RankedEntry, RankingEngine};
pub use scheduler::RankingScheduler;
