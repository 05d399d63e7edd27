pub mod aggregator;
pub mod derived;

pub use derived::DerivedMetricsEngine;
