//! # Metrics
//!
//! Exactly-once production rollups and read-side statistics.

pub mod aggregator;
pub mod statistics;

pub use aggregator::MetricsAggregator;
pub use statistics::{HaulStatistics, ProductionAchievement};
