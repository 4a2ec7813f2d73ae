use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::shift::Shift;

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Identity of a production rollup
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionKey {
    pub mining_site_id: String,
    pub shift: Shift,
    pub date: NaiveDate,
}

impl ProductionKey {
    pub fn new(mining_site_id: impl Into<String>, shift: Shift, date: NaiveDate) -> Self {
        Self {
            mining_site_id: mining_site_id.into(),
            shift,
            date,
        }
    }
}

/// Shift production rollup. Only the metrics aggregator mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionRecord {
    pub key: ProductionKey,
    pub target_production: f64,
    pub actual_production: f64,
    /// Percent of target, 2dp
    pub achievement: f64,
    pub total_trips: u32,
    pub total_distance: f64,
    pub total_fuel: f64,
    /// Minutes, running mean over completed trips
    pub avg_cycle_time: f64,
    pub trucks_operating: u32,
    pub trucks_breakdown: u32,
    pub excavators_operating: u32,
    pub excavators_breakdown: u32,
    pub utilization_rate: f64,
    pub cancelled_trips: u32,
    pub incident_count: u32,
}

impl ProductionRecord {
    pub fn new(key: ProductionKey, target_production: f64) -> Self {
        Self {
            key,
            target_production,
            actual_production: 0.0,
            achievement: 0.0,
            total_trips: 0,
            total_distance: 0.0,
            total_fuel: 0.0,
            avg_cycle_time: 0.0,
            trucks_operating: 0,
            trucks_breakdown: 0,
            excavators_operating: 0,
            excavators_breakdown: 0,
            utilization_rate: 0.0,
            cancelled_trips: 0,
            incident_count: 0,
        }
    }

    pub fn recompute_achievement(&mut self) {
        self.achievement = if self.target_production > 0.0 {
            round2(self.actual_production / self.target_production * 100.0)
        } else {
            0.0
        };
    }
}
