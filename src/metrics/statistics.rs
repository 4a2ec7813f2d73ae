//! Read-side rollups over sealed activities.

use serde::{Deserialize, Serialize};

use crate::models::{round2, ActivityStatus, HaulingActivity};

/// Totals and averages for a filtered set of activities. Averages and sums
/// cover completed activities; rates are over everything matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaulStatistics {
    pub total_activities: usize,
    pub completed_activities: usize,
    pub cancelled_activities: usize,
    pub delayed_activities: usize,
    pub completion_rate: f64,
    pub delay_rate: f64,
    pub avg_cycle_time: f64,
    pub avg_load_weight: f64,
    pub avg_load_efficiency: f64,
    pub avg_delay_minutes: f64,
    pub total_load_weight: f64,
    pub total_distance: f64,
    pub total_fuel_consumed: f64,
}

impl HaulStatistics {
    pub fn from_activities(activities: &[HaulingActivity]) -> Self {
        let total = activities.len();
        let completed: Vec<&HaulingActivity> = activities
            .iter()
            .filter(|a| a.status == ActivityStatus::Completed)
            .collect();
        let cancelled = activities
            .iter()
            .filter(|a| a.status == ActivityStatus::Cancelled)
            .count();
        let delayed = activities.iter().filter(|a| a.is_delayed).count();

        let mean = |values: Vec<f64>| -> f64 {
            if values.is_empty() {
                0.0
            } else {
                round2(values.iter().sum::<f64>() / values.len() as f64)
            }
        };

        Self {
            total_activities: total,
            completed_activities: completed.len(),
            cancelled_activities: cancelled,
            delayed_activities: delayed,
            completion_rate: percent(completed.len(), total),
            delay_rate: percent(delayed, total),
            avg_cycle_time: mean(
                completed
                    .iter()
                    .filter_map(|a| a.total_cycle_time)
                    .map(|m| m as f64)
                    .collect(),
            ),
            avg_load_weight: mean(completed.iter().map(|a| a.load_weight).collect()),
            avg_load_efficiency: mean(completed.iter().map(|a| a.load_efficiency).collect()),
            avg_delay_minutes: mean(completed.iter().map(|a| a.delay_minutes as f64).collect()),
            total_load_weight: round2(completed.iter().map(|a| a.load_weight).sum()),
            total_distance: round2(completed.iter().map(|a| a.distance).sum()),
            total_fuel_consumed: round2(completed.iter().map(|a| a.fuel_consumed).sum()),
        }
    }
}

/// Share of activities that completed at or above their target weight
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionAchievement {
    /// Percent, capped at 100
    pub achievement: f64,
    pub completed_count: usize,
    pub total_count: usize,
    pub total_load_weight: f64,
    pub total_target_weight: f64,
    pub load_weight_progress: f64,
}

impl ProductionAchievement {
    pub fn from_activities(activities: &[HaulingActivity]) -> Self {
        if activities.is_empty() {
            return Self::default();
        }

        let achieved = activities
            .iter()
            .filter(|a| a.status == ActivityStatus::Completed && a.load_weight >= a.target_weight)
            .count();
        let total_load: f64 = activities.iter().map(|a| a.load_weight).sum();
        let total_target: f64 = activities.iter().map(|a| a.target_weight).sum();

        let progress = if total_target > 0.0 {
            round2(total_load / total_target * 100.0)
        } else {
            0.0
        };

        Self {
            achievement: percent(achieved, activities.len()).min(100.0),
            completed_count: achieved,
            total_count: activities.len(),
            total_load_weight: round2(total_load),
            total_target_weight: round2(total_target),
            load_weight_progress: progress,
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}
