//! # Metrics Aggregator
//!
//! Folds sealed cycles into shift production records exactly once. Each
//! activity id is accepted a single time; replays are refused before any
//! state is touched. A fold interrupted by a repository failure resumes from
//! the last write that succeeded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::statistics::{HaulStatistics, ProductionAchievement};
use crate::config::ProductionConfig;
use crate::error::{HaulError, Result};
use crate::models::{round2, HaulingActivity, ProductionKey, ProductionRecord};
use crate::registry::EquipmentRegistry;
use crate::repository::{ActivityFilter, HaulRepository};
use crate::state_machine::SealedCycle;

pub struct MetricsAggregator {
    repository: Arc<dyn HaulRepository>,
    registry: Arc<EquipmentRegistry>,
    config: ProductionConfig,
    /// Held for the whole fold so concurrent cycles serialize on the record
    state: Mutex<FoldState>,
}

#[derive(Debug, Default)]
struct FoldState {
    processed: HashSet<Uuid>,
    partial: HashMap<Uuid, FoldProgress>,
}

/// Writes already made for a fold that failed part way
#[derive(Debug, Default, Clone, Copy)]
struct FoldProgress {
    activity_stored: bool,
    logs_written: usize,
}

impl std::fmt::Debug for MetricsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsAggregator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MetricsAggregator {
    pub fn new(
        repository: Arc<dyn HaulRepository>,
        registry: Arc<EquipmentRegistry>,
        config: ProductionConfig,
    ) -> Self {
        Self {
            repository,
            registry,
            config,
            state: Mutex::new(FoldState::default()),
        }
    }

    /// Fold one sealed cycle into its production record and persist the
    /// activity with every status change it induced.
    #[instrument(skip(self, sealed), fields(activity_id = %sealed.activity.id, truck_id = %sealed.activity.truck_id))]
    pub async fn process(&self, sealed: &SealedCycle) -> Result<ProductionRecord> {
        let activity = &sealed.activity;
        if !activity.is_sealed() {
            return Err(HaulError::InvalidTransition {
                from: activity.status.to_string(),
                event: "aggregate".to_string(),
            });
        }

        let mut state = self.state.lock().await;
        let mut progress = state.partial.get(&activity.id).copied();
        if progress.is_none()
            && (state.processed.contains(&activity.id)
                || self.repository.find_activity(activity.id).await?.is_some())
        {
            debug!("Activity already aggregated, ignoring replay");
            return Err(HaulError::AlreadyProcessed(activity.id));
        }
        if progress.is_some() {
            debug!("Resuming interrupted aggregation");
        }

        let key = production_key(activity)?;
        let mut record = self.load_record(&key).await?;

        if sealed.is_completed() {
            record.actual_production = round2(record.actual_production + activity.load_weight);
            record.total_trips += 1;
            record.total_distance = round2(record.total_distance + activity.distance);
            record.total_fuel = round2(record.total_fuel + activity.fuel_consumed);
            let trips = f64::from(record.total_trips);
            let cycle = activity.total_cycle_time.unwrap_or_default() as f64;
            record.avg_cycle_time = round2((record.avg_cycle_time * (trips - 1.0) + cycle) / trips);
            record.recompute_achievement();
        } else {
            record.cancelled_trips += 1;
            if sealed.is_incident() {
                record.incident_count += 1;
            }
        }

        let counts = self.registry.equipment_counts();
        record.trucks_operating = counts.trucks_operating;
        record.trucks_breakdown = counts.trucks_breakdown;
        record.excavators_operating = counts.excavators_operating;
        record.excavators_breakdown = counts.excavators_breakdown;
        record.utilization_rate = counts.utilization_rate();

        // Create-only insert first: a concurrent writer elsewhere fails here
        // before any log or rollup is written. The rollup goes last so a
        // resumed fold never counts the cycle twice.
        let written = self
            .write_fold(sealed, &record, progress.get_or_insert_with(FoldProgress::default))
            .await;
        match written {
            Ok(()) => {
                state.partial.remove(&activity.id);
                state.processed.insert(activity.id);
            }
            Err(error) => {
                if let Some(progress) = progress.filter(|p| p.activity_stored) {
                    state.partial.insert(activity.id, progress);
                }
                return Err(error);
            }
        }

        info!(
            activity_number = %activity.activity_number,
            status = %activity.status,
            actual_production = record.actual_production,
            achievement = record.achievement,
            total_trips = record.total_trips,
            cancelled_trips = record.cancelled_trips,
            "Aggregated sealed cycle"
        );

        Ok(record)
    }

    async fn write_fold(
        &self,
        sealed: &SealedCycle,
        record: &ProductionRecord,
        progress: &mut FoldProgress,
    ) -> Result<()> {
        if !progress.activity_stored {
            self.repository.create_activity(&sealed.activity).await?;
            progress.activity_stored = true;
        }
        for entry in sealed.status_changes.iter().skip(progress.logs_written) {
            self.repository.append_status_log(entry.clone()).await?;
            progress.logs_written += 1;
        }
        self.repository.upsert_production(record).await
    }

    /// Set the production target for a shift. Achievement is recomputed.
    pub async fn plan_target(&self, key: ProductionKey, target: f64) -> Result<ProductionRecord> {
        if !target.is_finite() || target < 0.0 {
            return Err(HaulError::Configuration(format!(
                "target production must be a non-negative number, got {target}"
            )));
        }

        let _guard = self.state.lock().await;
        let mut record = self.load_record(&key).await?;
        record.target_production = target;
        record.recompute_achievement();
        self.repository.upsert_production(&record).await?;
        Ok(record)
    }

    pub async fn record(&self, key: &ProductionKey) -> Result<Option<ProductionRecord>> {
        self.repository.find_production(key).await
    }

    pub async fn statistics(&self, filter: &ActivityFilter) -> Result<HaulStatistics> {
        let activities = self.repository.list_activities(filter).await?;
        Ok(HaulStatistics::from_activities(&activities))
    }

    pub fn production_achievement(&self, activities: &[HaulingActivity]) -> ProductionAchievement {
        ProductionAchievement::from_activities(activities)
    }

    pub async fn processed_count(&self) -> usize {
        self.state.lock().await.processed.len()
    }

    async fn load_record(&self, key: &ProductionKey) -> Result<ProductionRecord> {
        Ok(self
            .repository
            .find_production(key)
            .await?
            .unwrap_or_else(|| {
                ProductionRecord::new(key.clone(), self.config.default_target_production)
            }))
    }
}

/// Site, shift and the date the truck entered the queue
fn production_key(activity: &HaulingActivity) -> Result<ProductionKey> {
    let start = activity.queue_start_time.ok_or_else(|| {
        HaulError::Internal(format!(
            "activity {} was sealed without a queue start time",
            activity.activity_number
        ))
    })?;
    Ok(ProductionKey::new(
        activity.mining_site_id.clone(),
        activity.shift,
        start.date_naive(),
    ))
}
