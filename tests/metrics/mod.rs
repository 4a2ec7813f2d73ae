//! Production aggregation: exactly-once folding under concurrent delivery

use chrono::{Duration, NaiveDate};
use futures::future::join_all;
use std::sync::Arc;

use haul_core::config::ProductionConfig;
use haul_core::error::HaulError;
use haul_core::metrics::MetricsAggregator;
use haul_core::models::{
    ActivityStatus, EquipmentStatusLogEntry, HaulingActivity, ProductionKey, Shift, Truck,
    TruckStatus,
};
use haul_core::registry::EquipmentRegistry;
use haul_core::repository::{ActivityFilter, InMemoryRepository};
use haul_core::state_machine::SealedCycle;

use crate::common::failing_repository::FailingRepository;
use crate::common::{activity, t0};

fn sealed(number: &str, status: ActivityStatus, load: f64, target: f64) -> SealedCycle {
    let mut activity: HaulingActivity = activity(number, "TRK-01");
    activity.target_weight = target;
    activity.queue_start_time = Some(t0());
    activity.status = status;
    activity.record_load(load);
    activity.total_cycle_time = Some(42);
    SealedCycle {
        activity,
        status_changes: Vec::new(),
        delays: Vec::new(),
        cancel_reason: None,
    }
}

fn key() -> ProductionKey {
    ProductionKey::new("SITE-01", Shift::Shift1, NaiveDate::from_ymd_opt(2025, 11, 8).unwrap())
}

fn aggregator() -> (Arc<MetricsAggregator>, Arc<InMemoryRepository>) {
    let repository = Arc::new(InMemoryRepository::new());
    let registry = Arc::new(EquipmentRegistry::new());
    registry.register_truck(Truck::new("TRK-01", 20.0));
    let aggregator = Arc::new(MetricsAggregator::new(
        repository.clone(),
        registry,
        ProductionConfig::default(),
    ));
    (aggregator, repository)
}

#[tokio::test]
async fn test_three_concurrent_loads_reach_ninety_six_percent() {
    let (aggregator, repository) = aggregator();
    aggregator.plan_target(key(), 5000.0).await.unwrap();

    let cycles = [
        sealed("HA-20251108-001", ActivityStatus::Completed, 1600.0, 2000.0),
        sealed("HA-20251108-002", ActivityStatus::Completed, 1700.0, 2000.0),
        sealed("HA-20251108-003", ActivityStatus::Completed, 1500.0, 2000.0),
    ];
    let results = join_all(cycles.iter().map(|cycle| aggregator.process(cycle))).await;
    assert!(results.iter().all(Result::is_ok));

    let record = aggregator.record(&key()).await.unwrap().unwrap();
    assert_eq!(record.actual_production, 4800.0);
    assert_eq!(record.achievement, 96.0);
    assert_eq!(record.total_trips, 3);
    assert_eq!(record.avg_cycle_time, 42.0);
    assert_eq!(repository.activities().len(), 3);
    assert_eq!(repository.production_records(), vec![record]);
}

#[tokio::test]
async fn test_concurrent_replays_fold_exactly_once() {
    let (aggregator, repository) = aggregator();
    let cycle = sealed("HA-20251108-001", ActivityStatus::Completed, 18.0, 20.0);

    let results = join_all((0..5).map(|_| {
        let aggregator = Arc::clone(&aggregator);
        let cycle = cycle.clone();
        tokio::spawn(async move { aggregator.process(&cycle).await })
    }))
    .await;

    let results: Vec<_> = results.into_iter().map(|joined| joined.unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, HaulError::AlreadyProcessed(id) if *id == cycle.activity.id)));

    let record = aggregator.record(&key()).await.unwrap().unwrap();
    assert_eq!(record.total_trips, 1);
    assert_eq!(record.actual_production, 18.0);
    assert_eq!(repository.activities().len(), 1);
    assert_eq!(aggregator.processed_count().await, 1);
}

#[tokio::test]
async fn test_open_activity_is_refused() {
    let (aggregator, repository) = aggregator();
    let cycle = sealed("HA-20251108-001", ActivityStatus::Hauling, 18.0, 20.0);

    let err = aggregator.process(&cycle).await.unwrap_err();
    assert!(matches!(err, HaulError::InvalidTransition { .. }));
    assert!(repository.activities().is_empty());
    assert!(repository.production_records().is_empty());
}

#[tokio::test]
async fn test_statistics_over_mixed_outcomes() {
    let (aggregator, repository) = aggregator();
    let mut late = sealed("HA-20251108-004", ActivityStatus::Completed, 19.0, 20.0);
    late.activity.add_delay("DLY-W01", 20);
    late.activity.queue_start_time = Some(t0() + Duration::hours(1));

    for cycle in [
        sealed("HA-20251108-001", ActivityStatus::Completed, 18.0, 20.0),
        sealed("HA-20251108-002", ActivityStatus::Completed, 20.0, 20.0),
        sealed("HA-20251108-003", ActivityStatus::Cancelled, 0.0, 20.0),
        late,
    ] {
        aggregator.process(&cycle).await.unwrap();
    }

    let stats = aggregator
        .statistics(&ActivityFilter::for_key(&key()))
        .await
        .unwrap();
    assert_eq!(stats.total_activities, 4);
    assert_eq!(stats.completed_activities, 3);
    assert_eq!(stats.cancelled_activities, 1);
    assert_eq!(stats.delayed_activities, 1);
    assert_eq!(stats.completion_rate, 75.0);
    assert_eq!(stats.delay_rate, 25.0);
    assert_eq!(stats.avg_load_weight, 19.0);
    assert_eq!(stats.total_load_weight, 57.0);

    let record = aggregator.record(&key()).await.unwrap().unwrap();
    assert_eq!(record.total_trips, 3);
    assert_eq!(record.cancelled_trips, 1);
    assert_eq!(record.incident_count, 0);

    // Only the full 20 t load counts toward achievement
    let achievement = aggregator.production_achievement(&repository.activities());
    assert_eq!(achievement.completed_count, 1);
    assert_eq!(achievement.total_count, 4);
    assert_eq!(achievement.achievement, 25.0);
    assert_eq!(achievement.load_weight_progress, 71.25);
}

fn failing_aggregator() -> (MetricsAggregator, Arc<FailingRepository>) {
    let repository = Arc::new(FailingRepository::new());
    let registry = Arc::new(EquipmentRegistry::new());
    registry.register_truck(Truck::new("TRK-01", 20.0));
    let aggregator = MetricsAggregator::new(repository.clone(), registry, ProductionConfig::default());
    (aggregator, repository)
}

#[tokio::test]
async fn test_failed_rollup_write_is_retried_once() {
    let (aggregator, repository) = failing_aggregator();
    let cycle = sealed("HA-20251108-001", ActivityStatus::Completed, 18.0, 20.0);
    repository.fail_upserts(1);

    let err = aggregator.process(&cycle).await.unwrap_err();
    assert!(matches!(err, HaulError::Repository(_)));
    assert!(aggregator.record(&key()).await.unwrap().is_none());
    assert_eq!(repository.inner.activities().len(), 1);

    // The stored activity does not block the retry
    let record = aggregator.process(&cycle).await.unwrap();
    assert_eq!(record.total_trips, 1);
    assert_eq!(record.actual_production, 18.0);
    assert_eq!(repository.inner.activities().len(), 1);
    assert_eq!(aggregator.processed_count().await, 1);

    let err = aggregator.process(&cycle).await.unwrap_err();
    assert!(matches!(err, HaulError::AlreadyProcessed(_)));
    assert_eq!(aggregator.record(&key()).await.unwrap().unwrap().total_trips, 1);
}

#[tokio::test]
async fn test_resumed_fold_writes_each_status_log_once() {
    let (aggregator, repository) = failing_aggregator();
    let mut cycle = sealed("HA-20251108-001", ActivityStatus::Completed, 18.0, 20.0);
    cycle.status_changes = vec![
        EquipmentStatusLogEntry::truck("TRK-01", TruckStatus::Idle, TruckStatus::InQueue, t0()),
        EquipmentStatusLogEntry::truck("TRK-01", TruckStatus::InQueue, TruckStatus::Loading, t0()),
        EquipmentStatusLogEntry::truck("TRK-01", TruckStatus::Loading, TruckStatus::Hauling, t0()),
    ];
    repository.fail_status_logs_after(1, 1);

    assert!(aggregator.process(&cycle).await.is_err());
    assert_eq!(repository.inner.status_logs().len(), 1);

    aggregator.process(&cycle).await.unwrap();
    assert_eq!(repository.inner.status_logs(), cycle.status_changes);
    assert_eq!(aggregator.record(&key()).await.unwrap().unwrap().total_trips, 1);
}
