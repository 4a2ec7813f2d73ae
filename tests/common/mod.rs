//! Shared fixtures for the integration tests
#![allow(dead_code)]

pub mod failing_repository;
pub mod strategies;

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use haul_core::config::{FleetConfig, QueueConfig};
use haul_core::cycle::ManualTimeProvider;
use haul_core::dispatch::DefaultAssignmentPolicy;
use haul_core::models::{
    Assignment, DumpingPoint, Excavator, ExcavatorStatus, HaulingActivity, LoadingPoint, Operator,
    RoadSegment, Shift, Truck,
};
use haul_core::orchestration::FleetCoordinator;
use haul_core::registry::{FleetDefinition, FleetParts};
use haul_core::repository::InMemoryRepository;

/// Saturday morning, inside SHIFT_1
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 8, 6, 0, 0).unwrap()
}

pub fn assignment() -> Assignment {
    Assignment {
        loading_point_id: "LP-01".into(),
        excavator_id: "EX-01".into(),
        operator_id: "OP-01".into(),
        dumping_point_id: "DP-01".into(),
        road_segment_id: "RD-01".into(),
    }
}

pub fn activity(number: &str, truck_id: &str) -> HaulingActivity {
    HaulingActivity::new(number, truck_id, &assignment(), "SITE-01", Shift::Shift1, 20.0, 3.5)
}

fn excavator_at(id: &str, loading_point_id: &str) -> Excavator {
    let mut excavator = Excavator::new(id, 12.0);
    excavator.loading_point_id = Some(loading_point_id.to_string());
    excavator.status = ExcavatorStatus::Active;
    excavator
}

/// One pit, one excavator, one operator per shift and `trucks` haul trucks
pub fn single_pit(trucks: usize) -> FleetDefinition {
    FleetDefinition {
        trucks: (1..=trucks)
            .map(|i| Truck::new(format!("TRK-{i:02}"), 20.0))
            .collect(),
        excavators: vec![excavator_at("EX-01", "LP-01")],
        operators: vec![
            Operator::new("OP-01", Shift::Shift1, 4.5),
            Operator::new("OP-02", Shift::Shift2, 4.0),
            Operator::new("OP-03", Shift::Shift3, 4.2),
        ],
        loading_points: vec![LoadingPoint::new("LP-01", "SITE-01", 3)],
        dumping_points: vec![DumpingPoint::new("DP-01", 50_000.0)],
        road_segments: vec![RoadSegment::new("RD-01", "LP-01", "DP-01", 3.5)],
        delay_reasons: Vec::new(),
    }
}

/// Two pits feeding two dumping points, four trucks
pub fn two_pits() -> FleetDefinition {
    FleetDefinition {
        trucks: (1..=4).map(|i| Truck::new(format!("TRK-{i:02}"), 20.0)).collect(),
        excavators: vec![excavator_at("EX-01", "LP-01"), excavator_at("EX-02", "LP-02")],
        operators: vec![
            Operator::new("OP-01", Shift::Shift1, 4.5),
            Operator::new("OP-02", Shift::Shift1, 4.0),
            Operator::new("OP-03", Shift::Shift2, 4.2),
            Operator::new("OP-04", Shift::Shift2, 3.8),
        ],
        loading_points: vec![
            LoadingPoint::new("LP-01", "SITE-01", 3),
            LoadingPoint::new("LP-02", "SITE-01", 3),
        ],
        dumping_points: vec![
            DumpingPoint::new("DP-01", 50_000.0),
            DumpingPoint::new("DP-02", 30_000.0),
        ],
        road_segments: vec![
            RoadSegment::new("RD-01", "LP-01", "DP-01", 3.5),
            RoadSegment::new("RD-02", "LP-02", "DP-02", 4.2),
        ],
        delay_reasons: Vec::new(),
    }
}

/// Pure simulation settings: no pacing, short reservation wait
pub fn simulation_config() -> FleetConfig {
    let mut config = FleetConfig::default();
    config.dispatch.real_time_factor = 0.0;
    config.dispatch.reservation_wait_ms = 50;
    config.production.mining_site_id = "SITE-01".to_string();
    config
}

pub struct Harness {
    pub coordinator: FleetCoordinator,
    pub repository: Arc<InMemoryRepository>,
    pub clock: ManualTimeProvider,
    pub parts: FleetParts,
}

pub fn harness(config: FleetConfig, definition: FleetDefinition) -> Harness {
    let parts = definition.build(&QueueConfig::default());
    let repository = Arc::new(InMemoryRepository::new());
    let clock = ManualTimeProvider::new(t0());
    let coordinator = FleetCoordinator::with_components(
        config,
        parts.clone(),
        repository.clone(),
        Arc::new(DefaultAssignmentPolicy::new()),
        Arc::new(clock.clone()),
    )
    .expect("coordinator");

    Harness {
        coordinator,
        repository,
        clock,
        parts,
    }
}
