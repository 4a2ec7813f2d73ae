//! Haul cycle tests: the state machine driven by hand, seeded delay
//! attribution, and dump headroom handling inside running cycles.

use chrono::Duration;
use std::sync::Arc;

use haul_core::delay::{DelayAttributor, DelayPhase, DelayPolicy, DelayRule};
use haul_core::events::EventPublisher;
use haul_core::models::{
    ActivityStatus, DelayCategory, DelayReason, DumpingPoint, Excavator, Operator, RoadSegment,
    Shift, Truck, TruckStatus,
};
use haul_core::registry::{EquipmentRegistry, ReservationBook, ResourceKey, StockLedger};
use haul_core::state_machine::{CycleEvent, CyclePhase, CycleResources, HaulCycleStateMachine};

use crate::common::{activity, harness, simulation_config, single_pit, t0};

fn resources() -> CycleResources {
    let registry = Arc::new(EquipmentRegistry::new());
    registry.register_truck(Truck::new("TRK-01", 20.0));
    registry.register_truck(Truck::new("TRK-02", 20.0));
    registry.register_excavator(Excavator::new("EX-01", 12.0));
    registry.register_operator(Operator::new("OP-01", Shift::Shift1, 4.5));
    registry.register_operator(Operator::new("OP-02", Shift::Shift1, 4.0));
    CycleResources {
        registry,
        reservations: Arc::new(ReservationBook::new()),
        stock: Arc::new(StockLedger::from_points([&DumpingPoint::new("DP-01", 50_000.0)])),
        publisher: EventPublisher::default(),
    }
}

#[tokio::test]
async fn test_ninety_percent_load_on_twenty_tonne_truck() {
    let resources = resources();
    let mut sm = HaulCycleStateMachine::new(activity("HA-20251108-001", "TRK-01"), 20.0, resources.clone());
    let id = sm.activity().id;

    sm.transition(CycleEvent::Dispatch { admitted: true, at: t0() }).await.unwrap();
    resources.reservations.reserve_pair("EX-01", "OP-01", id).unwrap();
    sm.transition(CycleEvent::StartLoading { at: t0() + Duration::minutes(3) })
        .await
        .unwrap();
    let phase = sm
        .transition(CycleEvent::CompleteLoading {
            load_factor: 0.9,
            at: t0() + Duration::minutes(11),
        })
        .await
        .unwrap();

    assert_eq!(phase, CyclePhase::Hauling);
    assert_eq!(sm.activity().load_weight, 18.0);
    assert_eq!(sm.activity().load_efficiency, 90.0);
    assert_eq!(resources.registry.truck_status("TRK-01").unwrap(), TruckStatus::Hauling);
}

#[tokio::test]
async fn test_excavator_frees_up_when_truck_departs() {
    let resources = resources();
    let mut first = HaulCycleStateMachine::new(activity("HA-20251108-001", "TRK-01"), 20.0, resources.clone());
    let first_id = first.activity().id;

    first.transition(CycleEvent::Dispatch { admitted: true, at: t0() }).await.unwrap();
    resources.reservations.reserve_pair("EX-01", "OP-01", first_id).unwrap();
    first.transition(CycleEvent::StartLoading { at: t0() }).await.unwrap();

    // Second truck cannot take the excavator while it is loading the first
    let mut second_activity = activity("HA-20251108-002", "TRK-02");
    second_activity.operator_id = "OP-02".into();
    let second_id = second_activity.id;
    assert!(resources.reservations.reserve_pair("EX-01", "OP-02", second_id).is_err());

    first
        .transition(CycleEvent::CompleteLoading {
            load_factor: 0.95,
            at: t0() + Duration::minutes(8),
        })
        .await
        .unwrap();
    assert_eq!(
        resources.reservations.held_by(first_id),
        vec![ResourceKey::Operator("OP-01".into())]
    );
    resources.reservations.reserve_pair("EX-01", "OP-02", second_id).unwrap();
    assert_eq!(
        resources.reservations.holder(&ResourceKey::Excavator("EX-01".into())),
        Some(second_id)
    );
}

#[tokio::test]
async fn test_cancel_from_queue_leaves_no_holds() {
    let resources = resources();
    let mut sm = HaulCycleStateMachine::new(activity("HA-20251108-001", "TRK-01"), 20.0, resources.clone());

    sm.transition(CycleEvent::Dispatch { admitted: false, at: t0() }).await.unwrap();
    assert_eq!(resources.registry.truck_status("TRK-01").unwrap(), TruckStatus::Standby);

    sm.transition(CycleEvent::Cancel {
        reason: haul_core::state_machine::CancelReason::ManualOverride("dispatcher recall".into()),
        at: t0() + Duration::minutes(12),
    })
    .await
    .unwrap();

    let sealed = sm.seal().unwrap();
    assert_eq!(sealed.activity.status, ActivityStatus::Cancelled);
    assert_eq!(sealed.activity.queue_duration, Some(12));
    assert_eq!(sealed.activity.total_cycle_time, Some(12));
    assert!(!sealed.is_incident());
    assert!(resources.reservations.is_empty());
    assert_eq!(resources.registry.truck_status("TRK-01").unwrap(), TruckStatus::Idle);
}

#[test]
fn test_seeded_attributors_agree_on_every_decision() {
    let policy = DelayPolicy::new(42, DelayRule::default_rules());
    let mut a = DelayAttributor::new(policy.clone(), DelayReason::standard_taxonomy());
    let mut b = DelayAttributor::new(policy, DelayReason::standard_taxonomy());

    let phases = [DelayPhase::InQueue, DelayPhase::Hauling];
    for i in 0..200 {
        let activity = activity(&format!("HA-20251108-{i:03}"), "TRK-01");
        let phase = phases[i % phases.len()];
        let left = a.evaluate(&activity, phase);
        let right = b.evaluate(&activity, phase);
        assert_eq!(left.triple(), right.triple(), "decision {i} diverged");
    }
}

#[test]
fn test_forks_replay_independently_of_evaluation_order() {
    let attributor = DelayAttributor::new(
        DelayPolicy::new(42, vec![DelayRule::new(DelayPhase::Hauling, DelayCategory::Road, 0.5, 10, 39)]),
        DelayReason::standard_taxonomy(),
    );
    let subject = activity("HA-20251108-007", "TRK-01");

    let mut early = attributor.fork("HA-20251108-007");
    let expected: Vec<_> = (0..20)
        .map(|_| early.evaluate(&subject, DelayPhase::Hauling))
        .collect();

    // Other activities drawing first must not shift this one
    let mut noise = attributor.fork("HA-20251108-001");
    for _ in 0..50 {
        noise.evaluate(&subject, DelayPhase::Hauling);
    }
    let mut late = attributor.fork("HA-20251108-007");
    let replayed: Vec<_> = (0..20)
        .map(|_| late.evaluate(&subject, DelayPhase::Hauling))
        .collect();

    assert_eq!(expected, replayed);
    assert!(expected.iter().all(|d| d.delay_minutes == 0 || (10..=39).contains(&d.delay_minutes)));
    assert!(expected
        .iter()
        .filter(|d| d.is_delayed)
        .all(|d| d.delay_reason_id.as_deref().is_some_and(|id| id.starts_with("DLY"))));
}

#[tokio::test]
async fn test_full_dumping_point_reroutes_to_alternate() {
    let mut definition = single_pit(1);
    definition.dumping_points = vec![DumpingPoint::new("DP-01", 10.0), {
        let mut roomy = DumpingPoint::new("DP-02", 100_000.0);
        roomy.current_stock = 60_000.0;
        roomy
    }];
    definition.road_segments = vec![
        RoadSegment::new("RD-01", "LP-01", "DP-01", 3.5),
        RoadSegment::new("RD-02", "LP-01", "DP-02", 5.0),
    ];
    let mut config = simulation_config();
    config.delay.rules.clear();
    let h = harness(config, definition);

    let report = h.coordinator.dispatch_tick().await.unwrap();
    assert_eq!(report.dispatched[0].assignment.dumping_point_id, "DP-01");
    h.coordinator.wait_for_idle().await;

    let activity = &h.repository.activities()[0];
    assert_eq!(activity.status, ActivityStatus::Completed);
    assert_eq!(activity.dumping_point_id, "DP-02");
    assert_eq!(activity.road_segment_id, "RD-02");
    assert_eq!(activity.distance, 5.0);

    let stock = h.coordinator.resources().stock.level("DP-02").unwrap();
    assert!((stock.stock - (60_000.0 + activity.load_weight)).abs() < 1e-6);
    assert_eq!(h.coordinator.resources().stock.level("DP-01").unwrap().stock, 0.0);
}

#[tokio::test]
async fn test_no_headroom_anywhere_cancels_after_holds() {
    let mut definition = single_pit(1);
    definition.dumping_points = vec![DumpingPoint::new("DP-01", 10.0)];
    let mut config = simulation_config();
    config.delay.rules.clear();
    config.dispatch.reservation_wait_ms = 5;
    let h = harness(config, definition);

    h.coordinator.dispatch_tick().await.unwrap();
    h.coordinator.wait_for_idle().await;

    let activity = &h.repository.activities()[0];
    assert_eq!(activity.status, ActivityStatus::Cancelled);
    // Three holds of ten minutes each before giving up
    assert!(activity.is_delayed);
    assert_eq!(activity.delay_minutes, 30);
    assert!(activity.delay_fields_consistent());
    assert_eq!(activity.total_cycle_time, Some(activity.phase_duration_sum()));

    assert!(h.coordinator.resources().reservations.is_empty());
    assert_eq!(h.coordinator.resources().stock.level("DP-01").unwrap().stock, 0.0);
    assert_eq!(h.parts.registry.truck_status("TRK-01").unwrap(), TruckStatus::Idle);
    assert_eq!(h.repository.production_records()[0].incident_count, 0);
}
