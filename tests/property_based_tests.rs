mod common;

use chrono::Duration;
use common::strategies::*;
use common::{activity, t0};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use haul_core::delay::{DelayAttributor, DelayPhase, DelayPolicy, DelayRule};
use haul_core::events::EventPublisher;
use haul_core::models::{
    DelayCategory, DelayReason, DumpingPoint, Excavator, LoadingPoint, Operator, Shift, Truck,
};
use haul_core::queue::LoadingPointQueueManager;
use haul_core::registry::{EquipmentRegistry, ReservationBook, StockLedger};
use haul_core::repository::InMemoryRepository;
use haul_core::state_machine::{CycleEvent, CycleResources, HaulCycleStateMachine};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn resources() -> CycleResources {
    let registry = Arc::new(EquipmentRegistry::new());
    registry.register_truck(Truck::new("TRK-01", 20.0));
    registry.register_excavator(Excavator::new("EX-01", 12.0));
    registry.register_operator(Operator::new("OP-01", Shift::Shift1, 4.5));
    CycleResources {
        registry,
        reservations: Arc::new(ReservationBook::new()),
        stock: Arc::new(StockLedger::from_points([&DumpingPoint::new("DP-01", 1_000_000.0)])),
        publisher: EventPublisher::default(),
    }
}

proptest! {
    /// Property: slot occupancy never exceeds the configured maximum and a
    /// truck is never enrolled twice
    #[test]
    fn queue_occupancy_stays_within_capacity(
        max in 1usize..5,
        ops in proptest::collection::vec(queue_op_strategy(8), 1..60),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let queue = LoadingPointQueueManager::new(Arc::new(InMemoryRepository::new()));
            queue.register_point(&LoadingPoint::new("LP-01", "SITE-01", max));
            // Tickets must stay alive or their waiters are skipped on promotion
            let mut tickets = Vec::new();

            for (step, op) in ops.into_iter().enumerate() {
                let at = t0() + Duration::minutes(step as i64);
                match op {
                    QueueOp::Admit(i) => {
                        if let Ok(admission) = queue.admit(&format!("TRK-{i:02}"), "LP-01", at).await {
                            prop_assert_eq!(admission.admitted, admission.ticket.is_none());
                            tickets.extend(admission.ticket);
                        }
                    }
                    QueueOp::Release(i) => {
                        let _ = queue.release("LP-01", &format!("TRK-{i:02}"), at).await;
                    }
                    QueueOp::Withdraw(i) => {
                        let _ = queue.withdraw("LP-01", &format!("TRK-{i:02}"), at).await;
                    }
                }

                prop_assert!(queue.occupancy("LP-01") <= max);
                let snapshot = queue.snapshot().pop().unwrap();
                let enrolled: Vec<&String> = snapshot.slot_holders.iter().chain(snapshot.backlog.iter()).collect();
                let unique: HashSet<&String> = enrolled.iter().copied().collect();
                prop_assert_eq!(enrolled.len(), unique.len());
                // Nobody waits while a slot is free
                prop_assert!(snapshot.backlog.is_empty() || snapshot.slot_holders.len() == max);
            }
            Ok(())
        })?;
    }

    /// Property: phase durations always add up to the cycle time, whatever
    /// the seconds on the reported instants
    #[test]
    fn phase_durations_sum_to_cycle_time(
        minutes in phase_minutes_strategy(),
        jitter in jitter_strategy(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let resources = resources();
            let mut sm = HaulCycleStateMachine::new(activity("HA-20251108-001", "TRK-01"), 20.0, resources.clone());
            let id = sm.activity().id;

            let mut offsets = [0i64; 6];
            for (i, m) in minutes.iter().enumerate() {
                offsets[i + 1] = offsets[i] + m;
            }
            let at = |k: usize| t0() + Duration::minutes(offsets[k]) + Duration::seconds(jitter[k]);

            sm.transition(CycleEvent::Dispatch { admitted: true, at: at(0) }).await.unwrap();
            resources.reservations.reserve_pair("EX-01", "OP-01", id).unwrap();
            sm.transition(CycleEvent::StartLoading { at: at(1) }).await.unwrap();
            sm.transition(CycleEvent::CompleteLoading { load_factor: 0.9, at: at(2) }).await.unwrap();
            resources.stock.try_reserve_headroom("DP-01", id, 18.0).unwrap();
            sm.transition(CycleEvent::ArriveAtDump { at: at(3) }).await.unwrap();
            sm.transition(CycleEvent::CompleteDump { at: at(4) }).await.unwrap();
            sm.transition(CycleEvent::ReturnToPool { at: at(5) }).await.unwrap();

            let sealed = sm.seal().unwrap();
            let activity = &sealed.activity;
            prop_assert_eq!(activity.total_cycle_time, Some(activity.phase_duration_sum()));
            prop_assert_eq!(activity.total_cycle_time, Some(offsets[5]));
            prop_assert_eq!(activity.queue_duration, Some(minutes[0]));
            prop_assert_eq!(activity.return_duration, Some(minutes[4]));
            prop_assert!(resources.reservations.is_empty());
            Ok(())
        })?;
    }

    /// Property: accepted loads never exceed the truck's capacity and
    /// rejected ones leave the activity unloaded
    #[test]
    fn load_never_exceeds_capacity(load_factor in -0.5f64..2.0) {
        let rt = runtime();
        rt.block_on(async {
            let resources = resources();
            let mut sm = HaulCycleStateMachine::new(activity("HA-20251108-001", "TRK-01"), 20.0, resources.clone());
            sm.transition(CycleEvent::Dispatch { admitted: true, at: t0() }).await.unwrap();
            resources.reservations.reserve_pair("EX-01", "OP-01", sm.activity().id).unwrap();
            sm.transition(CycleEvent::StartLoading { at: t0() }).await.unwrap();

            let result = sm
                .transition(CycleEvent::CompleteLoading { load_factor, at: t0() + Duration::minutes(8) })
                .await;
            if load_factor > 0.0 && load_factor <= 1.0 {
                prop_assert!(result.is_ok());
                prop_assert!(sm.activity().load_weight <= 20.0);
                prop_assert!(sm.activity().load_efficiency <= 100.0);
            } else {
                prop_assert!(result.is_err());
                prop_assert_eq!(sm.activity().load_weight, 0.0);
            }
            Ok(())
        })?;
    }

    /// Property: every delay decision keeps its three fields in agreement
    /// and stays inside the rule's minute range
    #[test]
    fn delay_decisions_are_self_consistent(
        seed in any::<u64>(),
        (probability, min, max) in delay_rule_strategy(),
        key in "HA-2025110[1-9]-[0-9]{3}",
    ) {
        let policy = DelayPolicy::new(seed, vec![DelayRule::new(DelayPhase::Hauling, DelayCategory::Road, probability, min, max)]);
        let attributor = DelayAttributor::new(policy, DelayReason::standard_taxonomy());
        let subject = activity(&key, "TRK-01");

        let mut fork = attributor.fork(&key);
        let mut replay = attributor.fork(&key);
        for _ in 0..10 {
            let decision = fork.evaluate(&subject, DelayPhase::Hauling);
            prop_assert_eq!(decision.is_delayed, decision.delay_reason_id.is_some());
            prop_assert_eq!(decision.is_delayed, decision.delay_minutes > 0);
            if decision.is_delayed {
                prop_assert!((min..=max).contains(&decision.delay_minutes));
                prop_assert_eq!(decision.category, Some(DelayCategory::Road));
            }
            prop_assert_eq!(decision, replay.evaluate(&subject, DelayPhase::Hauling));
        }
    }
}
