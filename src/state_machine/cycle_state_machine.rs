use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::{
    actions::{
        CommitStockAction, PublishTransitionEventAction, ReleaseReservationsAction, StateAction,
        UpdateTruckCrewAction,
    },
    errors::{ActionError, GuardError, StateMachineError, StateMachineResult},
    events::{CancelReason, CycleEvent},
    guards::{
        BacklogGuard, DelayCompatibleGuard, DumpHeadroomReservedGuard, LoadWithinCapacityGuard,
        ReservationHeldGuard, StateGuard,
    },
    states::CyclePhase,
};
use crate::delay::{DelayDecision, DelayPhase};
use crate::events::EventPublisher;
use crate::logging::log_cycle_operation;
use crate::models::{ActivityStatus, EquipmentStatusLogEntry, HaulingActivity};
use crate::registry::{EquipmentRegistry, ReservationBook, StockLedger};

/// Shared services a cycle acts on
#[derive(Debug, Clone)]
pub struct CycleResources {
    pub registry: Arc<EquipmentRegistry>,
    pub reservations: Arc<ReservationBook>,
    pub stock: Arc<StockLedger>,
    pub publisher: EventPublisher,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributedDelay {
    pub phase: DelayPhase,
    pub decision: DelayDecision,
    pub at: DateTime<Utc>,
}

/// A terminal cycle, ready for aggregation. Never modified again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedCycle {
    pub activity: HaulingActivity,
    /// Every equipment status change the cycle induced, in order
    pub status_changes: Vec<EquipmentStatusLogEntry>,
    pub delays: Vec<AttributedDelay>,
    pub cancel_reason: Option<CancelReason>,
}

impl SealedCycle {
    pub fn is_completed(&self) -> bool {
        self.activity.status == ActivityStatus::Completed
    }

    /// Cancelled because reserved equipment broke down
    pub fn is_incident(&self) -> bool {
        self.cancel_reason.as_ref().is_some_and(CancelReason::is_breakdown)
    }
}

/// Controller for one truck cycle. Owns the activity record, writes the
/// truck's derived status through registry compare-and-set, and records
/// whole-minute phase timestamps so that phase durations always sum to the
/// cycle time.
pub struct HaulCycleStateMachine {
    activity: HaulingActivity,
    phase: CyclePhase,
    backlogged: bool,
    truck_capacity: f64,
    resources: CycleResources,
    last_instant: Option<DateTime<Utc>>,
    hold_until: Option<DateTime<Utc>>,
    status_since: Option<DateTime<Utc>>,
    status_changes: Vec<EquipmentStatusLogEntry>,
    delays: Vec<AttributedDelay>,
    cancel_reason: Option<CancelReason>,
}

impl std::fmt::Debug for HaulCycleStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaulCycleStateMachine")
            .field("activity_number", &self.activity.activity_number)
            .field("truck_id", &self.activity.truck_id)
            .field("phase", &self.phase)
            .field("backlogged", &self.backlogged)
            .finish()
    }
}

impl HaulCycleStateMachine {
    /// Create a new cycle state machine for a fresh activity
    pub fn new(activity: HaulingActivity, truck_capacity: f64, resources: CycleResources) -> Self {
        Self {
            activity,
            phase: CyclePhase::Idle,
            backlogged: false,
            truck_capacity,
            resources,
            last_instant: None,
            hold_until: None,
            status_since: None,
            status_changes: Vec::new(),
            delays: Vec::new(),
            cancel_reason: None,
        }
    }

    pub fn activity(&self) -> &HaulingActivity {
        &self.activity
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Instant of the latest applied event, after any delay hold
    pub fn last_instant(&self) -> Option<DateTime<Utc>> {
        self.last_instant.max(self.hold_until)
    }

    pub fn status_changes(&self) -> &[EquipmentStatusLogEntry] {
        &self.status_changes
    }

    /// Attempt to transition the cycle
    pub async fn transition(&mut self, mut event: CycleEvent) -> StateMachineResult<CyclePhase> {
        if self.phase.is_terminal() {
            return Err(StateMachineError::Sealed(self.phase.to_string()));
        }

        let from = self.phase;
        let target = self.determine_target_state(from, &event)?;

        let at = self.normalize(event.at(), &event);
        event.set_at(at);

        // Guards run before anything is mutated
        self.check_guards(from, target, &event)?;

        let backlogged_after = match &event {
            CycleEvent::Dispatch { admitted, .. } => !admitted,
            CycleEvent::Promote { .. } => false,
            _ if target.is_terminal() => false,
            _ => self.backlogged,
        };

        self.sync_truck_status(from, target, backlogged_after, &event, at)?;
        self.apply(from, target, &event, at);

        self.backlogged = backlogged_after;
        self.phase = target;
        self.last_instant = Some(at);

        self.execute_actions(from, target, &event).await?;

        log_cycle_operation(
            event.event_type(),
            Some(&self.activity.activity_number),
            &self.activity.truck_id,
            &target.to_string(),
            event.cancel_reason().map(|r| r.to_string()).as_deref(),
        );

        Ok(target)
    }

    /// Record a delay against the current phase. A decision without a delay
    /// is a no-op.
    pub async fn attach_delay(
        &mut self,
        phase: DelayPhase,
        decision: DelayDecision,
        at: DateTime<Utc>,
    ) -> StateMachineResult<CyclePhase> {
        if !decision.is_delayed {
            return Ok(self.phase);
        }
        self.transition(CycleEvent::AttachDelay { phase, decision, at }).await
    }

    /// Fuel burnt over the round trip, litres
    pub fn record_fuel(&mut self, litres: f64) -> StateMachineResult<()> {
        if self.phase.is_terminal() {
            return Err(StateMachineError::Sealed(self.phase.to_string()));
        }
        self.activity.fuel_consumed = litres;
        Ok(())
    }

    /// Seal a terminal cycle for aggregation
    pub fn seal(self) -> StateMachineResult<SealedCycle> {
        if !self.phase.is_terminal() {
            return Err(StateMachineError::InvalidTransition {
                from: self.phase.to_string(),
                event: "seal".to_string(),
            });
        }
        Ok(SealedCycle {
            activity: self.activity,
            status_changes: self.status_changes,
            delays: self.delays,
            cancel_reason: self.cancel_reason,
        })
    }

    /// Determine the target state based on current state and event
    fn determine_target_state(
        &self,
        current_state: CyclePhase,
        event: &CycleEvent,
    ) -> StateMachineResult<CyclePhase> {
        let target = match (current_state, event) {
            (CyclePhase::Idle, CycleEvent::Dispatch { .. }) => CyclePhase::InQueue,
            (CyclePhase::InQueue, CycleEvent::Promote { .. }) => CyclePhase::InQueue,
            (CyclePhase::InQueue, CycleEvent::StartLoading { .. }) => CyclePhase::Loading,
            (CyclePhase::Loading, CycleEvent::CompleteLoading { .. }) => CyclePhase::Hauling,
            (CyclePhase::Hauling, CycleEvent::ArriveAtDump { .. }) => CyclePhase::Dumping,
            (CyclePhase::Dumping, CycleEvent::CompleteDump { .. }) => CyclePhase::Returning,
            (CyclePhase::Returning, CycleEvent::ReturnToPool { .. }) => CyclePhase::Completed,

            // Annotations keep the phase
            (phase, CycleEvent::AttachDelay { .. }) if phase.is_active() => phase,
            (CyclePhase::Hauling, CycleEvent::Reroute { .. }) => CyclePhase::Hauling,

            // Cancel from any non-terminal state
            (phase, CycleEvent::Cancel { .. }) if !phase.is_terminal() => CyclePhase::Cancelled,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: to_event(event),
                })
            }
        };

        Ok(target)
    }

    /// Check guard conditions for the transition
    fn check_guards(
        &self,
        current_state: CyclePhase,
        target_state: CyclePhase,
        event: &CycleEvent,
    ) -> StateMachineResult<()> {
        let activity = &self.activity;
        match (current_state, target_state, event) {
            (CyclePhase::InQueue, CyclePhase::InQueue, CycleEvent::Promote { .. }) => {
                BacklogGuard::new(self.backlogged, true).check(activity)?;
            }

            (CyclePhase::InQueue, CyclePhase::Loading, _) => {
                BacklogGuard::new(self.backlogged, false).check(activity)?;
                ReservationHeldGuard::new(Arc::clone(&self.resources.reservations)).check(activity)?;
            }

            (CyclePhase::Loading, CyclePhase::Hauling, CycleEvent::CompleteLoading { load_factor, .. }) => {
                LoadWithinCapacityGuard::new(*load_factor, self.truck_capacity).check(activity)?;
            }

            (CyclePhase::Hauling, CyclePhase::Dumping, _) => {
                DumpHeadroomReservedGuard::new(Arc::clone(&self.resources.stock)).check(activity)?;
            }

            (_, _, CycleEvent::AttachDelay { phase, decision, .. }) => {
                DelayCompatibleGuard::new(current_state, *phase, decision).check(activity)?;
            }

            (_, _, CycleEvent::Reroute {
                dumping_point_id,
                distance,
                ..
            }) => {
                if dumping_point_id == &activity.dumping_point_id
                    || !distance.is_finite()
                    || *distance <= 0.0
                {
                    return Err(GuardError::BusinessRule(format!(
                        "cannot reroute {} to {dumping_point_id} over {distance} km",
                        activity.activity_number
                    ))
                    .into());
                }
            }

            // No special guards for other transitions
            _ => {}
        }

        Ok(())
    }

    /// Move the truck to the status derived from the target phase. Losing the
    /// compare-and-set is a conflict, except while cancelling, where the
    /// external status wins.
    fn sync_truck_status(
        &mut self,
        from: CyclePhase,
        target: CyclePhase,
        backlogged_after: bool,
        event: &CycleEvent,
        at: DateTime<Utc>,
    ) -> StateMachineResult<()> {
        let expected = from.truck_status(self.backlogged);
        let next = target.truck_status(backlogged_after);
        if expected == next {
            return Ok(());
        }

        let truck_id = self.activity.truck_id.as_str();
        let swapped = self
            .resources
            .registry
            .compare_and_set_truck_status(truck_id, expected, next)
            .map_err(ActionError::from)?;

        if !swapped {
            let actual = self
                .resources
                .registry
                .truck_status(truck_id)
                .map(|s| s.to_string())
                .unwrap_or_else(|_| "unknown".to_string());

            if target == CyclePhase::Cancelled {
                warn!(
                    truck_id = %truck_id,
                    expected = %expected,
                    actual = %actual,
                    "Truck status changed externally, leaving it in place on cancel"
                );
                return Ok(());
            }

            return Err(ActionError::StatusConflict {
                equipment: format!("truck {truck_id}"),
                expected: expected.to_string(),
                actual,
            }
            .into());
        }

        let mut entry = EquipmentStatusLogEntry::truck(truck_id, expected, next, at).with_reason(
            match event.cancel_reason() {
                Some(reason) => reason.to_string(),
                None => format!("{} {}", event.event_type(), self.activity.activity_number),
            },
        );
        if let Some(since) = self.status_since {
            entry = entry.with_duration(whole_minutes(since, at));
        }
        self.status_changes.push(entry);
        self.status_since = Some(at);
        Ok(())
    }

    /// Record timestamps and durations for the transition
    fn apply(&mut self, from: CyclePhase, target: CyclePhase, event: &CycleEvent, at: DateTime<Utc>) {
        let activity = &mut self.activity;

        match event {
            CycleEvent::Dispatch { .. } => {
                activity.queue_start_time = Some(at);
            }
            CycleEvent::Promote { .. } => {}
            CycleEvent::StartLoading { .. } => {
                activity.queue_end_time = Some(at);
                activity.queue_duration = span(activity.queue_start_time, at);
                activity.loading_start_time = Some(at);
            }
            CycleEvent::CompleteLoading { load_factor, .. } => {
                let load = LoadWithinCapacityGuard::new(*load_factor, self.truck_capacity)
                    .load_weight(activity.target_weight);
                activity.record_load(load);
                activity.loading_end_time = Some(at);
                activity.loading_duration = span(activity.loading_start_time, at);
                activity.departure_time = Some(at);
            }
            CycleEvent::ArriveAtDump { .. } => {
                activity.arrival_time = Some(at);
                activity.hauling_duration = span(activity.departure_time, at);
                activity.dumping_start_time = Some(at);
            }
            CycleEvent::CompleteDump { .. } => {
                activity.dumping_end_time = Some(at);
                activity.dumping_duration = span(activity.dumping_start_time, at);
            }
            CycleEvent::ReturnToPool { .. } => {
                activity.return_time = Some(at);
                activity.return_duration = span(activity.dumping_end_time, at);
                activity.total_cycle_time = Some(activity.phase_duration_sum());
            }
            CycleEvent::AttachDelay { phase, decision, .. } => {
                if let Some(reason_id) = &decision.delay_reason_id {
                    activity.add_delay(reason_id.clone(), decision.delay_minutes);
                }
                self.hold_until = self
                    .hold_until
                    .max(Some(at + chrono::Duration::minutes(decision.delay_minutes)));
                self.delays.push(AttributedDelay {
                    phase: *phase,
                    decision: decision.clone(),
                    at,
                });
            }
            CycleEvent::Reroute {
                dumping_point_id,
                road_segment_id,
                distance,
                ..
            } => {
                activity.remarks = Some(format!(
                    "rerouted from {} to {dumping_point_id}",
                    activity.dumping_point_id
                ));
                activity.dumping_point_id = dumping_point_id.clone();
                activity.road_segment_id = road_segment_id.clone();
                activity.distance = *distance;
            }
            CycleEvent::Cancel { reason, .. } => {
                close_phase(activity, from, at);
                activity.total_cycle_time = Some(activity.phase_duration_sum());
                activity.remarks = Some(reason.to_string());

                self.cancel_reason = Some(reason.clone());
            }
        }

        activity.status = match event {
            CycleEvent::AttachDelay { .. } => ActivityStatus::Delayed,
            _ if event.is_annotation() => activity.status,
            _ => target.activity_status(),
        };
    }

    /// Execute actions after a successful transition
    async fn execute_actions(
        &self,
        from_state: CyclePhase,
        to_state: CyclePhase,
        event: &CycleEvent,
    ) -> StateMachineResult<()> {
        let actions: Vec<Box<dyn StateAction<HaulingActivity> + Send + Sync>> = vec![
            Box::new(CommitStockAction::new(Arc::clone(&self.resources.stock))),
            Box::new(ReleaseReservationsAction::new(
                Arc::clone(&self.resources.reservations),
                Arc::clone(&self.resources.stock),
            )),
            Box::new(UpdateTruckCrewAction::new(Arc::clone(&self.resources.registry))),
            Box::new(PublishTransitionEventAction::new(self.resources.publisher.clone())),
        ];

        for action in actions {
            action
                .execute(&self.activity, from_state, to_state, event)
                .await?;
        }

        Ok(())
    }

    /// Whole minutes, never before the previous event or an attached delay.
    /// Annotations are stamped at the current instant.
    fn normalize(&self, at: DateTime<Utc>, event: &CycleEvent) -> DateTime<Utc> {
        let floored = floor_minute(at);
        let floor = if event.is_annotation() {
            self.last_instant
        } else {
            self.last_instant.max(self.hold_until)
        };
        match floor {
            Some(previous) => floored.max(previous),
            None => floored,
        }
    }
}

fn to_event(event: &CycleEvent) -> String {
    event.event_type().to_string()
}

/// Truncate to the minute
pub fn floor_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(at)
}

fn whole_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_minutes().max(0)
}

fn span(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> Option<i64> {
    start.map(|s| whole_minutes(s, end))
}

/// Close whichever phase was open when the cycle was cancelled
fn close_phase(activity: &mut HaulingActivity, phase: CyclePhase, at: DateTime<Utc>) {
    match phase {
        CyclePhase::InQueue => {
            activity.queue_end_time = Some(at);
            activity.queue_duration = span(activity.queue_start_time, at);
        }
        CyclePhase::Loading => {
            activity.loading_end_time = Some(at);
            activity.loading_duration = span(activity.loading_start_time, at);
        }
        CyclePhase::Hauling => {
            activity.hauling_duration = span(activity.departure_time, at);
        }
        CyclePhase::Dumping => {
            activity.dumping_end_time = Some(at);
            activity.dumping_duration = span(activity.dumping_start_time, at);
        }
        CyclePhase::Returning => {
            activity.return_time = Some(at);
            activity.return_duration = span(activity.dumping_end_time, at);
        }
        CyclePhase::Idle | CyclePhase::Completed | CyclePhase::Cancelled => {}
    }
}
