//! # Cycle Runner
//!
//! Drives one truck through queue, load, haul, dump and return on a logical
//! clock. Runs as its own task; the only suspension points are the promotion
//! ticket, the reservation wait, dump headroom retries and optional real-time
//! pacing. A cancellation may arrive at any of them, after which the runner
//! gives back everything it holds and seals the activity as CANCELLED.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::timing::CycleTimingModel;
use crate::config::DispatchConfig;
use crate::delay::{DelayAttributor, DelayPhase};
use crate::dispatch::{AssignmentPolicy, DispatchSnapshot, SnapshotSources};
use crate::error::HaulError;
use crate::logging::log_error;
use crate::models::{DelayCategory, Excavator, HaulingActivity, RoadSegment, Truck};
use crate::queue::{LoadingPointQueueManager, PromotionTicket};
use crate::registry::ReferenceCatalog;
use crate::state_machine::{
    CancelReason, CycleEvent, CycleResources, HaulCycleStateMachine, SealedCycle,
    StateMachineError,
};

/// Shared services every cycle task uses
#[derive(Clone)]
pub struct CycleServices {
    pub resources: CycleResources,
    pub catalog: Arc<dyn ReferenceCatalog>,
    pub queue: Arc<LoadingPointQueueManager>,
    pub policy: Arc<dyn AssignmentPolicy>,
    pub dispatch: DispatchConfig,
}

impl std::fmt::Debug for CycleServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleServices")
            .field("policy", &self.policy.name())
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

/// Everything decided at dispatch time for one cycle
#[derive(Debug, Clone)]
pub struct CyclePlan {
    pub activity: HaulingActivity,
    pub truck: Truck,
    pub excavator: Excavator,
    pub road: RoadSegment,
    pub requested_at: DateTime<Utc>,
    pub delays: DelayAttributor,
    pub timing: CycleTimingModel,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Sealed(Box<SealedCycle>),
    /// Admission or dispatch was refused; the truck stays IDLE
    NotStarted { truck_id: String, error: HaulError },
}

impl CycleOutcome {
    pub fn truck_id(&self) -> &str {
        match self {
            Self::Sealed(sealed) => &sealed.activity.truck_id,
            Self::NotStarted { truck_id, .. } => truck_id,
        }
    }

    pub fn sealed(self) -> Option<SealedCycle> {
        match self {
            Self::Sealed(sealed) => Some(*sealed),
            Self::NotStarted { .. } => None,
        }
    }
}

/// Cancellation sent to a running cycle, stamped with the instant it was
/// reported
#[derive(Debug, Clone, PartialEq)]
pub struct CancelRequest {
    pub reason: CancelReason,
    pub at: DateTime<Utc>,
}

impl CancelRequest {
    pub fn new(reason: CancelReason, at: DateTime<Utc>) -> Self {
        Self { reason, at }
    }
}

/// Why a running cycle stopped early
#[derive(Debug)]
enum CycleAbort {
    /// `at` is set when the cancel came from outside the cycle
    Cancelled {
        reason: CancelReason,
        at: Option<DateTime<Utc>>,
    },
    Failed(HaulError),
}

impl From<HaulError> for CycleAbort {
    fn from(error: HaulError) -> Self {
        Self::Failed(error)
    }
}

impl From<StateMachineError> for CycleAbort {
    fn from(error: StateMachineError) -> Self {
        Self::Failed(error.into())
    }
}

pub struct CycleRunner {
    services: CycleServices,
    cancel: watch::Receiver<Option<CancelRequest>>,
}

impl CycleRunner {
    pub fn new(services: CycleServices, cancel: watch::Receiver<Option<CancelRequest>>) -> Self {
        Self { services, cancel }
    }

    /// Run the cycle to a terminal state. Never returns an error: faults end
    /// the cycle as CANCELLED.
    pub async fn run(mut self, plan: CyclePlan) -> CycleOutcome {
        let CyclePlan {
            activity,
            truck,
            excavator,
            road,
            requested_at,
            mut delays,
            mut timing,
        } = plan;

        let truck_id = activity.truck_id.clone();
        let loading_point_id = activity.loading_point_id.clone();
        let mut machine =
            HaulCycleStateMachine::new(activity, truck.capacity, self.services.resources.clone());

        let admission = match self
            .services
            .queue
            .admit(&truck_id, &loading_point_id, requested_at)
            .await
        {
            Ok(admission) => admission,
            Err(error) => return CycleOutcome::NotStarted { truck_id, error },
        };

        if let Err(error) = machine
            .transition(CycleEvent::Dispatch {
                admitted: admission.admitted,
                at: requested_at,
            })
            .await
        {
            if let Err(withdraw_error) = self
                .services
                .queue
                .withdraw(&loading_point_id, &truck_id, requested_at)
                .await
            {
                warn!(truck_id = %truck_id, error = %withdraw_error, "Failed to withdraw refused truck");
            }
            return CycleOutcome::NotStarted {
                truck_id,
                error: error.into(),
            };
        }

        info!(
            truck_id = %truck_id,
            activity_number = %machine.activity().activity_number,
            loading_point_id = %loading_point_id,
            admitted = admission.admitted,
            queue_position = admission.queue_position,
            "Cycle dispatched"
        );

        let services = self.services.clone();
        let result = {
            let drive = drive(
                &services,
                &mut machine,
                admission.ticket,
                &truck,
                &excavator,
                road,
                &mut delays,
                &mut timing,
            );
            tokio::select! {
                biased;
                request = wait_for_cancel(&mut self.cancel) => Err(CycleAbort::Cancelled {
                    reason: request.reason,
                    at: Some(request.at),
                }),
                result = drive => result,
            }
        };

        if let Err(abort) = result {
            let (reason, requested_at) = match abort {
                CycleAbort::Cancelled { reason, at } => (reason, at),
                CycleAbort::Failed(error) => {
                    log_error(
                        "cycle_runner",
                        "drive",
                        &error.to_string(),
                        Some(&machine.activity().activity_number),
                    );
                    (CancelReason::Fatal(error.to_string()), None)
                }
            };
            abort_cycle(&services, &mut machine, reason, requested_at).await;
        }

        match machine.seal() {
            Ok(sealed) => CycleOutcome::Sealed(Box::new(sealed)),
            Err(error) => CycleOutcome::NotStarted {
                truck_id,
                error: error.into(),
            },
        }
    }
}

async fn wait_for_cancel(cancel: &mut watch::Receiver<Option<CancelRequest>>) -> CancelRequest {
    loop {
        if let Some(request) = cancel.borrow_and_update().clone() {
            return request;
        }
        if cancel.changed().await.is_err() {
            // Sender gone: nobody can cancel any more
            std::future::pending::<()>().await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    services: &CycleServices,
    machine: &mut HaulCycleStateMachine,
    ticket: Option<PromotionTicket>,
    truck: &Truck,
    excavator: &Excavator,
    mut road: RoadSegment,
    delays: &mut DelayAttributor,
    timing: &mut CycleTimingModel,
) -> Result<(), CycleAbort> {
    let activity_id = machine.activity().id;
    let queued_at = cursor(machine)?;

    // IN_QUEUE
    let queue_delay = delays.evaluate(machine.activity(), DelayPhase::InQueue);
    let queue_delay_minutes = queue_delay.delay_minutes;
    machine
        .attach_delay(DelayPhase::InQueue, queue_delay, queued_at)
        .await?;

    let mut loading_start = queued_at;
    if let Some(ticket) = ticket {
        loading_start = ticket.promoted().await?.max(queued_at);
        machine
            .transition(CycleEvent::Promote { at: loading_start })
            .await?;
    }

    let freed_at = services
        .resources
        .reservations
        .reserve_pair_within(
            &machine.activity().excavator_id,
            &machine.activity().operator_id,
            activity_id,
            services.dispatch.reservation_wait(),
        )
        .await?;

    if let Some(freed_at) = freed_at {
        loading_start = loading_start.max(freed_at);
    }
    machine
        .transition(CycleEvent::StartLoading {
            at: loading_start + Duration::minutes(queue_delay_minutes),
        })
        .await?;

    // LOADING
    let loading_minutes = timing.loading_minutes(truck, excavator);
    pace(services, loading_minutes).await;
    let load_factor = timing.sample_load_factor();
    let departure = cursor(machine)? + Duration::minutes(loading_minutes);
    machine
        .transition(CycleEvent::CompleteLoading {
            load_factor,
            at: departure,
        })
        .await?;
    let departure = cursor(machine)?;
    services
        .queue
        .release(&machine.activity().loading_point_id, &truck.id, departure)
        .await?;

    // HAULING
    let haul_delay = delays.evaluate(machine.activity(), DelayPhase::Hauling);
    let mut held_minutes = haul_delay.delay_minutes;
    machine
        .attach_delay(DelayPhase::Hauling, haul_delay, departure)
        .await?;

    held_minutes += secure_headroom(services, machine, &mut road, delays, departure).await?;

    let haul_minutes = timing.haul_minutes(truck, &road);
    pace(services, haul_minutes + held_minutes).await;
    machine
        .transition(CycleEvent::ArriveAtDump {
            at: departure + Duration::minutes(haul_minutes + held_minutes),
        })
        .await?;

    // DUMPING
    let dumping_minutes = timing.dumping_minutes(machine.activity().load_weight);
    pace(services, dumping_minutes).await;
    let dumped_at = cursor(machine)? + Duration::minutes(dumping_minutes);
    machine.transition(CycleEvent::CompleteDump { at: dumped_at }).await?;

    // RETURNING
    let return_minutes = timing.return_minutes(truck, &road);
    pace(services, return_minutes).await;
    machine.record_fuel(timing.fuel_consumed(truck, road.distance))?;
    let returned_at = cursor(machine)? + Duration::minutes(return_minutes);
    machine
        .transition(CycleEvent::ReturnToPool { at: returned_at })
        .await?;

    Ok(())
}

/// Reserve dumping headroom for the load, rerouting or holding for capacity
/// when the assigned point is full. Returns the minutes spent on hold.
async fn secure_headroom(
    services: &CycleServices,
    machine: &mut HaulCycleStateMachine,
    road: &mut RoadSegment,
    delays: &DelayAttributor,
    departure: DateTime<Utc>,
) -> Result<i64, CycleAbort> {
    let activity_id = machine.activity().id;
    let load = machine.activity().load_weight;
    let mut held_minutes = 0;
    let mut retries = 0;

    loop {
        let dumping_point_id = machine.activity().dumping_point_id.clone();
        match services
            .resources
            .stock
            .try_reserve_headroom(&dumping_point_id, activity_id, load)
        {
            Ok(()) => return Ok(held_minutes),
            Err(error) if error.is_recoverable() => {
                debug!(
                    activity_number = %machine.activity().activity_number,
                    dumping_point_id = %dumping_point_id,
                    error = %error,
                    "Dumping point has no headroom"
                );
            }
            Err(error) => return Err(error.into()),
        }

        let snapshot = DispatchSnapshot::capture(
            &SnapshotSources {
                registry: &services.resources.registry,
                catalog: services.catalog.as_ref(),
                stock: &services.resources.stock,
                queue: &services.queue,
                reservations: &services.resources.reservations,
            },
            machine.activity().shift,
            Vec::new(),
            Vec::new(),
            Default::default(),
        );

        if let Some(reroute) = services
            .policy
            .alternate_dumping_point(machine.activity(), load, &snapshot)
        {
            machine
                .transition(CycleEvent::Reroute {
                    dumping_point_id: reroute.dumping_point_id.clone(),
                    road_segment_id: reroute.road_segment.id.clone(),
                    distance: reroute.road_segment.distance,
                    at: departure,
                })
                .await?;
            *road = reroute.road_segment;
            continue;
        }

        if retries >= services.dispatch.dump_headroom_retries {
            return Err(CycleAbort::Cancelled {
                reason: CancelReason::CapacityExhausted { dumping_point_id },
                at: None,
            });
        }
        retries += 1;

        let wait = services.dispatch.dump_headroom_wait_minutes;
        let hold = delays.forced(DelayPhase::DumpHold, DelayCategory::Queue, wait)?;
        machine
            .attach_delay(DelayPhase::DumpHold, hold, departure + Duration::minutes(held_minutes))
            .await?;
        held_minutes += wait;

        // Give other cycles a chance to commit or reclaim stock
        tokio::time::sleep(services.dispatch.reservation_wait()).await;
    }
}

/// Cancel from whatever phase the cycle reached and give everything back.
/// The open phase closes at the reported instant, never before the cycle's
/// own clock.
async fn abort_cycle(
    services: &CycleServices,
    machine: &mut HaulCycleStateMachine,
    reason: CancelReason,
    requested_at: Option<DateTime<Utc>>,
) {
    let at = match (machine.last_instant(), requested_at) {
        (Some(cursor), Some(requested)) => cursor.max(requested),
        (cursor, requested) => cursor.or(requested).unwrap_or_else(Utc::now),
    };
    let activity = machine.activity().clone();

    if !machine.phase().is_terminal() {
        if let Err(error) = services
            .queue
            .withdraw(&activity.loading_point_id, &activity.truck_id, at)
            .await
        {
            warn!(truck_id = %activity.truck_id, error = %error, "Queue withdrawal failed during cancel");
        }

        if let Err(error) = machine.transition(CycleEvent::Cancel { reason, at }).await {
            log_error(
                "cycle_runner",
                "cancel",
                &error.to_string(),
                Some(&activity.activity_number),
            );
        }
    }

    // Idempotent; covers a cancel transition that failed part way
    services.resources.reservations.release_all(activity.id, at);
    services.resources.stock.cancel_reservation(activity.id);
}

fn cursor(machine: &HaulCycleStateMachine) -> Result<DateTime<Utc>, CycleAbort> {
    machine.last_instant().ok_or_else(|| {
        CycleAbort::Failed(HaulError::Internal(format!(
            "cycle {} has no recorded instant",
            machine.activity().activity_number
        )))
    })
}

/// Sleep in proportion to simulated minutes when a real-time factor is set
async fn pace(services: &CycleServices, minutes: i64) {
    let factor = services.dispatch.real_time_factor;
    if factor > 0.0 && minutes > 0 {
        let seconds = minutes as f64 * 60.0 * factor;
        tokio::time::sleep(std::time::Duration::from_secs_f64(seconds)).await;
    }
}
