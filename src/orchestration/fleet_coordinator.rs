//! # Fleet Coordinator
//!
//! Dispatch loop for the whole fleet. On each tick every idle truck gets an
//! assignment from the policy and its own cycle task; sealed cycles are fed to
//! the metrics aggregator. Equipment reports arrive here and are turned into
//! cancellations of the affected cycles.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::FleetConfig;
use crate::constants::events;
use crate::cycle::{
    CancelRequest, CycleOutcome, CyclePlan, CycleRunner, CycleServices, CycleTimingModel,
    SystemTimeProvider, TimeProvider,
};
use crate::delay::{DelayAttributor, DelayPolicy};
use crate::dispatch::{AssignmentPolicy, DefaultAssignmentPolicy, DispatchSnapshot, SnapshotSources};
use crate::error::{HaulError, Result};
use crate::events::EventPublisher;
use crate::logging::{log_dispatch_operation, log_error};
use crate::metrics::MetricsAggregator;
use crate::models::{
    ActivityNumberGenerator, Assignment, EquipmentStatusLogEntry, ExcavatorStatus,
    HaulingActivity, Shift, TruckStatus,
};
use crate::queue::LoadingPointQueueManager;
use crate::registry::{FleetParts, ReferenceCatalog, ReservationBook};
use crate::repository::HaulRepository;
use crate::state_machine::{CancelReason, CycleResources};

/// Truck statuses in which a cycle still depends on its excavator
const WAITING_ON_EXCAVATOR: &[TruckStatus] = &[
    TruckStatus::Idle,
    TruckStatus::InQueue,
    TruckStatus::Standby,
    TruckStatus::Loading,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchedCycle {
    pub truck_id: String,
    pub activity_id: Uuid,
    pub activity_number: String,
    pub assignment: Assignment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTruck {
    pub truck_id: String,
    pub reason: String,
}

/// Result of one dispatch tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub at: DateTime<Utc>,
    pub dispatched: Vec<DispatchedCycle>,
    pub skipped: Vec<SkippedTruck>,
}

/// Running totals since the coordinator was built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStats {
    pub ticks: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub not_started: u64,
    pub aggregation_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    dispatched: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    not_started: AtomicU64,
    aggregation_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CoordinatorStats {
        CoordinatorStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            not_started: self.not_started.load(Ordering::Relaxed),
            aggregation_failures: self.aggregation_failures.load(Ordering::Relaxed),
        }
    }
}

/// Handle on a running cycle task
#[derive(Debug)]
struct CycleHandle {
    activity_id: Uuid,
    activity_number: String,
    excavator_id: String,
    operator_id: String,
    cancel: watch::Sender<Option<CancelRequest>>,
}

pub struct FleetCoordinator {
    config: FleetConfig,
    services: CycleServices,
    repository: Arc<dyn HaulRepository>,
    aggregator: Arc<MetricsAggregator>,
    delays: DelayAttributor,
    timing: CycleTimingModel,
    clock: Arc<dyn TimeProvider>,
    numbers: ActivityNumberGenerator,
    in_flight: Arc<DashMap<String, CycleHandle>>,
    /// Assignment sequence per loading point; lower means less recently used
    usage: Mutex<HashMap<String, u64>>,
    usage_seq: AtomicU64,
    tasks: AsyncMutex<JoinSet<()>>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for FleetCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetCoordinator")
            .field("policy", &self.services.policy.name())
            .field("in_flight", &self.in_flight.len())
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

impl FleetCoordinator {
    /// Wire a coordinator over a fleet with the default policy and wall clock
    pub fn new(
        config: FleetConfig,
        parts: FleetParts,
        repository: Arc<dyn HaulRepository>,
    ) -> Result<Self> {
        Self::with_components(
            config,
            parts,
            repository,
            Arc::new(DefaultAssignmentPolicy::new()),
            Arc::new(SystemTimeProvider),
        )
    }

    pub fn with_components(
        config: FleetConfig,
        parts: FleetParts,
        repository: Arc<dyn HaulRepository>,
        policy: Arc<dyn AssignmentPolicy>,
        clock: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        let delay_policy = DelayPolicy::from_config(&config.delay);
        delay_policy.validate()?;

        let catalog: Arc<dyn ReferenceCatalog> = parts.catalog;
        let delays = DelayAttributor::new(delay_policy, catalog.delay_reasons());
        let queue = Arc::new(LoadingPointQueueManager::from_catalog(
            catalog.as_ref(),
            Arc::clone(&repository),
        ));
        let aggregator = Arc::new(MetricsAggregator::new(
            Arc::clone(&repository),
            Arc::clone(&parts.registry),
            config.production.clone(),
        ));

        let services = CycleServices {
            resources: CycleResources {
                registry: parts.registry,
                reservations: Arc::new(ReservationBook::new()),
                stock: parts.stock,
                publisher: EventPublisher::default(),
            },
            catalog,
            queue,
            policy,
            dispatch: config.dispatch.clone(),
        };

        info!(
            policy = services.policy.name(),
            delay_seed = config.delay.seed,
            cycle_seed = config.cycle.seed,
            "Fleet coordinator ready"
        );

        Ok(Self {
            timing: CycleTimingModel::new(config.cycle.clone()),
            config,
            services,
            repository,
            aggregator,
            delays,
            clock,
            numbers: ActivityNumberGenerator::new(),
            in_flight: Arc::new(DashMap::new()),
            usage: Mutex::new(HashMap::new()),
            usage_seq: AtomicU64::new(0),
            tasks: AsyncMutex::new(JoinSet::new()),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.services.resources.publisher
    }

    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }

    pub fn queue(&self) -> &Arc<LoadingPointQueueManager> {
        &self.services.queue
    }

    pub fn resources(&self) -> &CycleResources {
        &self.services.resources
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.counters.snapshot()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Activity id of the cycle a truck is running, if any
    pub fn active_cycle(&self, truck_id: &str) -> Option<Uuid> {
        self.in_flight.get(truck_id).map(|handle| handle.activity_id)
    }

    /// Assign and launch a cycle for every idle truck, up to the per-tick limit
    #[instrument(skip(self))]
    pub async fn dispatch_tick(&self) -> Result<DispatchReport> {
        let now = self.clock.now();
        let shift = Shift::at(now);
        self.counters.ticks.fetch_add(1, Ordering::Relaxed);

        let candidates: Vec<String> = self
            .services
            .resources
            .registry
            .idle_trucks()
            .into_iter()
            .filter(|truck_id| !self.in_flight.contains_key(truck_id))
            .take(self.config.dispatch.max_dispatch_per_tick)
            .collect();

        // Operators stay with their truck for the whole cycle
        let mut proposed_operators: Vec<String> = self
            .in_flight
            .iter()
            .map(|handle| handle.operator_id.clone())
            .collect();
        let mut proposed_excavators: Vec<String> = Vec::new();

        let mut report = DispatchReport {
            at: now,
            dispatched: Vec::new(),
            skipped: Vec::new(),
        };

        for truck_id in candidates {
            let usage = self.usage.lock().clone();
            let snapshot = DispatchSnapshot::capture(
                &self.snapshot_sources(),
                shift,
                proposed_excavators.iter().cloned(),
                proposed_operators.iter().cloned(),
                usage,
            );

            let assignment = match self.services.policy.assign(&truck_id, &snapshot) {
                Ok(assignment) => assignment,
                Err(error) => {
                    log_dispatch_operation("assign", Some(&truck_id), "skipped", Some(&error.to_string()));
                    report.skipped.push(SkippedTruck {
                        truck_id,
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            match self.launch(&truck_id, assignment.clone(), shift, now).await {
                Ok((activity_id, activity_number)) => {
                    proposed_excavators.push(assignment.excavator_id.clone());
                    proposed_operators.push(assignment.operator_id.clone());
                    self.mark_used(&assignment.loading_point_id);
                    report.dispatched.push(DispatchedCycle {
                        truck_id,
                        activity_id,
                        activity_number,
                        assignment,
                    });
                }
                Err(error) => {
                    log_error("fleet_coordinator", error.kind(), &error.to_string(), Some(&truck_id));
                    report.skipped.push(SkippedTruck {
                        truck_id,
                        reason: error.to_string(),
                    });
                }
            }
        }

        log_dispatch_operation(
            "tick",
            None,
            "completed",
            Some(&format!(
                "dispatched={} skipped={} in_flight={}",
                report.dispatched.len(),
                report.skipped.len(),
                self.in_flight.len()
            )),
        );

        if let Err(error) = self
            .publisher()
            .publish(
                events::DISPATCH_TICK_COMPLETED,
                json!({
                    "at": now.to_rfc3339(),
                    "dispatched": report.dispatched.len(),
                    "skipped": report.skipped.len(),
                }),
            )
            .await
        {
            warn!(error = %error, "Failed to publish tick event");
        }

        Ok(report)
    }

    /// Build the plan for one assignment and spawn its cycle task
    async fn launch(
        &self,
        truck_id: &str,
        assignment: Assignment,
        shift: Shift,
        now: DateTime<Utc>,
    ) -> Result<(Uuid, String)> {
        let registry = &self.services.resources.registry;
        let truck = registry.truck(truck_id)?;
        let excavator = registry.excavator(&assignment.excavator_id)?;
        let road = self
            .services
            .catalog
            .road_segment(&assignment.road_segment_id)
            .ok_or_else(|| HaulError::not_found("road segment", &assignment.road_segment_id))?;
        let mining_site_id = self
            .services
            .catalog
            .loading_point(&assignment.loading_point_id)
            .map(|point| point.mining_site_id)
            .unwrap_or_else(|| self.config.production.mining_site_id.clone());

        let activity_number = self.numbers.next(now.date_naive());
        let activity = HaulingActivity::new(
            activity_number.clone(),
            truck_id,
            &assignment,
            mining_site_id,
            shift,
            truck.capacity,
            road.distance,
        );
        let activity_id = activity.id;

        let plan = CyclePlan {
            delays: self.delays.fork(&activity_number),
            timing: self.timing.fork(&activity_number),
            activity,
            truck,
            excavator,
            road,
            requested_at: now,
        };

        let (cancel, cancel_rx) = watch::channel(None);
        self.in_flight.insert(
            truck_id.to_string(),
            CycleHandle {
                activity_id,
                activity_number: activity_number.clone(),
                excavator_id: assignment.excavator_id,
                operator_id: assignment.operator_id,
                cancel,
            },
        );
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let runner = CycleRunner::new(self.services.clone(), cancel_rx);
        let aggregator = Arc::clone(&self.aggregator);
        let in_flight = Arc::clone(&self.in_flight);
        let counters = Arc::clone(&self.counters);
        let truck_key = truck_id.to_string();

        self.tasks.lock().await.spawn(async move {
            let outcome = runner.run(plan).await;
            settle(outcome, &aggregator, &counters).await;
            in_flight.remove_if(&truck_key, |_, handle| handle.activity_id == activity_id);
        });

        debug!(truck_id = %truck_id, activity_number = %activity_number, "Cycle task spawned");
        Ok((activity_id, activity_number))
    }

    /// Wait for every running cycle to reach a terminal state
    pub async fn wait_for_idle(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(joined) = tasks.join_next().await {
            if let Err(join_error) = joined {
                error!(error = %join_error, "Cycle task panicked");
            }
        }
    }

    /// Tick on the configured interval until `shutdown` flips to true, then
    /// drain the running cycles.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<CoordinatorStats> {
        let mut interval = tokio::time::interval(self.config.dispatch.tick_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            tick_interval_ms = self.config.dispatch.tick_interval_ms,
            "Starting dispatch loop"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(error) = self.dispatch_tick().await {
                        log_error("fleet_coordinator", "dispatch_tick", &error.to_string(), None);
                    }
                    self.reap_finished().await;
                }
            }
        }

        info!(in_flight = self.in_flight.len(), "Dispatch loop stopping, draining cycles");
        self.wait_for_idle().await;
        let stats = self.stats();
        info!(
            ticks = stats.ticks,
            completed = stats.completed,
            cancelled = stats.cancelled,
            "Dispatch loop stopped"
        );
        Ok(stats)
    }

    /// Collect tasks that already finished without blocking on the rest
    async fn reap_finished(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(joined) = tasks.try_join_next() {
            if let Err(join_error) = joined {
                error!(error = %join_error, "Cycle task panicked");
            }
        }
    }

    /// Take an excavator out of service and cancel every cycle still waiting
    /// on it. Returns the cancelled activity ids.
    #[instrument(skip(self))]
    pub async fn report_equipment_breakdown(
        &self,
        excavator_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let registry = &self.services.resources.registry;
        let previous = registry.set_excavator_status(excavator_id, ExcavatorStatus::Breakdown)?;
        if previous == ExcavatorStatus::Breakdown {
            debug!(excavator_id = %excavator_id, "Excavator already broken down");
            return Ok(Vec::new());
        }

        self.repository
            .append_status_log(
                EquipmentStatusLogEntry::excavator(excavator_id, previous, ExcavatorStatus::Breakdown, at)
                    .with_reason("breakdown reported"),
            )
            .await?;

        let reason = CancelReason::EquipmentBreakdown {
            excavator_id: excavator_id.to_string(),
            previous_status: previous,
        };
        let mut cancelled = Vec::new();
        for handle in self.in_flight.iter() {
            if handle.excavator_id != excavator_id {
                continue;
            }
            let status = registry.truck_status(handle.key())?;
            if WAITING_ON_EXCAVATOR.contains(&status) {
                handle
                    .cancel
                    .send_replace(Some(CancelRequest::new(reason.clone(), at)));
                info!(
                    truck_id = %handle.key(),
                    activity_number = %handle.activity_number,
                    excavator_id = %excavator_id,
                    "Cancelling cycle after excavator breakdown"
                );
                cancelled.push(handle.activity_id);
            }
        }

        if let Err(error) = self
            .publisher()
            .publish(
                events::EQUIPMENT_BREAKDOWN,
                json!({
                    "excavator_id": excavator_id,
                    "previous_status": previous.to_string(),
                    "cancelled_cycles": cancelled.len(),
                    "at": at.to_rfc3339(),
                }),
            )
            .await
        {
            warn!(error = %error, "Failed to publish breakdown event");
        }

        Ok(cancelled)
    }

    /// Return a repaired excavator to service
    pub async fn report_equipment_repaired(&self, excavator_id: &str, at: DateTime<Utc>) -> Result<()> {
        let registry = &self.services.resources.registry;
        let swapped = registry.compare_and_set_excavator_status(
            excavator_id,
            ExcavatorStatus::Breakdown,
            ExcavatorStatus::Active,
        )?;
        if !swapped {
            let actual = registry.excavator_status(excavator_id)?;
            return Err(HaulError::StatusConflict {
                equipment: format!("excavator {excavator_id}"),
                expected: ExcavatorStatus::Breakdown.to_string(),
                actual: actual.to_string(),
            });
        }

        self.repository
            .append_status_log(
                EquipmentStatusLogEntry::excavator(
                    excavator_id,
                    ExcavatorStatus::Breakdown,
                    ExcavatorStatus::Active,
                    at,
                )
                .with_reason("repair completed"),
            )
            .await?;

        if let Err(error) = self
            .publisher()
            .publish(
                events::EQUIPMENT_REPAIRED,
                json!({ "excavator_id": excavator_id, "at": at.to_rfc3339() }),
            )
            .await
        {
            warn!(error = %error, "Failed to publish repair event");
        }
        Ok(())
    }

    /// Manually cancel the cycle a truck is running, as of the coordinator
    /// clock. Returns false when the truck has no cycle in flight.
    pub fn cancel_cycle(&self, truck_id: &str, reason: impl Into<String>) -> bool {
        match self.in_flight.get(truck_id) {
            Some(handle) => {
                let request = CancelRequest::new(
                    CancelReason::ManualOverride(reason.into()),
                    self.clock.now(),
                );
                handle.cancel.send_replace(Some(request));
                true
            }
            None => false,
        }
    }

    /// Remove stock from a dumping point, freeing headroom for held cycles.
    /// Returns the new stock level.
    pub fn reclaim_stock(&self, dumping_point_id: &str, tonnes: f64) -> Result<f64> {
        let stock = self
            .services
            .resources
            .stock
            .draw_down(dumping_point_id, tonnes)?;
        info!(dumping_point_id = %dumping_point_id, tonnes, stock, "Stock reclaimed");
        Ok(stock)
    }

    fn snapshot_sources(&self) -> SnapshotSources<'_> {
        SnapshotSources {
            registry: &self.services.resources.registry,
            catalog: self.services.catalog.as_ref(),
            stock: &self.services.resources.stock,
            queue: &self.services.queue,
            reservations: &self.services.resources.reservations,
        }
    }

    fn mark_used(&self, loading_point_id: &str) {
        let seq = self.usage_seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.usage.lock().insert(loading_point_id.to_string(), seq);
    }
}

/// Hand a finished cycle to the aggregator and count the outcome
async fn settle(outcome: CycleOutcome, aggregator: &MetricsAggregator, counters: &Counters) {
    match outcome {
        CycleOutcome::Sealed(sealed) => {
            if sealed.is_completed() {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            } else {
                counters.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            if let Err(error) = aggregator.process(&sealed).await {
                counters.aggregation_failures.fetch_add(1, Ordering::Relaxed);
                log_error(
                    "fleet_coordinator",
                    "aggregate",
                    &error.to_string(),
                    Some(&sealed.activity.activity_number),
                );
            }
        }
        CycleOutcome::NotStarted { truck_id, error } => {
            counters.not_started.fetch_add(1, Ordering::Relaxed);
            log_dispatch_operation("start", Some(&truck_id), "not_started", Some(&error.to_string()));
        }
    }
}
