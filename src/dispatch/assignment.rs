//! # Dispatch Assignment Policy
//!
//! Chooses loading point, excavator, operator, dumping point and haul road for
//! an idle truck from a point-in-time [`DispatchSnapshot`]. The default policy
//! is deterministic for a given snapshot.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::constants::status_groups;
use crate::error::{HaulError, Result};
use crate::models::{
    Assignment, DumpingPoint, Excavator, HaulingActivity, LoadingPoint, Operator, RoadSegment,
    Shift,
};
use crate::queue::LoadingPointQueueManager;
use crate::registry::{EquipmentRegistry, ReferenceCatalog, ReservationBook, StockLedger, StockLevel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingPointView {
    pub point: LoadingPoint,
    pub occupancy: usize,
    pub backlog: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpingPointView {
    pub point: DumpingPoint,
    pub level: StockLevel,
}

/// Owned, point-in-time view of everything the policy may consult
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSnapshot {
    pub shift: Option<Shift>,
    pub loading_points: Vec<LoadingPointView>,
    pub dumping_points: Vec<DumpingPointView>,
    pub roads: Vec<RoadSegment>,
    pub excavators: Vec<Excavator>,
    pub operators: Vec<Operator>,
    /// Reserved or already proposed to an in-flight cycle
    pub busy_excavators: HashSet<String>,
    pub busy_operators: HashSet<String>,
    /// Dispatch sequence of the last assignment per loading point
    pub loading_point_usage: HashMap<String, u64>,
}

/// Sources a snapshot is captured from
pub struct SnapshotSources<'a> {
    pub registry: &'a EquipmentRegistry,
    pub catalog: &'a dyn ReferenceCatalog,
    pub stock: &'a StockLedger,
    pub queue: &'a LoadingPointQueueManager,
    pub reservations: &'a ReservationBook,
}

impl DispatchSnapshot {
    pub fn capture(
        sources: &SnapshotSources<'_>,
        shift: Shift,
        proposed_excavators: impl IntoIterator<Item = String>,
        proposed_operators: impl IntoIterator<Item = String>,
        loading_point_usage: HashMap<String, u64>,
    ) -> Self {
        let loading_points = sources
            .catalog
            .loading_points()
            .into_iter()
            .map(|point| LoadingPointView {
                occupancy: sources.queue.occupancy(&point.id),
                backlog: sources.queue.backlog_len(&point.id),
                point,
            })
            .collect();

        let levels = sources.stock.snapshot();
        let dumping_points = sources
            .catalog
            .dumping_points()
            .into_iter()
            .map(|point| {
                let level = levels.get(&point.id).copied().unwrap_or(StockLevel {
                    capacity: point.capacity,
                    stock: point.current_stock,
                    reserved: 0.0,
                });
                DumpingPointView { point, level }
            })
            .collect();

        let mut busy_excavators = sources.reservations.reserved_excavators();
        busy_excavators.extend(proposed_excavators);
        let mut busy_operators = sources.reservations.reserved_operators();
        busy_operators.extend(proposed_operators);

        Self {
            shift: Some(shift),
            loading_points,
            dumping_points,
            roads: sources.catalog.road_segments(),
            excavators: sources.registry.excavators(),
            operators: sources.registry.operators(),
            busy_excavators,
            busy_operators,
            loading_point_usage,
        }
    }

    fn shortest_road(&self, loading_point_id: &str, dumping_point_id: &str) -> Option<&RoadSegment> {
        self.roads
            .iter()
            .filter(|road| road.connects(loading_point_id, dumping_point_id))
            .min_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)))
    }

    /// Active dumping points reachable from a loading point, best first:
    /// lowest stock ratio, then shortest road, then id.
    fn ranked_dumping_points(&self, loading_point_id: &str) -> Vec<(&DumpingPointView, &RoadSegment)> {
        let mut candidates: Vec<(&DumpingPointView, &RoadSegment)> = self
            .dumping_points
            .iter()
            .filter(|view| view.point.is_active)
            .filter_map(|view| {
                self.shortest_road(loading_point_id, &view.point.id)
                    .map(|road| (view, road))
            })
            .collect();

        candidates.sort_by(|(a, ra), (b, rb)| {
            a.level
                .ratio()
                .total_cmp(&b.level.ratio())
                .then_with(|| ra.distance.total_cmp(&rb.distance))
                .then_with(|| a.point.id.cmp(&b.point.id))
        });
        candidates
    }
}

/// Rerouting target for a held dump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reroute {
    pub dumping_point_id: String,
    pub road_segment: RoadSegment,
}

/// Strategy seam for resource and route selection
pub trait AssignmentPolicy: Send + Sync {
    /// Propose resources for an idle truck, or `NoAvailableResource`
    fn assign(&self, truck_id: &str, snapshot: &DispatchSnapshot) -> Result<Assignment>;

    /// Another active dumping point with headroom for `load`, reachable from
    /// the activity's loading point
    fn alternate_dumping_point(
        &self,
        activity: &HaulingActivity,
        load: f64,
        snapshot: &DispatchSnapshot,
    ) -> Option<Reroute>;

    fn name(&self) -> &str;
}

/// Least-recently-assigned loading point, stationed excavator first,
/// best-rated shift operator, emptiest reachable dumping point.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAssignmentPolicy;

impl DefaultAssignmentPolicy {
    pub fn new() -> Self {
        Self
    }

    fn pick_excavator<'a>(&self, loading_point_id: &str, snapshot: &'a DispatchSnapshot) -> Option<&'a Excavator> {
        let free = snapshot.excavators.iter().filter(|excavator| {
            status_groups::EXCAVATOR_LOADABLE_STATUSES.contains(&excavator.status)
                && !snapshot.busy_excavators.contains(&excavator.id)
        });

        // Excavators are already sorted by id
        let mut fallback = None;
        for excavator in free {
            if excavator.loading_point_id.as_deref() == Some(loading_point_id) {
                return Some(excavator);
            }
            fallback.get_or_insert(excavator);
        }
        fallback
    }

    fn pick_operator<'a>(&self, snapshot: &'a DispatchSnapshot) -> Option<&'a Operator> {
        let by_rating = |a: &&Operator, b: &&Operator| -> Ordering {
            b.rating.total_cmp(&a.rating).then_with(|| a.id.cmp(&b.id))
        };

        let free: Vec<&Operator> = snapshot
            .operators
            .iter()
            .filter(|operator| operator.can_drive_trucks() && !snapshot.busy_operators.contains(&operator.id))
            .collect();

        free.iter()
            .filter(|operator| Some(operator.shift) == snapshot.shift)
            .copied()
            .min_by(by_rating)
            .or_else(|| free.iter().copied().min_by(by_rating))
    }
}

impl AssignmentPolicy for DefaultAssignmentPolicy {
    fn assign(&self, truck_id: &str, snapshot: &DispatchSnapshot) -> Result<Assignment> {
        let operator = self
            .pick_operator(snapshot)
            .ok_or_else(|| HaulError::no_available_resource("operator"))?;

        let mut loading_points: Vec<&LoadingPointView> = snapshot
            .loading_points
            .iter()
            .filter(|view| view.point.is_active)
            .collect();
        if loading_points.is_empty() {
            return Err(HaulError::no_available_resource("loading point"));
        }
        loading_points.sort_by(|a, b| {
            let used_a = snapshot.loading_point_usage.get(&a.point.id).copied().unwrap_or(0);
            let used_b = snapshot.loading_point_usage.get(&b.point.id).copied().unwrap_or(0);
            used_a.cmp(&used_b).then_with(|| a.point.id.cmp(&b.point.id))
        });

        let mut missing = "excavator";
        for view in loading_points {
            let Some(excavator) = self.pick_excavator(&view.point.id, snapshot) else {
                missing = "excavator";
                continue;
            };
            let Some((dumping_point, road)) = snapshot.ranked_dumping_points(&view.point.id).into_iter().next()
            else {
                missing = "dumping point";
                continue;
            };

            debug!(
                truck_id = %truck_id,
                loading_point_id = %view.point.id,
                excavator_id = %excavator.id,
                operator_id = %operator.id,
                dumping_point_id = %dumping_point.point.id,
                road_segment_id = %road.id,
                policy = self.name(),
                "Assignment proposed"
            );

            return Ok(Assignment {
                loading_point_id: view.point.id.clone(),
                excavator_id: excavator.id.clone(),
                operator_id: operator.id.clone(),
                dumping_point_id: dumping_point.point.id.clone(),
                road_segment_id: road.id.clone(),
            });
        }

        Err(HaulError::no_available_resource(missing))
    }

    fn alternate_dumping_point(
        &self,
        activity: &HaulingActivity,
        load: f64,
        snapshot: &DispatchSnapshot,
    ) -> Option<Reroute> {
        snapshot
            .ranked_dumping_points(&activity.loading_point_id)
            .into_iter()
            .find(|(view, _)| view.point.id != activity.dumping_point_id && view.level.headroom() >= load)
            .map(|(view, road)| Reroute {
                dumping_point_id: view.point.id.clone(),
                road_segment: road.clone(),
            })
    }

    fn name(&self) -> &str {
        "LeastRecentlyAssigned"
    }
}
