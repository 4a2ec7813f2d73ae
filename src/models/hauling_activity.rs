//! # Hauling Activity
//!
//! The record of one truck cycle. Created when the truck asks for a queue slot,
//! mutated in place by the cycle state machine and sealed as COMPLETED or
//! CANCELLED. Once sealed it is never modified again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::production::round2;
use super::shift::Shift;
use super::{
    DelayReasonId, DumpingPointId, ExcavatorId, LoadingPointId, OperatorId, RoadSegmentId, TruckId,
};

/// Activity status. `Delayed` is an overlay reported while a delay extends the
/// current phase; the underlying phase is tracked by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    InQueue,
    Loading,
    Hauling,
    Dumping,
    Returning,
    Completed,
    Cancelled,
    Delayed,
}

impl ActivityStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InQueue => "IN_QUEUE",
            Self::Loading => "LOADING",
            Self::Hauling => "HAULING",
            Self::Dumping => "DUMPING",
            Self::Returning => "RETURNING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Delayed => "DELAYED",
        };
        f.write_str(name)
    }
}

/// Resources and route chosen for a truck by the assignment policy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub loading_point_id: LoadingPointId,
    pub excavator_id: ExcavatorId,
    pub operator_id: OperatorId,
    pub dumping_point_id: DumpingPointId,
    pub road_segment_id: RoadSegmentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaulingActivity {
    pub id: Uuid,
    pub activity_number: String,
    pub truck_id: TruckId,
    pub excavator_id: ExcavatorId,
    pub operator_id: OperatorId,
    pub loading_point_id: LoadingPointId,
    pub dumping_point_id: DumpingPointId,
    pub road_segment_id: RoadSegmentId,
    pub mining_site_id: String,
    pub shift: Shift,

    pub queue_start_time: Option<DateTime<Utc>>,
    pub queue_end_time: Option<DateTime<Utc>>,
    pub loading_start_time: Option<DateTime<Utc>>,
    pub loading_end_time: Option<DateTime<Utc>>,
    pub departure_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub dumping_start_time: Option<DateTime<Utc>>,
    pub dumping_end_time: Option<DateTime<Utc>>,
    pub return_time: Option<DateTime<Utc>>,

    // Whole minutes
    pub queue_duration: Option<i64>,
    pub loading_duration: Option<i64>,
    pub hauling_duration: Option<i64>,
    pub dumping_duration: Option<i64>,
    pub return_duration: Option<i64>,
    pub total_cycle_time: Option<i64>,

    pub load_weight: f64,
    pub target_weight: f64,
    pub load_efficiency: f64,
    pub distance: f64,
    pub fuel_consumed: f64,

    pub status: ActivityStatus,
    pub is_delayed: bool,
    pub delay_minutes: i64,
    pub delay_reason_id: Option<DelayReasonId>,
    pub remarks: Option<String>,
}

impl HaulingActivity {
    /// Fresh record for a dispatch attempt. `target_weight` is the truck capacity.
    pub fn new(
        activity_number: impl Into<String>,
        truck_id: impl Into<String>,
        assignment: &Assignment,
        mining_site_id: impl Into<String>,
        shift: Shift,
        target_weight: f64,
        distance: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            activity_number: activity_number.into(),
            truck_id: truck_id.into(),
            excavator_id: assignment.excavator_id.clone(),
            operator_id: assignment.operator_id.clone(),
            loading_point_id: assignment.loading_point_id.clone(),
            dumping_point_id: assignment.dumping_point_id.clone(),
            road_segment_id: assignment.road_segment_id.clone(),
            mining_site_id: mining_site_id.into(),
            shift,
            queue_start_time: None,
            queue_end_time: None,
            loading_start_time: None,
            loading_end_time: None,
            departure_time: None,
            arrival_time: None,
            dumping_start_time: None,
            dumping_end_time: None,
            return_time: None,
            queue_duration: None,
            loading_duration: None,
            hauling_duration: None,
            dumping_duration: None,
            return_duration: None,
            total_cycle_time: None,
            load_weight: 0.0,
            target_weight,
            load_efficiency: 0.0,
            distance,
            fuel_consumed: 0.0,
            status: ActivityStatus::InQueue,
            is_delayed: false,
            delay_minutes: 0,
            delay_reason_id: None,
            remarks: None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Sum of the recorded phase durations
    pub fn phase_duration_sum(&self) -> i64 {
        [
            self.queue_duration,
            self.loading_duration,
            self.hauling_duration,
            self.dumping_duration,
            self.return_duration,
        ]
        .iter()
        .flatten()
        .sum()
    }

    /// Sets the load and the derived efficiency (percent of target, 2dp).
    pub fn record_load(&mut self, load_weight: f64) {
        self.load_weight = load_weight;
        self.load_efficiency = if self.target_weight > 0.0 {
            round2(load_weight / self.target_weight * 100.0)
        } else {
            0.0
        };
    }

    /// Adds delay minutes. The most recent reason wins.
    pub fn add_delay(&mut self, reason_id: impl Into<String>, minutes: i64) {
        if minutes <= 0 {
            return;
        }
        self.is_delayed = true;
        self.delay_minutes += minutes;
        self.delay_reason_id = Some(reason_id.into());
    }

    /// `is_delayed`, `delay_reason_id` and `delay_minutes > 0` agree
    pub fn delay_fields_consistent(&self) -> bool {
        self.is_delayed == self.delay_reason_id.is_some() && self.is_delayed == (self.delay_minutes > 0)
    }

    pub fn assignment(&self) -> Assignment {
        Assignment {
            loading_point_id: self.loading_point_id.clone(),
            excavator_id: self.excavator_id.clone(),
            operator_id: self.operator_id.clone(),
            dumping_point_id: self.dumping_point_id.clone(),
            road_segment_id: self.road_segment_id.clone(),
        }
    }
}
