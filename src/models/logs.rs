//! Append-only operational logs: queue movements and equipment status changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::equipment::{ExcavatorStatus, OperatorStatus, TruckStatus};
use super::{LoadingPointId, TruckId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueAction {
    /// Took a slot immediately
    Admitted,
    /// Placed in the backlog
    Queued,
    /// Moved from the backlog into a freed slot
    Promoted,
    /// Left its slot after loading
    Released,
    /// Removed on cancellation
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueLogEntry {
    pub loading_point_id: LoadingPointId,
    pub truck_id: TruckId,
    pub action: QueueAction,
    /// Occupancy plus backlog after the action
    pub queue_length: usize,
    /// Minutes between the request and this action
    pub waiting_time: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentRef {
    Truck(String),
    Excavator(String),
    Operator(String),
}

impl EquipmentRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Truck(id) | Self::Excavator(id) | Self::Operator(id) => id,
        }
    }
}

impl fmt::Display for EquipmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truck(id) => write!(f, "truck {id}"),
            Self::Excavator(id) => write!(f, "excavator {id}"),
            Self::Operator(id) => write!(f, "operator {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentStatus {
    Truck(TruckStatus),
    Excavator(ExcavatorStatus),
    Operator(OperatorStatus),
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truck(status) => write!(f, "{status}"),
            Self::Excavator(status) => write!(f, "{status}"),
            Self::Operator(status) => write!(f, "{status}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentStatusLogEntry {
    pub equipment: EquipmentRef,
    pub previous_status: EquipmentStatus,
    pub current_status: EquipmentStatus,
    pub status_reason: Option<String>,
    pub duration_minutes: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl EquipmentStatusLogEntry {
    pub fn truck(
        truck_id: impl Into<String>,
        previous: TruckStatus,
        current: TruckStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            equipment: EquipmentRef::Truck(truck_id.into()),
            previous_status: EquipmentStatus::Truck(previous),
            current_status: EquipmentStatus::Truck(current),
            status_reason: None,
            duration_minutes: None,
            timestamp,
        }
    }

    pub fn excavator(
        excavator_id: impl Into<String>,
        previous: ExcavatorStatus,
        current: ExcavatorStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            equipment: EquipmentRef::Excavator(excavator_id.into()),
            previous_status: EquipmentStatus::Excavator(previous),
            current_status: EquipmentStatus::Excavator(current),
            status_reason: None,
            duration_minutes: None,
            timestamp,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.status_reason = Some(reason.into());
        self
    }

    pub fn with_duration(mut self, minutes: i64) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }
}
