use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{ActivityStatus, TruckStatus};

/// Phase of one truck cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CyclePhase {
    /// Before dispatch
    #[default]
    Idle,
    InQueue,
    Loading,
    Hauling,
    Dumping,
    Returning,
    Completed,
    Cancelled,
}

impl CyclePhase {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Phases in which the truck is working a cycle
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::InQueue | Self::Loading | Self::Hauling | Self::Dumping | Self::Returning
        )
    }

    /// Truck status derived from the phase. A backlogged truck waits on
    /// STANDBY and does not count as IN_QUEUE.
    pub fn truck_status(&self, backlogged: bool) -> TruckStatus {
        match self {
            Self::Idle | Self::Completed | Self::Cancelled => TruckStatus::Idle,
            Self::InQueue if backlogged => TruckStatus::Standby,
            Self::InQueue => TruckStatus::InQueue,
            Self::Loading => TruckStatus::Loading,
            Self::Hauling => TruckStatus::Hauling,
            Self::Dumping => TruckStatus::Dumping,
            Self::Returning => TruckStatus::Returning,
        }
    }

    /// Status recorded on the activity while in this phase
    pub fn activity_status(&self) -> ActivityStatus {
        match self {
            Self::Idle | Self::InQueue => ActivityStatus::InQueue,
            Self::Loading => ActivityStatus::Loading,
            Self::Hauling => ActivityStatus::Hauling,
            Self::Dumping => ActivityStatus::Dumping,
            Self::Returning => ActivityStatus::Returning,
            Self::Completed => ActivityStatus::Completed,
            Self::Cancelled => ActivityStatus::Cancelled,
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::InQueue => write!(f, "in_queue"),
            Self::Loading => write!(f, "loading"),
            Self::Hauling => write!(f, "hauling"),
            Self::Dumping => write!(f, "dumping"),
            Self::Returning => write!(f, "returning"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for CyclePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "in_queue" => Ok(Self::InQueue),
            "loading" => Ok(Self::Loading),
            "hauling" => Ok(Self::Hauling),
            "dumping" => Ok(Self::Dumping),
            "returning" => Ok(Self::Returning),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid cycle phase: {s}")),
        }
    }
}
