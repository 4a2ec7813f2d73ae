use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::delay::{DelayDecision, DelayPhase};
use crate::models::ExcavatorStatus;

/// Why a cycle was cancelled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CancelReason {
    /// The reserved excavator broke down
    EquipmentBreakdown {
        excavator_id: String,
        previous_status: ExcavatorStatus,
    },
    /// Dispatcher or supervisor override
    ManualOverride(String),
    /// A fault in the cycle itself
    Fatal(String),
    /// No dumping point could take the load within the retry budget
    CapacityExhausted { dumping_point_id: String },
}

impl CancelReason {
    pub fn is_breakdown(&self) -> bool {
        matches!(self, Self::EquipmentBreakdown { .. })
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EquipmentBreakdown { excavator_id, .. } => {
                write!(f, "excavator {excavator_id} breakdown")
            }
            Self::ManualOverride(reason) => write!(f, "manual override: {reason}"),
            Self::Fatal(reason) => write!(f, "fatal: {reason}"),
            Self::CapacityExhausted { dumping_point_id } => {
                write!(f, "no dumping headroom at {dumping_point_id}")
            }
        }
    }
}

/// Events that drive a cycle. Every event carries the logical instant it
/// happened at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CycleEvent {
    /// Queue admission answered; `admitted` is false for a backlogged truck
    Dispatch { admitted: bool, at: DateTime<Utc> },
    /// Backlogged truck inherited a slot
    Promote { at: DateTime<Utc> },
    /// Excavator and operator are reserved by this activity
    StartLoading { at: DateTime<Utc> },
    CompleteLoading { load_factor: f64, at: DateTime<Utc> },
    /// Dumping headroom is reserved by this activity
    ArriveAtDump { at: DateTime<Utc> },
    CompleteDump { at: DateTime<Utc> },
    ReturnToPool { at: DateTime<Utc> },
    AttachDelay {
        phase: DelayPhase,
        decision: DelayDecision,
        at: DateTime<Utc>,
    },
    Reroute {
        dumping_point_id: String,
        road_segment_id: String,
        distance: f64,
        at: DateTime<Utc>,
    },
    Cancel { reason: CancelReason, at: DateTime<Utc> },
}

impl CycleEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Dispatch { .. } => "dispatch",
            Self::Promote { .. } => "promote",
            Self::StartLoading { .. } => "start_loading",
            Self::CompleteLoading { .. } => "complete_loading",
            Self::ArriveAtDump { .. } => "arrive_at_dump",
            Self::CompleteDump { .. } => "complete_dump",
            Self::ReturnToPool { .. } => "return_to_pool",
            Self::AttachDelay { .. } => "attach_delay",
            Self::Reroute { .. } => "reroute",
            Self::Cancel { .. } => "cancel",
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Dispatch { at, .. }
            | Self::Promote { at }
            | Self::StartLoading { at }
            | Self::CompleteLoading { at, .. }
            | Self::ArriveAtDump { at }
            | Self::CompleteDump { at }
            | Self::ReturnToPool { at }
            | Self::AttachDelay { at, .. }
            | Self::Reroute { at, .. }
            | Self::Cancel { at, .. } => *at,
        }
    }

    pub(crate) fn set_at(&mut self, instant: DateTime<Utc>) {
        match self {
            Self::Dispatch { at, .. }
            | Self::Promote { at }
            | Self::StartLoading { at }
            | Self::CompleteLoading { at, .. }
            | Self::ArriveAtDump { at }
            | Self::CompleteDump { at }
            | Self::ReturnToPool { at }
            | Self::AttachDelay { at, .. }
            | Self::Reroute { at, .. }
            | Self::Cancel { at, .. } => *at = instant,
        }
    }

    /// Events that annotate the current phase without leaving it
    pub fn is_annotation(&self) -> bool {
        matches!(self, Self::AttachDelay { .. } | Self::Reroute { .. } | Self::Promote { .. })
    }

    pub fn cancel_reason(&self) -> Option<&CancelReason> {
        match self {
            Self::Cancel { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
