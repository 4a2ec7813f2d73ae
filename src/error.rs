//! Error types for the haul-cycle core.
//!
//! Errors are split into recoverable outcomes (the truck stays IDLE or the caller
//! retries with another point) and faults that are fatal to a single activity.
//! Nothing here is fatal to the fleet as a whole.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HaulError {
    #[error("Point unavailable: {point_id} ({reason})")]
    PointUnavailable { point_id: String, reason: String },

    #[error("No available resource: {resource}")]
    NoAvailableResource { resource: String },

    #[error(
        "Capacity exceeded at dumping point {dumping_point_id}: committed {committed:.2}t + load {load:.2}t > capacity {capacity:.2}t"
    )]
    CapacityExceeded {
        dumping_point_id: String,
        committed: f64,
        load: f64,
        capacity: f64,
    },

    #[error("Reservation conflict: {resource} is held by {holder}")]
    ReservationConflict { resource: String, holder: String },

    #[error("Invalid transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Invalid load: {0}")]
    InvalidLoad(String),

    #[error("Status conflict for {equipment}: expected {expected}, found {actual}")]
    StatusConflict {
        equipment: String,
        expected: String,
        actual: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Activity {0} has already been processed")]
    AlreadyProcessed(Uuid),

    #[error("Cycle cancelled: {0}")]
    Cancelled(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HaulError {
    /// Recoverable errors leave the activity untouched; the caller retries later
    /// or with an alternate point.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PointUnavailable { .. }
                | Self::NoAvailableResource { .. }
                | Self::CapacityExceeded { .. }
        )
    }

    /// Faults that force the owning activity into CANCELLED.
    pub fn is_fatal_to_activity(&self) -> bool {
        matches!(
            self,
            Self::ReservationConflict { .. }
                | Self::InvalidTransition { .. }
                | Self::InvalidLoad(_)
                | Self::StatusConflict { .. }
                | Self::Internal(_)
        )
    }

    /// Short machine-readable name, used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PointUnavailable { .. } => "point_unavailable",
            Self::NoAvailableResource { .. } => "no_available_resource",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::ReservationConflict { .. } => "reservation_conflict",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidLoad(_) => "invalid_load",
            Self::StatusConflict { .. } => "status_conflict",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyProcessed(_) => "already_processed",
            Self::Cancelled(_) => "cancelled",
            Self::Repository(_) => "repository",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn point_unavailable(point_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PointUnavailable {
            point_id: point_id.into(),
            reason: reason.into(),
        }
    }

    pub fn no_available_resource(resource: impl Into<String>) -> Self {
        Self::NoAvailableResource {
            resource: resource.into(),
        }
    }
}

impl From<serde_json::Error> for HaulError {
    fn from(error: serde_json::Error) -> Self {
        HaulError::Internal(format!("JSON serialization error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, HaulError>;
