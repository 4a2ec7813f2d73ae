use thiserror::Error;

use crate::error::HaulError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateMachineError {
    #[error("Invalid transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Guard check failed: {0}")]
    Guard(#[from] GuardError),

    #[error("Action failed: {0}")]
    Action(#[from] ActionError),

    #[error("Cycle is already sealed as {0}")]
    Sealed(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuardError {
    #[error("{resource} is not reserved by activity {activity_id}")]
    ReservationMissing { resource: String, activity_id: String },

    #[error("Invalid load: {0}")]
    InvalidLoad(String),

    #[error("Dumping point {dumping_point_id} has no headroom reserved for {load:.2}t")]
    HeadroomMissing {
        dumping_point_id: String,
        committed: f64,
        load: f64,
        capacity: f64,
    },

    #[error("Delay {category} cannot be attributed to {phase} while the cycle is {current}")]
    IncompatibleDelay {
        phase: String,
        category: String,
        current: String,
    },

    #[error("Business rule violation: {0}")]
    BusinessRule(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("Status conflict for {equipment}: expected {expected}, found {actual}")]
    StatusConflict {
        equipment: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to publish event {event_name}")]
    EventPublishFailed { event_name: String },

    #[error("Registry update failed: {0}")]
    Registry(String),

    #[error("Stock ledger update failed: {0}")]
    Stock(String),
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type GuardResult<T> = Result<T, GuardError>;
pub type ActionResult<T> = Result<T, ActionError>;

pub fn business_rule_violation(message: impl Into<String>) -> GuardError {
    GuardError::BusinessRule(message.into())
}

impl From<StateMachineError> for HaulError {
    fn from(error: StateMachineError) -> Self {
        match error {
            StateMachineError::InvalidTransition { from, event } => {
                HaulError::InvalidTransition { from, event }
            }
            StateMachineError::Sealed(phase) => HaulError::InvalidTransition {
                from: phase,
                event: "any".to_string(),
            },
            StateMachineError::Guard(guard) => guard.into(),
            StateMachineError::Action(action) => action.into(),
        }
    }
}

impl From<GuardError> for HaulError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::ReservationMissing { resource, activity_id } => {
                HaulError::ReservationConflict {
                    resource,
                    holder: format!("not held by {activity_id}"),
                }
            }
            GuardError::InvalidLoad(message) => HaulError::InvalidLoad(message),
            GuardError::HeadroomMissing {
                dumping_point_id,
                committed,
                load,
                capacity,
            } => HaulError::CapacityExceeded {
                dumping_point_id,
                committed,
                load,
                capacity,
            },
            GuardError::IncompatibleDelay { .. } | GuardError::BusinessRule(_) => {
                HaulError::Internal(error.to_string())
            }
        }
    }
}

impl From<ActionError> for HaulError {
    fn from(error: ActionError) -> Self {
        match error {
            ActionError::StatusConflict {
                equipment,
                expected,
                actual,
            } => HaulError::StatusConflict {
                equipment,
                expected,
                actual,
            },
            other => HaulError::Internal(other.to_string()),
        }
    }
}

impl From<HaulError> for ActionError {
    fn from(error: HaulError) -> Self {
        match error {
            HaulError::StatusConflict {
                equipment,
                expected,
                actual,
            } => ActionError::StatusConflict {
                equipment,
                expected,
                actual,
            },
            HaulError::NotFound { .. } => ActionError::Registry(error.to_string()),
            other => ActionError::Stock(other.to_string()),
        }
    }
}
