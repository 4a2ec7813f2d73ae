// Haul cycle state machine
//
// One machine per truck cycle. Transitions are resolved from (phase, event),
// guarded before anything is mutated, and followed by actions that release
// reservations, commit stock and publish lifecycle events.

pub mod actions;
pub mod cycle_state_machine;
pub mod errors;
pub mod events;
pub mod guards;
pub mod states;

// Re-export main types for convenient access
pub use cycle_state_machine::{
    floor_minute, AttributedDelay, CycleResources, HaulCycleStateMachine, SealedCycle,
};
pub use errors::{ActionError, GuardError, StateMachineError, StateMachineResult};
pub use events::{CancelReason, CycleEvent};
pub use states::CyclePhase;

// Common traits and utilities
pub use actions::StateAction;
pub use guards::StateGuard;
