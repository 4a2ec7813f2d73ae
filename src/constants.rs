//! # System Constants
//!
//! Event names, status groups and operational defaults shared across the
//! haul-cycle core.

/// Lifecycle event names published on the [`crate::events::EventPublisher`]
pub mod events {
    // Cycle lifecycle events
    pub const CYCLE_DISPATCHED: &str = "haul.cycle.dispatched";
    pub const CYCLE_PROMOTED: &str = "haul.cycle.promoted";
    pub const CYCLE_LOADING_STARTED: &str = "haul.cycle.loading_started";
    pub const CYCLE_HAULING_STARTED: &str = "haul.cycle.hauling_started";
    pub const CYCLE_DUMPING_STARTED: &str = "haul.cycle.dumping_started";
    pub const CYCLE_RETURNING_STARTED: &str = "haul.cycle.returning_started";
    pub const CYCLE_COMPLETED: &str = "haul.cycle.completed";
    pub const CYCLE_CANCELLED: &str = "haul.cycle.cancelled";
    pub const CYCLE_DELAYED: &str = "haul.cycle.delayed";
    pub const CYCLE_REROUTED: &str = "haul.cycle.rerouted";

    // Equipment events
    pub const EQUIPMENT_BREAKDOWN: &str = "equipment.breakdown";
    pub const EQUIPMENT_REPAIRED: &str = "equipment.repaired";

    // Dispatch events
    pub const DISPATCH_TICK_COMPLETED: &str = "dispatch.tick_completed";
}

/// Status groupings used by utilization rollups
pub mod status_groups {
    use crate::models::{ExcavatorStatus, TruckStatus};

    /// Truck statuses that take the unit out of the available fleet
    pub const TRUCK_BREAKDOWN_STATUSES: &[TruckStatus] = &[TruckStatus::Maintenance];

    /// Excavator statuses that take the unit out of the available fleet
    pub const EXCAVATOR_BREAKDOWN_STATUSES: &[ExcavatorStatus] =
        &[ExcavatorStatus::Breakdown, ExcavatorStatus::Maintenance];

    /// Excavator statuses that allow the unit to be reserved for loading
    pub const EXCAVATOR_LOADABLE_STATUSES: &[ExcavatorStatus] =
        &[ExcavatorStatus::Active, ExcavatorStatus::Idle];
}

/// Operational defaults taken from site practice
pub mod defaults {
    /// Fraction of the truck capacity that is actually loaded
    pub const LOAD_FACTOR_MIN: f64 = 0.85;
    pub const LOAD_FACTOR_MAX: f64 = 1.0;

    /// Fuel multiplier applied for a loaded haul
    pub const LOADED_FUEL_FACTOR: f64 = 1.3;

    /// Dumping throughput in tonnes per minute
    pub const DUMPING_RATE_TPM: f64 = 4.0;

    /// Empty trucks return faster than they haul
    pub const RETURN_SPEED_FACTOR: f64 = 1.15;

    /// Default shift production target in tonnes
    pub const TARGET_PRODUCTION: f64 = 5000.0;

    /// Hours per shift, three shifts starting at 00:00
    pub const SHIFT_HOURS: u32 = 8;

    /// Activity number prefix: `HA-YYYYMMDD-NNN`
    pub const ACTIVITY_NUMBER_PREFIX: &str = "HA";
}
