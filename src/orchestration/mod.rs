//! # Orchestration
//!
//! Fleet-level coordination: the dispatch tick, cycle task supervision,
//! equipment reports and the hand-off of sealed cycles to the metrics
//! aggregator.
//!
//! ## Flow
//!
//! 1. `dispatch_tick()` captures a [`crate::dispatch::DispatchSnapshot`] per
//!    idle truck and asks the assignment policy for a plan
//! 2. Each assignment becomes a [`crate::cycle::CycleRunner`] task with its
//!    own seeded delay attributor and timing model
//! 3. Sealed cycles go to the [`crate::metrics::MetricsAggregator`]
//! 4. Breakdown reports cancel cycles still waiting on the excavator

pub mod fleet_coordinator;

pub use fleet_coordinator::{
    CoordinatorStats, DispatchReport, DispatchedCycle, FleetCoordinator, SkippedTruck,
};
