//! # Cycle Execution
//!
//! Timing model, time sources and the per-truck cycle runner.

pub mod clock;
pub mod runner;
pub mod timing;

pub use clock::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
pub use runner::{CancelRequest, CycleOutcome, CyclePlan, CycleRunner, CycleServices};
pub use timing::CycleTimingModel;
