//! # Dispatch
//!
//! Resource and route selection for idle trucks.

pub mod assignment;

pub use assignment::{
    AssignmentPolicy, DefaultAssignmentPolicy, DispatchSnapshot, DumpingPointView,
    LoadingPointView, Reroute, SnapshotSources,
};
