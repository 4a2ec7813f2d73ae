//! # Delay Attribution
//!
//! Seeded delay policy and the attributor that applies it to cycle phases.

pub mod attributor;
pub mod policy;

pub use attributor::{DelayAttributor, DelayDecision};
pub use policy::{DelayPhase, DelayPolicy, DelayRule};
