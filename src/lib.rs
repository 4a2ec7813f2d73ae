#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Haul Cycle Core
//!
//! Dispatch and cycle engine for an open-pit mining fleet.
//!
//! ## Overview
//!
//! Every haul truck runs a repeating cycle: wait in the queue at a loading
//! point, load under an excavator, haul to a dumping point, dump and return.
//! This crate decides which truck goes where, drives each cycle through its
//! phases on a whole-minute clock, attributes delays from a seeded policy and
//! folds finished cycles into per-shift production records.
//!
//! ## Architecture
//!
//! - One tokio task per cycle, supervised by the [`orchestration::FleetCoordinator`]
//! - Shared state lives in registries with single-entry atomic updates: the
//!   equipment registry (compare-and-set status), the reservation book
//!   (exclusive excavator and operator holds) and the stock ledger
//! - The [`state_machine::HaulCycleStateMachine`] is the only writer of truck status
//! - Everything random is seeded and forked per activity, so a run replays
//!   exactly for the same inputs
//!
//! ## Module Organization
//!
//! - [`models`] - Equipment, reference data, activities, logs and production records
//! - [`registry`] - Equipment registry, reference catalog, reservations and stock
//! - [`queue`] - Bounded FIFO admission at loading points
//! - [`dispatch`] - Assignment snapshot and policy
//! - [`state_machine`] - Haul cycle states, events, guards and actions
//! - [`delay`] - Seeded delay policy and attribution
//! - [`cycle`] - Timing model and the per-truck cycle runner
//! - [`metrics`] - Exactly-once production aggregation and statistics
//! - [`orchestration`] - Dispatch loop and equipment reports
//! - [`repository`] - Output seam with an in-memory implementation
//! - [`config`] - Layered configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use haul_core::config::FleetConfig;
//! use haul_core::orchestration::FleetCoordinator;
//! use haul_core::registry::FleetDefinition;
//! use haul_core::repository::InMemoryRepository;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FleetConfig::default();
//! let fleet = FleetDefinition::from_json_file("config/fleet_definition.example.json".as_ref())?
//!     .build(&config.queue);
//! let repository = Arc::new(InMemoryRepository::new());
//!
//! let coordinator = FleetCoordinator::new(config, fleet, repository.clone())?;
//! let report = coordinator.dispatch_tick().await?;
//! coordinator.wait_for_idle().await;
//!
//! println!("dispatched {} trucks", report.dispatched.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod cycle;
pub mod delay;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod queue;
pub mod registry;
pub mod repository;
pub mod state_machine;

pub use config::{ConfigManager, ConfigurationError, FleetConfig};
pub use constants::events as system_events;
pub use cycle::{CycleOutcome, CycleRunner, CycleTimingModel};
pub use delay::{DelayAttributor, DelayDecision, DelayPhase, DelayPolicy};
pub use dispatch::{AssignmentPolicy, DefaultAssignmentPolicy, DispatchSnapshot};
pub use error::{HaulError, Result};
pub use events::EventPublisher;
pub use metrics::{HaulStatistics, MetricsAggregator, ProductionAchievement};
pub use models::{
    ActivityStatus, Assignment, EquipmentStatusLogEntry, HaulingActivity, ProductionKey,
    ProductionRecord, QueueLogEntry, Shift,
};
pub use orchestration::{DispatchReport, FleetCoordinator};
pub use queue::LoadingPointQueueManager;
pub use registry::{EquipmentRegistry, FleetDefinition, ReservationBook, StockLedger};
pub use repository::{HaulRepository, InMemoryRepository};
pub use state_machine::{CancelReason, CycleEvent, CyclePhase, HaulCycleStateMachine, SealedCycle};
