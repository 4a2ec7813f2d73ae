//! # Registries
//!
//! Shared fleet state: equipment identity and status, exclusive reservations,
//! read-only site reference data and dumping point stock.

pub mod equipment_registry;
pub mod fleet_definition;
pub mod reference_catalog;
pub mod reservation_book;
pub mod stock_ledger;

pub use equipment_registry::{EquipmentCounts, EquipmentRegistry};
pub use fleet_definition::{FleetDefinition, FleetParts};
pub use reference_catalog::{InMemoryCatalog, ReferenceCatalog};
pub use reservation_book::{ReservationBook, ResourceKey};
pub use stock_ledger::{StockLedger, StockLevel};
