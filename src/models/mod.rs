pub mod activity_number;
pub mod equipment;
pub mod hauling_activity;
pub mod logs;
pub mod production;
pub mod reference;
pub mod shift;

pub type TruckId = String;
pub type ExcavatorId = String;
pub type OperatorId = String;
pub type LoadingPointId = String;
pub type DumpingPointId = String;
pub type RoadSegmentId = String;
pub type DelayReasonId = String;

// Re-export core models for easy access
pub use activity_number::ActivityNumberGenerator;
pub use equipment::{
    Competency, Excavator, ExcavatorStatus, Operator, OperatorStatus, Truck, TruckStatus,
};
pub use hauling_activity::{ActivityStatus, Assignment, HaulingActivity};
pub use logs::{EquipmentRef, EquipmentStatus, EquipmentStatusLogEntry, QueueAction, QueueLogEntry};
pub use production::{round2, ProductionKey, ProductionRecord};
pub use reference::{
    CoalQuality, DelayCategory, DelayReason, DumpingPoint, LoadingPoint, RoadCondition,
    RoadSegment, WeatherCondition, WeatherRisk,
};
pub use shift::Shift;
