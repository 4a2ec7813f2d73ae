//! Fleet equipment: trucks, excavators and operators.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::shift::Shift;
use super::{ExcavatorId, LoadingPointId, OperatorId, TruckId};

/// Truck operational status. While a cycle is in flight the status mirrors the
/// cycle phase; STANDBY is used for a truck waiting in a loading point backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TruckStatus {
    #[default]
    Idle,
    InQueue,
    Loading,
    Hauling,
    Dumping,
    Returning,
    Maintenance,
    Refueling,
    Standby,
}

impl TruckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::InQueue => "IN_QUEUE",
            Self::Loading => "LOADING",
            Self::Hauling => "HAULING",
            Self::Dumping => "DUMPING",
            Self::Returning => "RETURNING",
            Self::Maintenance => "MAINTENANCE",
            Self::Refueling => "REFUELING",
            Self::Standby => "STANDBY",
        }
    }
}

impl fmt::Display for TruckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExcavatorStatus {
    Active,
    #[default]
    Idle,
    Maintenance,
    Breakdown,
    Standby,
}

impl ExcavatorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Idle => "IDLE",
            Self::Maintenance => "MAINTENANCE",
            Self::Breakdown => "BREAKDOWN",
            Self::Standby => "STANDBY",
        }
    }
}

impl fmt::Display for ExcavatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorStatus {
    #[default]
    Active,
    OnLeave,
    Inactive,
}

impl fmt::Display for OperatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::OnLeave => write!(f, "ON_LEAVE"),
            Self::Inactive => write!(f, "INACTIVE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Truck {
    pub id: TruckId,
    pub code: String,
    /// Rated payload in tonnes
    pub capacity: f64,
    /// Tank size in litres
    pub fuel_capacity: f64,
    /// Litres per kilometre
    #[serde(default = "default_fuel_rate")]
    pub fuel_consumption_rate: f64,
    /// Average loaded travel speed in km/h
    #[serde(default = "default_truck_speed")]
    pub average_speed: f64,
    #[serde(default)]
    pub status: TruckStatus,
    #[serde(default)]
    pub current_operator_id: Option<OperatorId>,
    #[serde(default)]
    pub current_location: Option<String>,
}

fn default_fuel_rate() -> f64 {
    0.8
}

fn default_truck_speed() -> f64 {
    30.0
}

impl Truck {
    pub fn new(id: impl Into<String>, capacity: f64) -> Self {
        let id = id.into();
        Self {
            code: id.clone(),
            id,
            capacity,
            fuel_capacity: 500.0,
            fuel_consumption_rate: default_fuel_rate(),
            average_speed: default_truck_speed(),
            status: TruckStatus::Idle,
            current_operator_id: None,
            current_location: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Excavator {
    pub id: ExcavatorId,
    pub code: String,
    /// Bucket size in cubic metres
    pub bucket_capacity: f64,
    /// Loading throughput in tonnes per minute
    #[serde(default = "default_production_rate")]
    pub production_rate: f64,
    /// Loading point the unit is stationed at, if any
    #[serde(default)]
    pub loading_point_id: Option<LoadingPointId>,
    #[serde(default)]
    pub status: ExcavatorStatus,
}

fn default_production_rate() -> f64 {
    2.5
}

impl Excavator {
    pub fn new(id: impl Into<String>, bucket_capacity: f64) -> Self {
        let id = id.into();
        Self {
            code: id.clone(),
            id,
            bucket_capacity,
            production_rate: default_production_rate(),
            loading_point_id: None,
            status: ExcavatorStatus::Active,
        }
    }
}

/// Equipment classes an operator is licensed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competency {
    pub dump_truck: bool,
    pub excavator: bool,
    pub heavy_equipment: bool,
}

impl Default for Competency {
    fn default() -> Self {
        Self {
            dump_truck: true,
            excavator: false,
            heavy_equipment: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub id: OperatorId,
    pub name: String,
    pub shift: Shift,
    #[serde(default)]
    pub competency: Competency,
    /// Performance rating on a 0-5 scale
    pub rating: f64,
    #[serde(default)]
    pub status: OperatorStatus,
}

impl Operator {
    pub fn new(id: impl Into<String>, shift: Shift, rating: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            shift,
            competency: Competency::default(),
            rating,
            status: OperatorStatus::Active,
        }
    }

    pub fn can_drive_trucks(&self) -> bool {
        self.status == OperatorStatus::Active && self.competency.dump_truck
    }
}
