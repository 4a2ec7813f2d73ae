//! Read-only reference data: loading and dumping points, haul roads, delay
//! reasons and the site condition factors used by the timing model.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DelayReasonId, DumpingPointId, LoadingPointId, RoadSegmentId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CoalQuality {
    /// Gross calorific value, kcal/kg
    pub calorie: f64,
    pub ash_content: f64,
    pub sulfur: f64,
    pub moisture: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingPoint {
    pub id: LoadingPointId,
    pub code: String,
    pub mining_site_id: String,
    #[serde(default)]
    pub max_queue_size: usize,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub coal_quality: CoalQuality,
}

impl LoadingPoint {
    pub fn new(id: impl Into<String>, mining_site_id: impl Into<String>, max_queue_size: usize) -> Self {
        let id = id.into();
        Self {
            code: id.clone(),
            id,
            mining_site_id: mining_site_id.into(),
            max_queue_size,
            is_active: true,
            coal_quality: CoalQuality::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpingPoint {
    pub id: DumpingPointId,
    pub code: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Stockpile capacity in tonnes
    pub capacity: f64,
    #[serde(default)]
    pub current_stock: f64,
}

impl DumpingPoint {
    pub fn new(id: impl Into<String>, capacity: f64) -> Self {
        let id = id.into();
        Self {
            code: id.clone(),
            id,
            is_active: true,
            capacity,
            current_stock: 0.0,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoadCondition {
    Excellent,
    #[default]
    Good,
    Fair,
    Poor,
    Critical,
}

impl RoadCondition {
    /// Multiplier applied to truck speed on this surface
    pub fn speed_factor(&self) -> f64 {
        match self {
            Self::Excellent => 1.0,
            Self::Good => 0.95,
            Self::Fair => 0.85,
            Self::Poor => 0.7,
            Self::Critical => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadSegment {
    pub id: RoadSegmentId,
    pub code: String,
    pub from_loading_point_id: LoadingPointId,
    pub to_dumping_point_id: DumpingPointId,
    /// Kilometres
    pub distance: f64,
    /// km/h
    pub max_speed: f64,
    #[serde(default)]
    pub road_condition: RoadCondition,
}

impl RoadSegment {
    pub fn new(
        id: impl Into<String>,
        from_loading_point_id: impl Into<String>,
        to_dumping_point_id: impl Into<String>,
        distance: f64,
    ) -> Self {
        let id = id.into();
        Self {
            code: id.clone(),
            id,
            from_loading_point_id: from_loading_point_id.into(),
            to_dumping_point_id: to_dumping_point_id.into(),
            distance,
            max_speed: 40.0,
            road_condition: RoadCondition::Good,
        }
    }

    pub fn connects(&self, loading_point_id: &str, dumping_point_id: &str) -> bool {
        self.from_loading_point_id == loading_point_id && self.to_dumping_point_id == dumping_point_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelayCategory {
    Weather,
    Equipment,
    Queue,
    Road,
    Operator,
    Fuel,
    Administrative,
    Safety,
}

impl fmt::Display for DelayCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Weather => "WEATHER",
            Self::Equipment => "EQUIPMENT",
            Self::Queue => "QUEUE",
            Self::Road => "ROAD",
            Self::Operator => "OPERATOR",
            Self::Fuel => "FUEL",
            Self::Administrative => "ADMINISTRATIVE",
            Self::Safety => "SAFETY",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayReason {
    pub id: DelayReasonId,
    pub code: String,
    pub name: String,
    pub category: DelayCategory,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl DelayReason {
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        category: DelayCategory,
    ) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            name: name.into(),
            category,
            is_active: true,
        }
    }

    /// The site's standard delay taxonomy
    pub fn standard_taxonomy() -> Vec<DelayReason> {
        vec![
            Self::new("DLY-W01", "DLY-W01", "Heavy rain", DelayCategory::Weather),
            Self::new("DLY-E01", "DLY-E01", "Excavator breakdown", DelayCategory::Equipment),
            Self::new("DLY-E02", "DLY-E02", "Truck breakdown", DelayCategory::Equipment),
            Self::new("DLY-Q01", "DLY-Q01", "Queue congestion", DelayCategory::Queue),
            Self::new("DLY-R01", "DLY-R01", "Road maintenance", DelayCategory::Road),
            Self::new("DLY-F01", "DLY-F01", "Refuelling", DelayCategory::Fuel),
            Self::new("DLY-S01", "DLY-S01", "Safety inspection", DelayCategory::Safety),
        ]
    }
}

/// Weather at the site. Names follow the site's reporting codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeatherCondition {
    #[default]
    Cerah,
    Berawan,
    HujanRingan,
    HujanSedang,
    HujanLebat,
    Kabut,
    Badai,
}

impl WeatherCondition {
    pub fn speed_factor(&self) -> f64 {
        match self {
            Self::Cerah => 1.0,
            Self::Berawan => 0.95,
            Self::HujanRingan => 0.85,
            Self::HujanSedang => 0.75,
            Self::HujanLebat => 0.6,
            Self::Kabut => 0.8,
            Self::Badai => 0.5,
        }
    }

    pub fn risk(&self) -> WeatherRisk {
        match self {
            Self::Cerah | Self::Berawan => WeatherRisk::Low,
            Self::HujanRingan | Self::Kabut => WeatherRisk::Medium,
            Self::HujanSedang | Self::HujanLebat => WeatherRisk::High,
            Self::Badai => WeatherRisk::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeatherRisk {
    Low,
    Medium,
    High,
    Critical,
}

impl WeatherRisk {
    /// Fuel burn multiplier
    pub fn fuel_factor(&self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 1.15,
            Self::High => 1.3,
            Self::Critical => 1.5,
        }
    }
}
