use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::{EquipmentRegistry, InMemoryCatalog, ReferenceCatalog, StockLedger};
use crate::config::{ConfigurationError, QueueConfig};
use crate::models::{
    DelayReason, DumpingPoint, Excavator, LoadingPoint, Operator, RoadSegment, Truck,
};

/// Fleet and site layout as stored in a JSON fixture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FleetDefinition {
    pub trucks: Vec<Truck>,
    pub excavators: Vec<Excavator>,
    pub operators: Vec<Operator>,
    pub loading_points: Vec<LoadingPoint>,
    pub dumping_points: Vec<DumpingPoint>,
    pub road_segments: Vec<RoadSegment>,
    /// Empty means the standard taxonomy
    pub delay_reasons: Vec<DelayReason>,
}

/// Registry, catalog and stock ledger built from a definition
#[derive(Debug, Clone)]
pub struct FleetParts {
    pub registry: Arc<EquipmentRegistry>,
    pub catalog: Arc<InMemoryCatalog>,
    pub stock: Arc<StockLedger>,
}

impl FleetDefinition {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigurationError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::fleet_definition(path.display().to_string(), e))?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigurationError::fleet_definition(path.display().to_string(), e))
    }

    pub fn build(self, queue: &QueueConfig) -> FleetParts {
        let registry = EquipmentRegistry::new();
        self.trucks.into_iter().for_each(|t| registry.register_truck(t));
        self.excavators
            .into_iter()
            .for_each(|e| registry.register_excavator(e));
        self.operators
            .into_iter()
            .for_each(|o| registry.register_operator(o));

        let reasons = if self.delay_reasons.is_empty() {
            DelayReason::standard_taxonomy()
        } else {
            self.delay_reasons
        };

        let mut catalog = InMemoryCatalog::new().with_delay_reasons(reasons);
        for mut point in self.loading_points {
            if point.max_queue_size == 0 {
                point.max_queue_size = queue.default_max_queue_size;
            }
            catalog = catalog.with_loading_point(point);
        }
        for point in self.dumping_points {
            catalog = catalog.with_dumping_point(point);
        }
        for road in self.road_segments {
            catalog = catalog.with_road_segment(road);
        }

        let stock = StockLedger::from_points(catalog.dumping_points().iter());

        FleetParts {
            registry: Arc::new(registry),
            catalog: Arc::new(catalog),
            stock: Arc::new(stock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_definition_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "trucks": [{{"id": "TRK-01", "code": "HD-01", "capacity": 20.0, "fuelCapacity": 400.0}}],
                "excavators": [{{"id": "EX-01", "code": "PC-01", "bucketCapacity": 5.0, "loadingPointId": "LP-01", "status": "ACTIVE"}}],
                "operators": [{{"id": "OP-01", "name": "Budi", "shift": "SHIFT_1", "rating": 4.5}}],
                "loadingPoints": [{{"id": "LP-01", "code": "LP-01", "miningSiteId": "SITE-A", "maxQueueSize": 0}}],
                "dumpingPoints": [{{"id": "DP-01", "code": "DP-01", "capacity": 1000.0, "currentStock": 100.0}}],
                "roadSegments": [{{"id": "RD-01", "code": "RD-01", "fromLoadingPointId": "LP-01", "toDumpingPointId": "DP-01", "distance": 3.2, "maxSpeed": 40.0}}]
            }}"#
        )
        .unwrap();

        let definition = FleetDefinition::from_json_file(file.path()).unwrap();
        let parts = definition.build(&QueueConfig::default());

        assert_eq!(parts.registry.idle_trucks(), vec!["TRK-01"]);
        assert_eq!(parts.catalog.loading_point("LP-01").unwrap().max_queue_size, 3);
        assert_eq!(parts.catalog.delay_reasons().len(), 7);
        assert_eq!(parts.stock.level("DP-01").unwrap().stock, 100.0);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let result = FleetDefinition::from_json_file(Path::new("/nonexistent/fleet.json"));
        assert!(matches!(
            result,
            Err(ConfigurationError::FleetDefinitionError { .. })
        ));
    }
}
