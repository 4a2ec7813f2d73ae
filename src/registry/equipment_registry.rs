//! # Equipment Registry
//!
//! Authoritative store of truck, excavator and operator identity and current
//! status. Status mutation goes through compare-and-set so that a cycle task
//! only ever moves a unit out of the status it last observed.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::status_groups;
use crate::error::{HaulError, Result};
use crate::models::{
    Excavator, ExcavatorStatus, Operator, OperatorStatus, Truck, TruckStatus,
};

/// Operating and breakdown counts for the production rollup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentCounts {
    pub trucks_operating: u32,
    pub trucks_breakdown: u32,
    pub excavators_operating: u32,
    pub excavators_breakdown: u32,
}

impl EquipmentCounts {
    /// Available units over all registered units, percent
    pub fn utilization_rate(&self) -> f64 {
        let operating = self.trucks_operating + self.excavators_operating;
        let total = operating + self.trucks_breakdown + self.excavators_breakdown;
        if total == 0 {
            return 0.0;
        }
        crate::models::round2(f64::from(operating) / f64::from(total) * 100.0)
    }
}

#[derive(Debug, Default)]
pub struct EquipmentRegistry {
    trucks: DashMap<String, Truck>,
    excavators: DashMap<String, Excavator>,
    operators: DashMap<String, Operator>,
}

impl EquipmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_truck(&self, truck: Truck) {
        debug!(truck_id = %truck.id, capacity = truck.capacity, "Registering truck");
        self.trucks.insert(truck.id.clone(), truck);
    }

    pub fn register_excavator(&self, excavator: Excavator) {
        debug!(excavator_id = %excavator.id, "Registering excavator");
        self.excavators.insert(excavator.id.clone(), excavator);
    }

    pub fn register_operator(&self, operator: Operator) {
        debug!(operator_id = %operator.id, "Registering operator");
        self.operators.insert(operator.id.clone(), operator);
    }

    pub fn truck(&self, truck_id: &str) -> Result<Truck> {
        self.trucks
            .get(truck_id)
            .map(|t| t.clone())
            .ok_or_else(|| HaulError::not_found("truck", truck_id))
    }

    pub fn excavator(&self, excavator_id: &str) -> Result<Excavator> {
        self.excavators
            .get(excavator_id)
            .map(|e| e.clone())
            .ok_or_else(|| HaulError::not_found("excavator", excavator_id))
    }

    pub fn operator(&self, operator_id: &str) -> Result<Operator> {
        self.operators
            .get(operator_id)
            .map(|o| o.clone())
            .ok_or_else(|| HaulError::not_found("operator", operator_id))
    }

    pub fn truck_status(&self, truck_id: &str) -> Result<TruckStatus> {
        self.trucks
            .get(truck_id)
            .map(|t| t.status)
            .ok_or_else(|| HaulError::not_found("truck", truck_id))
    }

    pub fn excavator_status(&self, excavator_id: &str) -> Result<ExcavatorStatus> {
        self.excavators
            .get(excavator_id)
            .map(|e| e.status)
            .ok_or_else(|| HaulError::not_found("excavator", excavator_id))
    }

    /// Atomically move a truck from `expected` to `next`. Returns false when
    /// the current status differs from `expected`.
    pub fn compare_and_set_truck_status(
        &self,
        truck_id: &str,
        expected: TruckStatus,
        next: TruckStatus,
    ) -> Result<bool> {
        let mut truck = self
            .trucks
            .get_mut(truck_id)
            .ok_or_else(|| HaulError::not_found("truck", truck_id))?;

        if truck.status != expected {
            warn!(
                truck_id = %truck_id,
                expected = %expected,
                actual = %truck.status,
                "Truck status compare-and-set lost"
            );
            return Ok(false);
        }

        truck.status = next;
        Ok(true)
    }

    /// Atomically move an excavator from `expected` to `next`.
    pub fn compare_and_set_excavator_status(
        &self,
        excavator_id: &str,
        expected: ExcavatorStatus,
        next: ExcavatorStatus,
    ) -> Result<bool> {
        let mut excavator = self
            .excavators
            .get_mut(excavator_id)
            .ok_or_else(|| HaulError::not_found("excavator", excavator_id))?;

        if excavator.status != expected {
            return Ok(false);
        }

        excavator.status = next;
        Ok(true)
    }

    /// Unconditional excavator status write for maintenance reports. Returns
    /// the previous status.
    pub fn set_excavator_status(
        &self,
        excavator_id: &str,
        next: ExcavatorStatus,
    ) -> Result<ExcavatorStatus> {
        let mut excavator = self
            .excavators
            .get_mut(excavator_id)
            .ok_or_else(|| HaulError::not_found("excavator", excavator_id))?;
        Ok(std::mem::replace(&mut excavator.status, next))
    }

    /// Record who is driving a truck and where it is
    pub fn update_truck_crew(
        &self,
        truck_id: &str,
        operator_id: Option<String>,
        location: Option<String>,
    ) -> Result<()> {
        let mut truck = self
            .trucks
            .get_mut(truck_id)
            .ok_or_else(|| HaulError::not_found("truck", truck_id))?;
        truck.current_operator_id = operator_id;
        truck.current_location = location;
        Ok(())
    }

    /// All trucks sorted by id
    pub fn trucks(&self) -> Vec<Truck> {
        let mut trucks: Vec<Truck> = self.trucks.iter().map(|t| t.value().clone()).collect();
        trucks.sort_by(|a, b| a.id.cmp(&b.id));
        trucks
    }

    pub fn excavators(&self) -> Vec<Excavator> {
        let mut excavators: Vec<Excavator> =
            self.excavators.iter().map(|e| e.value().clone()).collect();
        excavators.sort_by(|a, b| a.id.cmp(&b.id));
        excavators
    }

    pub fn operators(&self) -> Vec<Operator> {
        let mut operators: Vec<Operator> = self.operators.iter().map(|o| o.value().clone()).collect();
        operators.sort_by(|a, b| a.id.cmp(&b.id));
        operators
    }

    /// Ids of IDLE trucks, sorted
    pub fn idle_trucks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .trucks
            .iter()
            .filter(|t| t.status == TruckStatus::Idle)
            .map(|t| t.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn equipment_counts(&self) -> EquipmentCounts {
        let mut counts = EquipmentCounts::default();
        for truck in self.trucks.iter() {
            if status_groups::TRUCK_BREAKDOWN_STATUSES.contains(&truck.status) {
                counts.trucks_breakdown += 1;
            } else {
                counts.trucks_operating += 1;
            }
        }
        for excavator in self.excavators.iter() {
            if status_groups::EXCAVATOR_BREAKDOWN_STATUSES.contains(&excavator.status) {
                counts.excavators_breakdown += 1;
            } else {
                counts.excavators_operating += 1;
            }
        }
        counts
    }
}
