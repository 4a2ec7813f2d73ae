//! Mutable dumping point stock. Seeded from the reference catalog; tracks the
//! committed stock plus loads that have reserved headroom but not yet dumped.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::{HaulError, Result};
use crate::models::DumpingPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub capacity: f64,
    pub stock: f64,
    pub reserved: f64,
}

impl StockLevel {
    pub fn headroom(&self) -> f64 {
        (self.capacity - self.stock - self.reserved).max(0.0)
    }

    /// Committed plus reserved over capacity
    pub fn ratio(&self) -> f64 {
        if self.capacity <= 0.0 {
            return 1.0;
        }
        (self.stock + self.reserved) / self.capacity
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    points: HashMap<String, StockLevel>,
    reservations: HashMap<Uuid, (String, f64)>,
}

#[derive(Debug, Default)]
pub struct StockLedger {
    state: Mutex<LedgerState>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a DumpingPoint>) -> Self {
        let ledger = Self::new();
        for point in points {
            ledger.seed(point);
        }
        ledger
    }

    pub fn seed(&self, point: &DumpingPoint) {
        let mut state = self.state.lock();
        state.points.insert(
            point.id.clone(),
            StockLevel {
                capacity: point.capacity,
                stock: point.current_stock.clamp(0.0, point.capacity),
                reserved: 0.0,
            },
        );
    }

    pub fn level(&self, dumping_point_id: &str) -> Option<StockLevel> {
        self.state.lock().points.get(dumping_point_id).copied()
    }

    /// Reserve headroom for a load. Fails with `CapacityExceeded` when
    /// stock + reserved + load would pass capacity.
    pub fn try_reserve_headroom(&self, dumping_point_id: &str, activity_id: Uuid, load: f64) -> Result<()> {
        let mut state = self.state.lock();

        if let Some((held_at, held_load)) = state.reservations.get(&activity_id) {
            if held_at == dumping_point_id && (*held_load - load).abs() < f64::EPSILON {
                return Ok(());
            }
            return Err(HaulError::Internal(format!(
                "activity {activity_id} already holds headroom at {held_at}"
            )));
        }

        let level = state
            .points
            .get_mut(dumping_point_id)
            .ok_or_else(|| HaulError::not_found("dumping point", dumping_point_id))?;

        let committed = level.stock + level.reserved;
        if committed + load > level.capacity {
            return Err(HaulError::CapacityExceeded {
                dumping_point_id: dumping_point_id.to_string(),
                committed,
                load,
                capacity: level.capacity,
            });
        }

        level.reserved += load;
        state
            .reservations
            .insert(activity_id, (dumping_point_id.to_string(), load));
        debug!(dumping_point_id = %dumping_point_id, activity_id = %activity_id, load, "Dump headroom reserved");
        Ok(())
    }

    /// Whether an activity currently holds headroom at the given point
    pub fn holds_headroom(&self, dumping_point_id: &str, activity_id: Uuid) -> bool {
        self.state
            .lock()
            .reservations
            .get(&activity_id)
            .is_some_and(|(at, _)| at == dumping_point_id)
    }

    /// Turn a reservation into stock. Returns the new stock level.
    pub fn commit(&self, activity_id: Uuid) -> Result<f64> {
        let mut state = self.state.lock();
        let (point_id, load) = state
            .reservations
            .remove(&activity_id)
            .ok_or_else(|| HaulError::Internal(format!("no headroom reserved for activity {activity_id}")))?;

        let level = state
            .points
            .get_mut(&point_id)
            .ok_or_else(|| HaulError::not_found("dumping point", point_id.clone()))?;
        level.reserved = (level.reserved - load).max(0.0);
        level.stock = (level.stock + load).min(level.capacity);
        Ok(level.stock)
    }

    /// Drop an uncommitted reservation. No-op if none is held.
    pub fn cancel_reservation(&self, activity_id: Uuid) {
        let mut state = self.state.lock();
        if let Some((point_id, load)) = state.reservations.remove(&activity_id) {
            if let Some(level) = state.points.get_mut(&point_id) {
                level.reserved = (level.reserved - load).max(0.0);
            }
        }
    }

    /// Remove stock (reclaim or barge loading). Returns the new stock level.
    pub fn draw_down(&self, dumping_point_id: &str, tonnes: f64) -> Result<f64> {
        let mut state = self.state.lock();
        let level = state
            .points
            .get_mut(dumping_point_id)
            .ok_or_else(|| HaulError::not_found("dumping point", dumping_point_id))?;
        level.stock = (level.stock - tonnes.max(0.0)).max(0.0);
        Ok(level.stock)
    }

    pub fn snapshot(&self) -> HashMap<String, StockLevel> {
        self.state.lock().points.clone()
    }
}
