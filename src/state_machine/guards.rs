use std::sync::Arc;

use super::errors::{business_rule_violation, GuardError, GuardResult};
use super::states::CyclePhase;
use crate::delay::{DelayDecision, DelayPhase};
use crate::models::{round2, HaulingActivity};
use crate::registry::{ReservationBook, ResourceKey, StockLedger};

/// Trait for implementing state transition guards
pub trait StateGuard<T> {
    /// Check if a transition is allowed
    fn check(&self, entity: &T) -> GuardResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// LOADING needs exactly one excavator and one operator held by the activity
pub struct ReservationHeldGuard {
    reservations: Arc<ReservationBook>,
}

impl ReservationHeldGuard {
    pub fn new(reservations: Arc<ReservationBook>) -> Self {
        Self { reservations }
    }
}

impl StateGuard<HaulingActivity> for ReservationHeldGuard {
    fn check(&self, activity: &HaulingActivity) -> GuardResult<()> {
        let required = [
            ResourceKey::Excavator(activity.excavator_id.clone()),
            ResourceKey::Operator(activity.operator_id.clone()),
        ];
        for key in required {
            if self.reservations.holder(&key) != Some(activity.id) {
                return Err(GuardError::ReservationMissing {
                    resource: key.to_string(),
                    activity_id: activity.id.to_string(),
                });
            }
        }

        let held = self.reservations.held_by(activity.id);
        if held.len() != 2 {
            return Err(business_rule_violation(format!(
                "activity {} holds {} resources, expected one excavator and one operator",
                activity.activity_number,
                held.len()
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Excavator and operator must be reserved by this activity"
    }
}

/// Load factor in (0, 1] and the resulting load within target and capacity
pub struct LoadWithinCapacityGuard {
    load_factor: f64,
    truck_capacity: f64,
}

impl LoadWithinCapacityGuard {
    pub fn new(load_factor: f64, truck_capacity: f64) -> Self {
        Self {
            load_factor,
            truck_capacity,
        }
    }

    pub fn load_weight(&self, target_weight: f64) -> f64 {
        round2(target_weight * self.load_factor)
    }
}

impl StateGuard<HaulingActivity> for LoadWithinCapacityGuard {
    fn check(&self, activity: &HaulingActivity) -> GuardResult<()> {
        if !self.load_factor.is_finite() || self.load_factor <= 0.0 || self.load_factor > 1.0 {
            return Err(GuardError::InvalidLoad(format!(
                "load factor {} outside (0, 1]",
                self.load_factor
            )));
        }

        let load = self.load_weight(activity.target_weight);
        if load > activity.target_weight || load > self.truck_capacity {
            return Err(GuardError::InvalidLoad(format!(
                "load {load:.2}t exceeds target {:.2}t / capacity {:.2}t of truck {}",
                activity.target_weight, self.truck_capacity, activity.truck_id
            )));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Load must not exceed truck capacity"
    }
}

/// DUMPING needs headroom reserved at the activity's dumping point
pub struct DumpHeadroomReservedGuard {
    stock: Arc<StockLedger>,
}

impl DumpHeadroomReservedGuard {
    pub fn new(stock: Arc<StockLedger>) -> Self {
        Self { stock }
    }
}

impl StateGuard<HaulingActivity> for DumpHeadroomReservedGuard {
    fn check(&self, activity: &HaulingActivity) -> GuardResult<()> {
        if self.stock.holds_headroom(&activity.dumping_point_id, activity.id) {
            return Ok(());
        }

        let level = self.stock.level(&activity.dumping_point_id);
        Err(GuardError::HeadroomMissing {
            dumping_point_id: activity.dumping_point_id.clone(),
            committed: level.map(|l| l.stock + l.reserved).unwrap_or(0.0),
            load: activity.load_weight,
            capacity: level.map(|l| l.capacity).unwrap_or(0.0),
        })
    }

    fn description(&self) -> &'static str {
        "Dumping point headroom must be reserved for the load"
    }
}

/// A delay must be real and belong to the phase the cycle is in
pub struct DelayCompatibleGuard<'a> {
    current: CyclePhase,
    phase: DelayPhase,
    decision: &'a DelayDecision,
}

impl<'a> DelayCompatibleGuard<'a> {
    pub fn new(current: CyclePhase, phase: DelayPhase, decision: &'a DelayDecision) -> Self {
        Self {
            current,
            phase,
            decision,
        }
    }

    fn phase_matches(&self) -> bool {
        matches!(
            (self.current, self.phase),
            (CyclePhase::InQueue, DelayPhase::InQueue)
                | (CyclePhase::Loading, DelayPhase::Loading)
                | (CyclePhase::Hauling, DelayPhase::Hauling)
                | (CyclePhase::Hauling, DelayPhase::DumpHold)
                | (CyclePhase::Dumping, DelayPhase::DumpHold)
        )
    }
}

impl StateGuard<HaulingActivity> for DelayCompatibleGuard<'_> {
    fn check(&self, _activity: &HaulingActivity) -> GuardResult<()> {
        let category_ok = self
            .decision
            .category
            .map(|category| self.phase.accepts(category))
            .unwrap_or(false);

        if !self.phase_matches() || !category_ok {
            return Err(GuardError::IncompatibleDelay {
                phase: self.phase.to_string(),
                category: self
                    .decision
                    .category
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                current: self.current.to_string(),
            });
        }

        if !self.decision.is_delayed
            || self.decision.delay_reason_id.is_none()
            || self.decision.delay_minutes <= 0
        {
            return Err(business_rule_violation(
                "delay decision must carry a reason and positive minutes",
            ));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Delay must match the current phase"
    }
}

/// Promotion only applies to a backlogged truck, loading only to a slot holder
pub struct BacklogGuard {
    backlogged: bool,
    expect_backlogged: bool,
}

impl BacklogGuard {
    pub fn new(backlogged: bool, expect_backlogged: bool) -> Self {
        Self {
            backlogged,
            expect_backlogged,
        }
    }
}

impl StateGuard<HaulingActivity> for BacklogGuard {
    fn check(&self, activity: &HaulingActivity) -> GuardResult<()> {
        if self.backlogged == self.expect_backlogged {
            return Ok(());
        }
        Err(business_rule_violation(if self.backlogged {
            format!("truck {} is still waiting in the backlog", activity.truck_id)
        } else {
            format!("truck {} already holds a queue slot", activity.truck_id)
        }))
    }

    fn description(&self) -> &'static str {
        "Queue slot ownership must match the event"
    }
}
