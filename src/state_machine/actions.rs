use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::errors::{ActionError, ActionResult};
use super::events::CycleEvent;
use super::states::CyclePhase;
use crate::constants::events;
use crate::events::EventPublisher;
use crate::models::HaulingActivity;
use crate::registry::{EquipmentRegistry, ReservationBook, ResourceKey, StockLedger};

/// Trait for implementing state transition actions
#[async_trait]
pub trait StateAction<T: Sync> {
    /// Execute the action
    async fn execute(
        &self,
        entity: &T,
        from_state: CyclePhase,
        to_state: CyclePhase,
        event: &CycleEvent,
    ) -> ActionResult<()>;

    /// Get a description of this action for logging
    fn description(&self) -> &'static str;
}

/// Action to publish lifecycle events when state transitions occur
pub struct PublishTransitionEventAction {
    event_publisher: EventPublisher,
}

impl PublishTransitionEventAction {
    pub fn new(event_publisher: EventPublisher) -> Self {
        Self { event_publisher }
    }
}

#[async_trait]
impl StateAction<HaulingActivity> for PublishTransitionEventAction {
    async fn execute(
        &self,
        activity: &HaulingActivity,
        from_state: CyclePhase,
        to_state: CyclePhase,
        event: &CycleEvent,
    ) -> ActionResult<()> {
        if let Some(event_name) = determine_cycle_event_name(from_state, to_state, event) {
            let context = build_cycle_event_context(activity, from_state, to_state, event);

            self.event_publisher
                .publish(event_name, context)
                .await
                .map_err(|_| ActionError::EventPublishFailed {
                    event_name: event_name.to_string(),
                })?;
        }

        Ok(())
    }

    fn description(&self) -> &'static str {
        "Publish lifecycle event for cycle transition"
    }
}

/// Action to move the load into dumping point stock when the dump completes
pub struct CommitStockAction {
    stock: Arc<StockLedger>,
}

impl CommitStockAction {
    pub fn new(stock: Arc<StockLedger>) -> Self {
        Self { stock }
    }
}

#[async_trait]
impl StateAction<HaulingActivity> for CommitStockAction {
    async fn execute(
        &self,
        activity: &HaulingActivity,
        from_state: CyclePhase,
        to_state: CyclePhase,
        _event: &CycleEvent,
    ) -> ActionResult<()> {
        if from_state == CyclePhase::Dumping && to_state == CyclePhase::Returning {
            let stock = self.stock.commit(activity.id)?;
            debug!(
                activity_number = %activity.activity_number,
                dumping_point_id = %activity.dumping_point_id,
                load_weight = activity.load_weight,
                stock,
                "Load committed to dumping point stock"
            );
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Commit dumped load to stock"
    }
}

/// Action to hand the excavator back once the truck is loaded and to give
/// back every remaining reservation when the cycle is sealed
pub struct ReleaseReservationsAction {
    reservations: Arc<ReservationBook>,
    stock: Arc<StockLedger>,
}

impl ReleaseReservationsAction {
    pub fn new(reservations: Arc<ReservationBook>, stock: Arc<StockLedger>) -> Self {
        Self { reservations, stock }
    }
}

#[async_trait]
impl StateAction<HaulingActivity> for ReleaseReservationsAction {
    async fn execute(
        &self,
        activity: &HaulingActivity,
        from_state: CyclePhase,
        to_state: CyclePhase,
        event: &CycleEvent,
    ) -> ActionResult<()> {
        if from_state == CyclePhase::Loading && to_state == CyclePhase::Hauling {
            let excavator = ResourceKey::Excavator(activity.excavator_id.clone());
            self.reservations.release(&excavator, activity.id, event.at());
        } else if to_state.is_terminal() {
            let released = self.reservations.release_all(activity.id, event.at());
            // No-op once the load has been committed
            self.stock.cancel_reservation(activity.id);
            debug!(
                activity_number = %activity.activity_number,
                released = released.len(),
                "Cycle reservations released"
            );
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Release excavator, operator and headroom reservations"
    }
}

/// Action to keep the truck's crew and location in step with the cycle
pub struct UpdateTruckCrewAction {
    registry: Arc<EquipmentRegistry>,
}

impl UpdateTruckCrewAction {
    pub fn new(registry: Arc<EquipmentRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl StateAction<HaulingActivity> for UpdateTruckCrewAction {
    async fn execute(
        &self,
        activity: &HaulingActivity,
        from_state: CyclePhase,
        to_state: CyclePhase,
        _event: &CycleEvent,
    ) -> ActionResult<()> {
        if from_state == to_state {
            return Ok(());
        }

        let (operator, location) = match to_state {
            CyclePhase::InQueue | CyclePhase::Loading => (
                Some(activity.operator_id.clone()),
                Some(activity.loading_point_id.clone()),
            ),
            CyclePhase::Hauling | CyclePhase::Returning => {
                (Some(activity.operator_id.clone()), Some(activity.road_segment_id.clone()))
            }
            CyclePhase::Dumping => (
                Some(activity.operator_id.clone()),
                Some(activity.dumping_point_id.clone()),
            ),
            CyclePhase::Idle | CyclePhase::Completed | CyclePhase::Cancelled => (None, None),
        };

        self.registry
            .update_truck_crew(&activity.truck_id, operator, location)
            .map_err(ActionError::from)
    }

    fn description(&self) -> &'static str {
        "Update truck crew and location"
    }
}

fn determine_cycle_event_name(
    from_state: CyclePhase,
    to_state: CyclePhase,
    event: &CycleEvent,
) -> Option<&'static str> {
    match (from_state, to_state, event) {
        (_, _, CycleEvent::AttachDelay { .. }) => Some(events::CYCLE_DELAYED),
        (_, _, CycleEvent::Reroute { .. }) => Some(events::CYCLE_REROUTED),
        (_, _, CycleEvent::Promote { .. }) => Some(events::CYCLE_PROMOTED),
        (CyclePhase::Idle, CyclePhase::InQueue, _) => Some(events::CYCLE_DISPATCHED),
        (_, CyclePhase::Loading, _) => Some(events::CYCLE_LOADING_STARTED),
        (_, CyclePhase::Hauling, _) => Some(events::CYCLE_HAULING_STARTED),
        (_, CyclePhase::Dumping, _) => Some(events::CYCLE_DUMPING_STARTED),
        (_, CyclePhase::Returning, _) => Some(events::CYCLE_RETURNING_STARTED),
        (_, CyclePhase::Completed, _) => Some(events::CYCLE_COMPLETED),
        (_, CyclePhase::Cancelled, _) => Some(events::CYCLE_CANCELLED),
        _ => None,
    }
}

fn build_cycle_event_context(
    activity: &HaulingActivity,
    from_state: CyclePhase,
    to_state: CyclePhase,
    event: &CycleEvent,
) -> Value {
    let mut context = json!({
        "activity_id": activity.id,
        "activity_number": activity.activity_number,
        "truck_id": activity.truck_id,
        "loading_point_id": activity.loading_point_id,
        "dumping_point_id": activity.dumping_point_id,
        "from_state": from_state.to_string(),
        "to_state": to_state.to_string(),
        "event_type": event.event_type(),
        "at": event.at().to_rfc3339(),
    });

    match event {
        CycleEvent::AttachDelay { decision, .. } => {
            context["delay_reason_id"] = json!(decision.delay_reason_id);
            context["delay_minutes"] = json!(decision.delay_minutes);
        }
        CycleEvent::Cancel { reason, .. } => {
            context["reason"] = json!(reason.to_string());
        }
        CycleEvent::CompleteLoading { .. } => {
            context["load_weight"] = json!(activity.load_weight);
        }
        _ => {}
    }
    context
}
