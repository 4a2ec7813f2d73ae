//! # Loading Point Queue Manager
//!
//! Bounded FIFO admission per loading point. A truck that finds the point
//! full waits in a backlog ordered by request time (ties by truck id) and is
//! handed a [`PromotionTicket`] that resolves with the release instant of the
//! slot it inherits.
//!
//! Each point has a single owner lock. Log entries are written after the lock
//! is dropped.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{HaulError, Result};
use crate::logging::log_queue_operation;
use crate::models::{LoadingPoint, QueueAction, QueueLogEntry};
use crate::registry::ReferenceCatalog;
use crate::repository::HaulRepository;

/// Outcome of an admission request
#[derive(Debug)]
pub struct Admission {
    pub admitted: bool,
    /// 1-based position counting slot holders first
    pub queue_position: usize,
    /// Present only for backlogged trucks
    pub ticket: Option<PromotionTicket>,
}

/// Resolves when a backlogged truck inherits a slot
#[derive(Debug)]
pub struct PromotionTicket {
    loading_point_id: String,
    truck_id: String,
    receiver: oneshot::Receiver<DateTime<Utc>>,
}

impl PromotionTicket {
    /// Wait for promotion. Yields the instant the slot was released.
    pub async fn promoted(self) -> Result<DateTime<Utc>> {
        self.receiver.await.map_err(|_| {
            HaulError::Cancelled(format!(
                "truck {} withdrawn from loading point {} backlog",
                self.truck_id, self.loading_point_id
            ))
        })
    }

    pub fn loading_point_id(&self) -> &str {
        &self.loading_point_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub loading_point_id: String,
    pub max_queue_size: usize,
    pub is_active: bool,
    pub slot_holders: Vec<String>,
    pub backlog: Vec<String>,
}

#[derive(Debug)]
struct Slot {
    truck_id: String,
    since: DateTime<Utc>,
}

#[derive(Debug)]
struct Waiter {
    requested_at: DateTime<Utc>,
    sender: oneshot::Sender<DateTime<Utc>>,
}

#[derive(Debug)]
struct PointQueue {
    max_queue_size: usize,
    is_active: bool,
    slots: Vec<Slot>,
    backlog: BTreeMap<(DateTime<Utc>, String), Waiter>,
}

impl PointQueue {
    fn holds(&self, truck_id: &str) -> bool {
        self.slots.iter().any(|s| s.truck_id == truck_id)
            || self.backlog.keys().any(|(_, id)| id == truck_id)
    }

    fn length(&self) -> usize {
        self.slots.len() + self.backlog.len()
    }

    /// Fill free slots from the backlog head. Waiters whose ticket was dropped
    /// are skipped.
    fn promote(&mut self, loading_point_id: &str, at: DateTime<Utc>, logs: &mut Vec<QueueLogEntry>) {
        while self.slots.len() < self.max_queue_size {
            let Some(((_, truck_id), waiter)) = self.backlog.pop_first() else {
                break;
            };
            if waiter.sender.send(at).is_err() {
                debug!(loading_point_id = %loading_point_id, truck_id = %truck_id, "Skipping abandoned backlog ticket");
                continue;
            }
            self.slots.push(Slot {
                truck_id: truck_id.clone(),
                since: at,
            });
            logs.push(QueueLogEntry {
                loading_point_id: loading_point_id.to_string(),
                truck_id,
                action: QueueAction::Promoted,
                queue_length: self.length(),
                waiting_time: minutes_between(waiter.requested_at, at),
                timestamp: at,
            });
        }
    }
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_minutes().max(0)
}

pub struct LoadingPointQueueManager {
    points: DashMap<String, Arc<Mutex<PointQueue>>>,
    repository: Arc<dyn HaulRepository>,
}

impl std::fmt::Debug for LoadingPointQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingPointQueueManager")
            .field("points", &self.points.len())
            .finish()
    }
}

impl LoadingPointQueueManager {
    pub fn new(repository: Arc<dyn HaulRepository>) -> Self {
        Self {
            points: DashMap::new(),
            repository,
        }
    }

    /// Register every loading point in the catalog
    pub fn from_catalog(catalog: &dyn ReferenceCatalog, repository: Arc<dyn HaulRepository>) -> Self {
        let manager = Self::new(repository);
        for point in catalog.loading_points() {
            manager.register_point(&point);
        }
        manager
    }

    pub fn register_point(&self, point: &LoadingPoint) {
        self.points.insert(
            point.id.clone(),
            Arc::new(Mutex::new(PointQueue {
                max_queue_size: point.max_queue_size,
                is_active: point.is_active,
                slots: Vec::new(),
                backlog: BTreeMap::new(),
            })),
        );
    }

    fn point(&self, loading_point_id: &str) -> Result<Arc<Mutex<PointQueue>>> {
        self.points
            .get(loading_point_id)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| HaulError::point_unavailable(loading_point_id, "unknown loading point"))
    }

    /// Request a slot. Inactive or unknown points are rejected without
    /// enrolling the truck.
    pub async fn admit(
        &self,
        truck_id: &str,
        loading_point_id: &str,
        requested_at: DateTime<Utc>,
    ) -> Result<Admission> {
        let point = self.point(loading_point_id)?;

        let (admission, entry, occupancy, backlog) = {
            let mut queue = point.lock();

            if !queue.is_active {
                return Err(HaulError::point_unavailable(loading_point_id, "loading point is inactive"));
            }

            if queue.holds(truck_id) {
                return Err(HaulError::ReservationConflict {
                    resource: format!("queue at loading point {loading_point_id}"),
                    holder: truck_id.to_string(),
                });
            }

            let admission = if queue.slots.len() < queue.max_queue_size {
                queue.slots.push(Slot {
                    truck_id: truck_id.to_string(),
                    since: requested_at,
                });
                Admission {
                    admitted: true,
                    queue_position: queue.slots.len(),
                    ticket: None,
                }
            } else {
                let (sender, receiver) = oneshot::channel();
                let key = (requested_at, truck_id.to_string());
                let backlog_index = queue.backlog.range(..key.clone()).count();
                queue.backlog.insert(key, Waiter { requested_at, sender });
                Admission {
                    admitted: false,
                    queue_position: queue.slots.len() + backlog_index + 1,
                    ticket: Some(PromotionTicket {
                        loading_point_id: loading_point_id.to_string(),
                        truck_id: truck_id.to_string(),
                        receiver,
                    }),
                }
            };

            let entry = QueueLogEntry {
                loading_point_id: loading_point_id.to_string(),
                truck_id: truck_id.to_string(),
                action: if admission.admitted {
                    QueueAction::Admitted
                } else {
                    QueueAction::Queued
                },
                queue_length: queue.length(),
                waiting_time: 0,
                timestamp: requested_at,
            };
            (admission, entry, queue.slots.len(), queue.backlog.len())
        };

        log_queue_operation(
            if admission.admitted { "admit" } else { "enqueue" },
            loading_point_id,
            truck_id,
            occupancy,
            backlog,
        );
        if let Err(error) = self.repository.append_queue_log(entry).await {
            self.rollback_admission(&point, loading_point_id, truck_id, requested_at)
                .await;
            return Err(error);
        }
        Ok(admission)
    }

    /// Undo an enrolment whose queue log could not be written, promoting
    /// anyone who queued behind it in the meantime
    async fn rollback_admission(
        &self,
        point: &Mutex<PointQueue>,
        loading_point_id: &str,
        truck_id: &str,
        at: DateTime<Utc>,
    ) {
        let mut logs = Vec::new();
        {
            let mut queue = point.lock();
            if let Some(index) = queue.slots.iter().position(|s| s.truck_id == truck_id) {
                queue.slots.remove(index);
                queue.promote(loading_point_id, at, &mut logs);
            } else {
                queue.backlog.retain(|(_, id), _| id != truck_id);
            }
        }
        warn!(
            loading_point_id = %loading_point_id,
            truck_id = %truck_id,
            "Queue log write failed, admission rolled back"
        );
        for entry in logs {
            if let Err(error) = self.repository.append_queue_log(entry).await {
                warn!(loading_point_id = %loading_point_id, error = %error, "Failed to log promotion after rollback");
            }
        }
    }

    /// Free a slot after loading and promote the backlog head. Returns the
    /// promoted trucks.
    pub async fn release(
        &self,
        loading_point_id: &str,
        truck_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let point = self.point(loading_point_id)?;

        let mut logs = Vec::new();
        {
            let mut queue = point.lock();
            let index = queue
                .slots
                .iter()
                .position(|s| s.truck_id == truck_id)
                .ok_or_else(|| HaulError::not_found("queue slot", format!("{loading_point_id}/{truck_id}")))?;
            let slot = queue.slots.remove(index);

            logs.push(QueueLogEntry {
                loading_point_id: loading_point_id.to_string(),
                truck_id: truck_id.to_string(),
                action: QueueAction::Released,
                queue_length: queue.length(),
                waiting_time: minutes_between(slot.since, at),
                timestamp: at,
            });
            queue.promote(loading_point_id, at, &mut logs);
        }

        self.write_logs(loading_point_id, truck_id, logs).await
    }

    /// Remove a truck on cancellation, wherever it is. A held slot is freed
    /// and the backlog promoted. Returns false if the truck was not enrolled.
    pub async fn withdraw(&self, loading_point_id: &str, truck_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let point = self.point(loading_point_id)?;

        let mut logs = Vec::new();
        {
            let mut queue = point.lock();

            if let Some(index) = queue.slots.iter().position(|s| s.truck_id == truck_id) {
                let slot = queue.slots.remove(index);
                logs.push(QueueLogEntry {
                    loading_point_id: loading_point_id.to_string(),
                    truck_id: truck_id.to_string(),
                    action: QueueAction::Withdrawn,
                    queue_length: queue.length(),
                    waiting_time: minutes_between(slot.since, at),
                    timestamp: at,
                });
                queue.promote(loading_point_id, at, &mut logs);
            } else if let Some(key) = queue
                .backlog
                .keys()
                .find(|(_, id)| id == truck_id)
                .cloned()
            {
                let waiter = queue.backlog.remove(&key);
                logs.push(QueueLogEntry {
                    loading_point_id: loading_point_id.to_string(),
                    truck_id: truck_id.to_string(),
                    action: QueueAction::Withdrawn,
                    queue_length: queue.length(),
                    waiting_time: waiter.map(|w| minutes_between(w.requested_at, at)).unwrap_or(0),
                    timestamp: at,
                });
            } else {
                return Ok(false);
            }
        }

        self.write_logs(loading_point_id, truck_id, logs).await?;
        Ok(true)
    }

    async fn write_logs(
        &self,
        loading_point_id: &str,
        truck_id: &str,
        logs: Vec<QueueLogEntry>,
    ) -> Result<Vec<String>> {
        let promoted: Vec<String> = logs
            .iter()
            .filter(|entry| entry.action == QueueAction::Promoted)
            .map(|entry| entry.truck_id.clone())
            .collect();

        for promoted_truck in &promoted {
            info!(
                loading_point_id = %loading_point_id,
                released_by = %truck_id,
                truck_id = %promoted_truck,
                "Backlogged truck promoted"
            );
        }

        log_queue_operation(
            "release",
            loading_point_id,
            truck_id,
            self.occupancy(loading_point_id),
            self.backlog_len(loading_point_id),
        );

        for entry in logs {
            self.repository.append_queue_log(entry).await?;
        }
        Ok(promoted)
    }

    /// Slot holders (IN_QUEUE plus LOADING) at a point
    pub fn occupancy(&self, loading_point_id: &str) -> usize {
        self.points
            .get(loading_point_id)
            .map(|p| p.lock().slots.len())
            .unwrap_or(0)
    }

    pub fn backlog_len(&self, loading_point_id: &str) -> usize {
        self.points
            .get(loading_point_id)
            .map(|p| p.lock().backlog.len())
            .unwrap_or(0)
    }

    pub fn set_active(&self, loading_point_id: &str, active: bool) -> Result<()> {
        let point = self.point(loading_point_id)?;
        point.lock().is_active = active;
        info!(loading_point_id = %loading_point_id, active, "Loading point availability changed");
        Ok(())
    }

    /// Per-point view, sorted by loading point id
    pub fn snapshot(&self) -> Vec<QueueSnapshot> {
        let mut snapshots: Vec<QueueSnapshot> = self
            .points
            .iter()
            .map(|entry| {
                let queue = entry.value().lock();
                QueueSnapshot {
                    loading_point_id: entry.key().clone(),
                    max_queue_size: queue.max_queue_size,
                    is_active: queue.is_active,
                    slot_holders: queue.slots.iter().map(|s| s.truck_id.clone()).collect(),
                    backlog: queue.backlog.keys().map(|(_, id)| id.clone()).collect(),
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.loading_point_id.cmp(&b.loading_point_id));
        snapshots
    }
}
