//! # Repository
//!
//! Output seam for sealed activities, operational logs and production rollups.
//! Activities and logs are create-only; production records are upserted by key.

pub mod in_memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ActivityStatus, EquipmentStatusLogEntry, HaulingActivity, ProductionKey, ProductionRecord,
    QueueLogEntry, Shift,
};

pub use in_memory::InMemoryRepository;

/// Filter for activity listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityFilter {
    pub mining_site_id: Option<String>,
    pub shift: Option<Shift>,
    /// Matched against the queue start date
    pub date: Option<NaiveDate>,
    pub status: Option<ActivityStatus>,
    pub truck_id: Option<String>,
}

impl ActivityFilter {
    pub fn for_key(key: &ProductionKey) -> Self {
        Self {
            mining_site_id: Some(key.mining_site_id.clone()),
            shift: Some(key.shift),
            date: Some(key.date),
            ..Self::default()
        }
    }

    pub fn matches(&self, activity: &HaulingActivity) -> bool {
        if let Some(site) = &self.mining_site_id {
            if &activity.mining_site_id != site {
                return false;
            }
        }
        if let Some(shift) = self.shift {
            if activity.shift != shift {
                return false;
            }
        }
        if let Some(date) = self.date {
            match activity.queue_start_time {
                Some(start) if start.date_naive() == date => {}
                _ => return false,
            }
        }
        if let Some(status) = self.status {
            if activity.status != status {
                return false;
            }
        }
        if let Some(truck_id) = &self.truck_id {
            if &activity.truck_id != truck_id {
                return false;
            }
        }
        true
    }
}

/// Persistence for the haul-cycle core
#[async_trait]
pub trait HaulRepository: Send + Sync {
    /// Store a sealed activity. Fails if the id already exists.
    async fn create_activity(&self, activity: &HaulingActivity) -> Result<()>;

    async fn find_activity(&self, id: Uuid) -> Result<Option<HaulingActivity>>;

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<HaulingActivity>>;

    async fn append_queue_log(&self, entry: QueueLogEntry) -> Result<()>;

    async fn append_status_log(&self, entry: EquipmentStatusLogEntry) -> Result<()>;

    /// Insert or replace the record for its key
    async fn upsert_production(&self, record: &ProductionRecord) -> Result<()>;

    async fn find_production(&self, key: &ProductionKey) -> Result<Option<ProductionRecord>>;
}
