use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::{ActivityFilter, HaulRepository};
use crate::error::{HaulError, Result};
use crate::models::{
    EquipmentStatusLogEntry, HaulingActivity, ProductionKey, ProductionRecord, QueueLogEntry,
};

#[derive(Debug, Default)]
struct RepositoryState {
    activities: Vec<HaulingActivity>,
    activity_index: HashMap<Uuid, usize>,
    queue_logs: Vec<QueueLogEntry>,
    status_logs: Vec<EquipmentStatusLogEntry>,
    production: HashMap<ProductionKey, ProductionRecord>,
}

/// Process-local repository. Synchronous accessors are provided for
/// inspection in tests and the simulator.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<RepositoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activities in insertion order
    pub fn activities(&self) -> Vec<HaulingActivity> {
        self.state.read().activities.clone()
    }

    pub fn queue_logs(&self) -> Vec<QueueLogEntry> {
        self.state.read().queue_logs.clone()
    }

    pub fn status_logs(&self) -> Vec<EquipmentStatusLogEntry> {
        self.state.read().status_logs.clone()
    }

    /// Production records sorted by key
    pub fn production_records(&self) -> Vec<ProductionRecord> {
        let mut records: Vec<ProductionRecord> =
            self.state.read().production.values().cloned().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }
}

#[async_trait]
impl HaulRepository for InMemoryRepository {
    async fn create_activity(&self, activity: &HaulingActivity) -> Result<()> {
        let mut state = self.state.write();
        if state.activity_index.contains_key(&activity.id) {
            return Err(HaulError::Repository(format!(
                "activity {} already exists",
                activity.id
            )));
        }
        let index = state.activities.len();
        state.activities.push(activity.clone());
        state.activity_index.insert(activity.id, index);
        Ok(())
    }

    async fn find_activity(&self, id: Uuid) -> Result<Option<HaulingActivity>> {
        let state = self.state.read();
        Ok(state
            .activity_index
            .get(&id)
            .and_then(|&index| state.activities.get(index))
            .cloned())
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<HaulingActivity>> {
        Ok(self
            .state
            .read()
            .activities
            .iter()
            .filter(|activity| filter.matches(activity))
            .cloned()
            .collect())
    }

    async fn append_queue_log(&self, entry: QueueLogEntry) -> Result<()> {
        self.state.write().queue_logs.push(entry);
        Ok(())
    }

    async fn append_status_log(&self, entry: EquipmentStatusLogEntry) -> Result<()> {
        self.state.write().status_logs.push(entry);
        Ok(())
    }

    async fn upsert_production(&self, record: &ProductionRecord) -> Result<()> {
        self.state
            .write()
            .production
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn find_production(&self, key: &ProductionKey) -> Result<Option<ProductionRecord>> {
        Ok(self.state.read().production.get(key).cloned())
    }
}
