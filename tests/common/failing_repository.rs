//! Repository wrapper that fails selected writes a set number of times

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use haul_core::error::{HaulError, Result};
use haul_core::models::{
    EquipmentStatusLogEntry, HaulingActivity, ProductionKey, ProductionRecord, QueueLogEntry,
};
use haul_core::repository::{ActivityFilter, HaulRepository, InMemoryRepository};

#[derive(Debug, Default)]
pub struct FailingRepository {
    pub inner: Arc<InMemoryRepository>,
    queue_log_failures: AtomicUsize,
    status_log_failures: AtomicUsize,
    upsert_failures: AtomicUsize,
    /// Status log writes allowed through before the failures start
    status_logs_before_failure: AtomicUsize,
}

impl FailingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_queue_logs(&self, times: usize) {
        self.queue_log_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_status_logs_after(&self, successes: usize, times: usize) {
        self.status_logs_before_failure.store(successes, Ordering::SeqCst);
        self.status_log_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_upserts(&self, times: usize) {
        self.upsert_failures.store(times, Ordering::SeqCst);
    }
}

/// Decrement a non-zero counter, reporting whether it was non-zero
fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn take_failure(counter: &AtomicUsize, operation: &str) -> Result<()> {
    if take(counter) {
        return Err(HaulError::Repository(format!("{operation} unavailable")));
    }
    Ok(())
}

#[async_trait]
impl HaulRepository for FailingRepository {
    async fn create_activity(&self, activity: &HaulingActivity) -> Result<()> {
        self.inner.create_activity(activity).await
    }

    async fn find_activity(&self, id: Uuid) -> Result<Option<HaulingActivity>> {
        self.inner.find_activity(id).await
    }

    async fn list_activities(&self, filter: &ActivityFilter) -> Result<Vec<HaulingActivity>> {
        self.inner.list_activities(filter).await
    }

    async fn append_queue_log(&self, entry: QueueLogEntry) -> Result<()> {
        take_failure(&self.queue_log_failures, "queue log")?;
        self.inner.append_queue_log(entry).await
    }

    async fn append_status_log(&self, entry: EquipmentStatusLogEntry) -> Result<()> {
        if !take(&self.status_logs_before_failure) {
            take_failure(&self.status_log_failures, "status log")?;
        }
        self.inner.append_status_log(entry).await
    }

    async fn upsert_production(&self, record: &ProductionRecord) -> Result<()> {
        take_failure(&self.upsert_failures, "production upsert")?;
        self.inner.upsert_production(record).await
    }

    async fn find_production(&self, key: &ProductionKey) -> Result<Option<ProductionRecord>> {
        self.inner.find_production(key).await
    }
}
