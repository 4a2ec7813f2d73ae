//! # Reservation Book
//!
//! Exclusive excavator and operator reservations, keyed by resource and
//! pointing at the holding activity id. Every mutation is a single map entry
//! operation; pairs are taken one resource at a time and rolled back on
//! conflict so no caller ever holds two locks.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::{HaulError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    Excavator(String),
    Operator(String),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Excavator(id) => write!(f, "excavator {id}"),
            Self::Operator(id) => write!(f, "operator {id}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReservationBook {
    holders: DashMap<ResourceKey, Uuid>,
    /// Logical instant each resource was last given back
    released_at: DashMap<ResourceKey, DateTime<Utc>>,
    released: Notify,
}

impl ReservationBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve one resource. Re-reserving a resource already held by the same
    /// activity is a no-op.
    pub fn try_reserve(&self, key: ResourceKey, activity_id: Uuid) -> Result<()> {
        match self.holders.entry(key) {
            Entry::Occupied(entry) => {
                if *entry.get() == activity_id {
                    Ok(())
                } else {
                    Err(HaulError::ReservationConflict {
                        resource: entry.key().to_string(),
                        holder: entry.get().to_string(),
                    })
                }
            }
            Entry::Vacant(entry) => {
                debug!(resource = %entry.key(), activity_id = %activity_id, "Resource reserved");
                entry.insert(activity_id);
                Ok(())
            }
        }
    }

    /// Reserve an excavator and an operator together, or neither.
    pub fn reserve_pair(&self, excavator_id: &str, operator_id: &str, activity_id: Uuid) -> Result<()> {
        let excavator = ResourceKey::Excavator(excavator_id.to_string());
        let already_held = self.holder(&excavator) == Some(activity_id);

        self.try_reserve(excavator.clone(), activity_id)?;

        if let Err(conflict) = self.try_reserve(ResourceKey::Operator(operator_id.to_string()), activity_id) {
            if !already_held {
                self.holders.remove_if(&excavator, |_, holder| *holder == activity_id);
                self.released.notify_waiters();
            }
            return Err(conflict);
        }

        Ok(())
    }

    /// Reserve the pair, waiting up to `wait` for current holders to release.
    /// Returns the latest logical release instant of the two resources, which
    /// the caller uses as the earliest loading start.
    pub async fn reserve_pair_within(
        &self,
        excavator_id: &str,
        operator_id: &str,
        activity_id: Uuid,
        wait: Duration,
    ) -> Result<Option<DateTime<Utc>>> {
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.reserve_pair(excavator_id, operator_id, activity_id) {
                Ok(()) => {
                    let excavator_free = self
                        .released_at
                        .get(&ResourceKey::Excavator(excavator_id.to_string()))
                        .map(|at| *at);
                    let operator_free = self
                        .released_at
                        .get(&ResourceKey::Operator(operator_id.to_string()))
                        .map(|at| *at);
                    return Ok(excavator_free.max(operator_free));
                }
                Err(conflict) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(conflict);
                    }
                }
            }
        }
    }

    /// Release everything held by an activity, stamping the logical release
    /// instant. Returns the released keys.
    pub fn release_all(&self, activity_id: Uuid, at: DateTime<Utc>) -> Vec<ResourceKey> {
        let mut released = Vec::new();
        self.holders.retain(|key, holder| {
            if *holder == activity_id {
                released.push(key.clone());
                false
            } else {
                true
            }
        });

        for key in &released {
            self.released_at
                .entry(key.clone())
                .and_modify(|prev| *prev = (*prev).max(at))
                .or_insert(at);
        }

        if !released.is_empty() {
            debug!(activity_id = %activity_id, count = released.len(), "Reservations released");
            self.released.notify_waiters();
        }
        released.sort();
        released
    }

    /// Release one resource if the activity holds it
    pub fn release(&self, key: &ResourceKey, activity_id: Uuid, at: DateTime<Utc>) -> bool {
        if self
            .holders
            .remove_if(key, |_, holder| *holder == activity_id)
            .is_none()
        {
            return false;
        }
        self.released_at
            .entry(key.clone())
            .and_modify(|prev| *prev = (*prev).max(at))
            .or_insert(at);
        debug!(resource = %key, activity_id = %activity_id, "Resource released");
        self.released.notify_waiters();
        true
    }

    pub fn holder(&self, key: &ResourceKey) -> Option<Uuid> {
        self.holders.get(key).map(|h| *h)
    }

    pub fn held_by(&self, activity_id: Uuid) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self
            .holders
            .iter()
            .filter(|entry| *entry.value() == activity_id)
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn reserved_excavators(&self) -> HashSet<String> {
        self.holders
            .iter()
            .filter_map(|entry| match entry.key() {
                ResourceKey::Excavator(id) => Some(id.clone()),
                ResourceKey::Operator(_) => None,
            })
            .collect()
    }

    pub fn reserved_operators(&self) -> HashSet<String> {
        self.holders
            .iter()
            .filter_map(|entry| match entry.key() {
                ResourceKey::Operator(id) => Some(id.clone()),
                ResourceKey::Excavator(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}
