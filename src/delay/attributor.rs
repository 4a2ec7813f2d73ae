//! # Delay Attributor
//!
//! Decides whether a cycle phase is delayed, by how many minutes and for which
//! reason. Outcomes depend only on the policy seed, the fork key and the
//! sequence of evaluations, so replays reproduce the same delays regardless of
//! how cycle tasks are scheduled.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::policy::{DelayPhase, DelayPolicy};
use crate::error::{HaulError, Result};
use crate::models::{DelayCategory, DelayReason, HaulingActivity};

/// `is_delayed`, `delay_reason_id` and `delay_minutes > 0` always agree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayDecision {
    pub is_delayed: bool,
    pub delay_reason_id: Option<String>,
    pub delay_minutes: i64,
    pub category: Option<DelayCategory>,
}

impl DelayDecision {
    pub fn none() -> Self {
        Self {
            is_delayed: false,
            delay_reason_id: None,
            delay_minutes: 0,
            category: None,
        }
    }

    fn delayed(reason: &DelayReason, minutes: i64) -> Self {
        Self {
            is_delayed: true,
            delay_reason_id: Some(reason.id.clone()),
            delay_minutes: minutes,
            category: Some(reason.category),
        }
    }

    /// Reason/minutes triple used when comparing replays
    pub fn triple(&self) -> (bool, Option<&str>, i64) {
        (self.is_delayed, self.delay_reason_id.as_deref(), self.delay_minutes)
    }
}

#[derive(Debug, Clone)]
pub struct DelayAttributor {
    policy: Arc<DelayPolicy>,
    reasons: Arc<Vec<DelayReason>>,
    seed: u64,
    rng: StdRng,
}

impl DelayAttributor {
    /// `reasons` is the active taxonomy; inactive entries are ignored.
    pub fn new(policy: DelayPolicy, reasons: Vec<DelayReason>) -> Self {
        let mut reasons: Vec<DelayReason> = reasons.into_iter().filter(|r| r.is_active).collect();
        reasons.sort_by(|a, b| a.id.cmp(&b.id));
        let seed = policy.seed;
        Self {
            policy: Arc::new(policy),
            reasons: Arc::new(reasons),
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Independent attributor for one cycle, derived from the base seed and a
    /// stable key such as the activity number.
    pub fn fork(&self, key: &str) -> Self {
        let seed = derive_seed(self.policy.seed, key);
        Self {
            policy: Arc::clone(&self.policy),
            reasons: Arc::clone(&self.reasons),
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn policy(&self) -> &DelayPolicy {
        &self.policy
    }

    /// Roll the policy table for a phase. One uniform draw selects the rule;
    /// a delayed outcome draws minutes and then the reason.
    pub fn evaluate(&mut self, activity: &HaulingActivity, phase: DelayPhase) -> DelayDecision {
        let roll: f64 = self.rng.random();

        let mut cumulative = 0.0;
        let mut selected = None;
        for rule in self.policy.rules_for(phase) {
            cumulative += rule.probability;
            if roll < cumulative {
                selected = Some(rule.clone());
                break;
            }
        }

        let Some(rule) = selected else {
            return DelayDecision::none();
        };

        let minutes = self.rng.random_range(rule.min_minutes..=rule.max_minutes);
        let candidates: Vec<&DelayReason> = self
            .reasons
            .iter()
            .filter(|reason| reason.category == rule.category && phase.accepts(reason.category))
            .collect();

        if candidates.is_empty() {
            debug!(
                activity_number = %activity.activity_number,
                category = %rule.category,
                "No active delay reason for category, delay skipped"
            );
            return DelayDecision::none();
        }

        let reason = candidates[self.rng.random_range(0..candidates.len())];
        debug!(
            activity_number = %activity.activity_number,
            truck_id = %activity.truck_id,
            phase = %phase,
            delay_reason_id = %reason.id,
            minutes,
            "Delay attributed"
        );
        DelayDecision::delayed(reason, minutes)
    }

    /// Delay that is known to happen, such as a dump held for headroom. Uses
    /// the first active reason of a category compatible with the phase.
    pub fn forced(&self, phase: DelayPhase, category: DelayCategory, minutes: i64) -> Result<DelayDecision> {
        if !phase.accepts(category) || minutes <= 0 {
            return Err(HaulError::Internal(format!(
                "cannot force a {category} delay of {minutes} minutes during {phase}"
            )));
        }
        self.reasons
            .iter()
            .find(|reason| reason.category == category)
            .map(|reason| DelayDecision::delayed(reason, minutes))
            .ok_or_else(|| HaulError::not_found("delay reason", category.to_string()))
    }
}

/// Stable per-key seed. Used by every seeded component that forks per cycle.
/// FNV-1a and splitmix64 are fixed algorithms, so the same key maps to the
/// same seed across builds and toolchains, which `DefaultHasher` does not
/// guarantee.
pub(crate) fn derive_seed(seed: u64, key: &str) -> u64 {
    mix(seed, fnv1a(key.as_bytes()))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}

/// splitmix64 finalizer over the combined seed
fn mix(seed: u64, key_hash: u64) -> u64 {
    let mut z = seed ^ key_hash.rotate_left(17);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
