use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{HaulError, Result};
use crate::models::DelayCategory;

/// Cycle phase a delay can be attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelayPhase {
    InQueue,
    Loading,
    Hauling,
    /// Truck held at the dumping point waiting for headroom
    DumpHold,
}

impl DelayPhase {
    /// Delay categories that make sense for this phase
    pub fn compatible_categories(&self) -> &'static [DelayCategory] {
        use DelayCategory::*;
        match self {
            Self::InQueue | Self::Loading => {
                &[Equipment, Queue, Operator, Fuel, Administrative, Safety]
            }
            Self::Hauling => &[Weather, Road, Equipment, Safety, Fuel],
            Self::DumpHold => &[Queue],
        }
    }

    pub fn accepts(&self, category: DelayCategory) -> bool {
        self.compatible_categories().contains(&category)
    }
}

impl fmt::Display for DelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InQueue => write!(f, "IN_QUEUE"),
            Self::Loading => write!(f, "LOADING"),
            Self::Hauling => write!(f, "HAULING"),
            Self::DumpHold => write!(f, "DUMP_HOLD"),
        }
    }
}

/// One row of the delay probability table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayRule {
    pub phase: DelayPhase,
    pub category: DelayCategory,
    pub probability: f64,
    pub min_minutes: i64,
    pub max_minutes: i64,
}

impl DelayRule {
    pub fn new(
        phase: DelayPhase,
        category: DelayCategory,
        probability: f64,
        min_minutes: i64,
        max_minutes: i64,
    ) -> Self {
        Self {
            phase,
            category,
            probability,
            min_minutes,
            max_minutes,
        }
    }

    /// Site defaults: roughly one cycle phase in seven is delayed, by 10 to 39
    /// minutes.
    pub fn default_rules() -> Vec<DelayRule> {
        use DelayCategory::*;
        use DelayPhase::*;
        vec![
            Self::new(InQueue, Queue, 0.08, 10, 39),
            Self::new(InQueue, Equipment, 0.04, 10, 39),
            Self::new(InQueue, Operator, 0.03, 10, 39),
            Self::new(Hauling, Weather, 0.06, 10, 39),
            Self::new(Hauling, Road, 0.04, 10, 39),
            Self::new(Hauling, Equipment, 0.03, 10, 39),
            Self::new(Hauling, Fuel, 0.02, 10, 39),
        ]
    }
}

/// Seeded delay policy. The seed is the only source of randomness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayPolicy {
    pub seed: u64,
    pub rules: Vec<DelayRule>,
}

impl DelayPolicy {
    pub fn new(seed: u64, rules: Vec<DelayRule>) -> Self {
        Self { seed, rules }
    }

    pub fn from_config(config: &crate::config::DelayConfig) -> Self {
        Self::new(config.seed, config.rules.clone())
    }

    /// A policy that never delays
    pub fn disabled(seed: u64) -> Self {
        Self::new(seed, Vec::new())
    }

    pub fn rules_for(&self, phase: DelayPhase) -> impl Iterator<Item = &DelayRule> {
        self.rules.iter().filter(move |rule| rule.phase == phase)
    }

    pub fn validate(&self) -> Result<()> {
        let mut totals: HashMap<DelayPhase, f64> = HashMap::new();

        for rule in &self.rules {
            if !rule.phase.accepts(rule.category) {
                return Err(HaulError::Configuration(format!(
                    "delay category {} is not valid during {}",
                    rule.category, rule.phase
                )));
            }
            if !(0.0..=1.0).contains(&rule.probability) {
                return Err(HaulError::Configuration(format!(
                    "delay probability {} for {}/{} must be within 0..=1",
                    rule.probability, rule.phase, rule.category
                )));
            }
            if rule.min_minutes <= 0 || rule.min_minutes > rule.max_minutes {
                return Err(HaulError::Configuration(format!(
                    "delay minutes {}..={} for {}/{} must be positive and ordered",
                    rule.min_minutes, rule.max_minutes, rule.phase, rule.category
                )));
            }
            *totals.entry(rule.phase).or_insert(0.0) += rule.probability;
        }

        if let Some((phase, total)) = totals.iter().find(|(_, total)| **total > 1.0 + f64::EPSILON) {
            return Err(HaulError::Configuration(format!(
                "delay probabilities for {phase} sum to {total}, above 1"
            )));
        }

        Ok(())
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(42, DelayRule::default_rules())
    }
}
