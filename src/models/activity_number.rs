use chrono::{Duration, NaiveDate};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::constants::defaults::ACTIVITY_NUMBER_PREFIX;

/// Issues `HA-YYYYMMDD-NNN` activity numbers with a per-date sequence.
/// Only the latest date and the day before it are remembered.
#[derive(Debug, Default)]
pub struct ActivityNumberGenerator {
    sequences: Mutex<HashMap<NaiveDate, u32>>,
}

impl ActivityNumberGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, date: NaiveDate) -> String {
        let mut sequences = self.sequences.lock();
        if !sequences.contains_key(&date) && sequences.keys().all(|known| *known < date) {
            let keep_from = date - Duration::days(1);
            sequences.retain(|known, _| *known >= keep_from);
        }
        let seq = sequences.entry(date).or_insert(0);
        *seq += 1;
        format!("{ACTIVITY_NUMBER_PREFIX}-{}-{:03}", date.format("%Y%m%d"), seq)
    }
}
