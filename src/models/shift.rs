use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::defaults::SHIFT_HOURS;

/// Production shift. Three eight-hour shifts starting at midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Shift {
    #[serde(rename = "SHIFT_1")]
    Shift1,
    #[serde(rename = "SHIFT_2")]
    Shift2,
    #[serde(rename = "SHIFT_3")]
    Shift3,
}

impl Shift {
    /// Shift covering the given instant
    pub fn at(instant: DateTime<Utc>) -> Self {
        match instant.hour() / SHIFT_HOURS {
            0 => Self::Shift1,
            1 => Self::Shift2,
            _ => Self::Shift3,
        }
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shift1 => write!(f, "SHIFT_1"),
            Self::Shift2 => write!(f, "SHIFT_2"),
            Self::Shift3 => write!(f, "SHIFT_3"),
        }
    }
}

impl std::str::FromStr for Shift {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHIFT_1" => Ok(Self::Shift1),
            "SHIFT_2" => Ok(Self::Shift2),
            "SHIFT_3" => Ok(Self::Shift3),
            _ => Err(format!("Invalid shift: {s}")),
        }
    }
}
