//! # Fleet Configuration System
//!
//! Layered configuration for the haul-cycle core. Values come from
//! `config/fleet.toml`, then `config/environments/<env>.toml`, then
//! `HAUL__SECTION__KEY` environment variables. Every section has defaults so a
//! missing file or section is never fatal.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use haul_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let tick = manager.config().dispatch.tick_interval();
//! let seed = manager.config().delay.seed;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::defaults;
use crate::delay::DelayRule;
use crate::models::WeatherCondition;

/// Root configuration structure mirroring config/fleet.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Dispatch loop and cycle-task waits
    pub dispatch: DispatchConfig,

    /// Cycle timing model and load sampling
    pub cycle: CycleConfig,

    /// Seeded delay policy
    pub delay: DelayConfig,

    /// Loading point queue defaults
    pub queue: QueueConfig,

    /// Production rollup defaults
    pub production: ProductionConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub tick_interval_ms: u64,
    pub max_dispatch_per_tick: usize,
    /// How long a cycle waits for its excavator and operator before giving up
    pub reservation_wait_ms: u64,
    /// Headroom checks at the dumping point before the cycle is cancelled
    pub dump_headroom_retries: u32,
    /// Logical minutes a held dump waits between headroom checks
    pub dump_headroom_wait_minutes: i64,
    /// Wall-clock seconds slept per logical minute. 0 runs as a pure simulation.
    pub real_time_factor: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5_000,
            max_dispatch_per_tick: 16,
            reservation_wait_ms: 2_000,
            dump_headroom_retries: 3,
            dump_headroom_wait_minutes: 10,
            real_time_factor: 0.0,
        }
    }
}

impl DispatchConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn reservation_wait(&self) -> Duration {
        Duration::from_millis(self.reservation_wait_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Base seed for load-factor sampling
    pub seed: u64,
    pub load_factor_min: f64,
    pub load_factor_max: f64,
    /// Tonnes per minute at the dumping point
    pub dumping_rate_tpm: f64,
    pub return_speed_factor: f64,
    pub loaded_fuel_factor: f64,
    pub weather: WeatherCondition,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            load_factor_min: defaults::LOAD_FACTOR_MIN,
            load_factor_max: defaults::LOAD_FACTOR_MAX,
            dumping_rate_tpm: defaults::DUMPING_RATE_TPM,
            return_speed_factor: defaults::RETURN_SPEED_FACTOR,
            loaded_fuel_factor: defaults::LOADED_FUEL_FACTOR,
            weather: WeatherCondition::Cerah,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DelayConfig {
    pub seed: u64,
    pub rules: Vec<DelayRule>,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            rules: DelayRule::default_rules(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Applied to loading points whose definition leaves maxQueueSize at 0
    pub default_max_queue_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_queue_size: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProductionConfig {
    pub default_target_production: f64,
    pub mining_site_id: String,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            default_target_production: defaults::TARGET_PRODUCTION,
            mining_site_id: "SITE-01".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; falls back to the environment's default level
    pub level: Option<String>,
    pub json: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            json: false,
            ansi: true,
        }
    }
}

impl FleetConfig {
    /// Validate configuration values that serde cannot check
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.dispatch.tick_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.tick_interval_ms",
                0,
                "tick interval must be greater than 0",
            ));
        }

        if self.dispatch.max_dispatch_per_tick == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.max_dispatch_per_tick",
                0,
                "at least one truck must be dispatchable per tick",
            ));
        }

        if self.dispatch.dump_headroom_wait_minutes <= 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.dump_headroom_wait_minutes",
                self.dispatch.dump_headroom_wait_minutes,
                "must be a positive number of minutes",
            ));
        }

        if self.dispatch.real_time_factor.is_nan() || self.dispatch.real_time_factor < 0.0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.real_time_factor",
                self.dispatch.real_time_factor,
                "must be 0 or positive",
            ));
        }

        let cycle = &self.cycle;
        if !(cycle.load_factor_min > 0.0
            && cycle.load_factor_min <= cycle.load_factor_max
            && cycle.load_factor_max <= 1.0)
        {
            return Err(ConfigurationError::invalid_value(
                "cycle.load_factor_min..load_factor_max",
                format!("{}..{}", cycle.load_factor_min, cycle.load_factor_max),
                "load factors must satisfy 0 < min <= max <= 1",
            ));
        }

        if cycle.dumping_rate_tpm <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "cycle.dumping_rate_tpm",
                cycle.dumping_rate_tpm,
                "dumping rate must be positive",
            ));
        }

        if cycle.return_speed_factor <= 0.0 || cycle.loaded_fuel_factor <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "cycle.return_speed_factor/loaded_fuel_factor",
                format!("{}/{}", cycle.return_speed_factor, cycle.loaded_fuel_factor),
                "factors must be positive",
            ));
        }

        crate::delay::DelayPolicy::new(self.delay.seed, self.delay.rules.clone())
            .validate()
            .map_err(|e| ConfigurationError::invalid_value("delay.rules", "<rules>", e.to_string()))?;

        if self.queue.default_max_queue_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.default_max_queue_size",
                0,
                "queue size must be greater than 0",
            ));
        }

        if self.production.default_target_production < 0.0 {
            return Err(ConfigurationError::invalid_value(
                "production.default_target_production",
                self.production.default_target_production,
                "target cannot be negative",
            ));
        }

        if self.production.mining_site_id.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "production.mining_site_id",
                "",
                "mining site id is required",
            ));
        }

        Ok(())
    }
}
