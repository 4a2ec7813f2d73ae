//! Cycle timing model. Phase lengths come from equipment and road data; the
//! only random input is the load factor, drawn from a seeded generator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::CycleConfig;
use crate::delay::attributor::derive_seed;
use crate::models::{round2, Excavator, RoadSegment, Truck};

#[derive(Debug, Clone)]
pub struct CycleTimingModel {
    config: CycleConfig,
    seed: u64,
    rng: StdRng,
}

impl CycleTimingModel {
    pub fn new(config: CycleConfig) -> Self {
        let seed = config.seed;
        Self {
            config,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Per-cycle model derived from the base seed and a stable key
    pub fn fork(&self, key: &str) -> Self {
        let seed = derive_seed(self.config.seed, key);
        Self {
            config: self.config.clone(),
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// Uniform load factor within the configured band
    pub fn sample_load_factor(&mut self) -> f64 {
        let (min, max) = (self.config.load_factor_min, self.config.load_factor_max);
        if min >= max {
            return max;
        }
        self.rng.random_range(min..=max)
    }

    /// Capacity over the excavator's production rate
    pub fn loading_minutes(&self, truck: &Truck, excavator: &Excavator) -> i64 {
        if excavator.production_rate <= 0.0 {
            return 1;
        }
        whole_minutes(truck.capacity / excavator.production_rate)
    }

    /// Loaded run from loading point to dumping point
    pub fn haul_minutes(&self, truck: &Truck, road: &RoadSegment) -> i64 {
        self.travel_minutes(road.distance, self.effective_speed(truck, road))
    }

    /// Empty run back, faster than the loaded haul
    pub fn return_minutes(&self, truck: &Truck, road: &RoadSegment) -> i64 {
        let speed = self.effective_speed(truck, road) * self.config.return_speed_factor;
        self.travel_minutes(road.distance, speed)
    }

    pub fn dumping_minutes(&self, load_weight: f64) -> i64 {
        if self.config.dumping_rate_tpm <= 0.0 {
            return 1;
        }
        whole_minutes(load_weight / self.config.dumping_rate_tpm)
    }

    /// Round trip burn: 2 x distance x rate, scaled for weather and load
    pub fn fuel_consumed(&self, truck: &Truck, distance: f64) -> f64 {
        round2(
            2.0 * distance
                * truck.fuel_consumption_rate
                * self.config.weather.risk().fuel_factor()
                * self.config.loaded_fuel_factor,
        )
    }

    fn effective_speed(&self, truck: &Truck, road: &RoadSegment) -> f64 {
        truck.average_speed.min(road.max_speed)
            * self.config.weather.speed_factor()
            * road.road_condition.speed_factor()
    }

    fn travel_minutes(&self, distance: f64, speed_kmh: f64) -> i64 {
        if speed_kmh <= 0.0 {
            return 1;
        }
        whole_minutes(distance / speed_kmh * 60.0)
    }
}

impl Default for CycleTimingModel {
    fn default() -> Self {
        Self::new(CycleConfig::default())
    }
}

/// Round up to whole minutes, at least one
fn whole_minutes(minutes: f64) -> i64 {
    if !minutes.is_finite() {
        return 1;
    }
    (minutes.ceil() as i64).max(1)
}
