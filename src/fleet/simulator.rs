//! Simulated rover fleet.
//!
//! Rovers are generated with random status, location and readings, then
//! updated on each [`advance`](FleetSimulator::advance): the battery level
//! random-walks by up to ±2.5 %, speed and temperature are re-rolled.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::rover::{MissionStatus, Rover, RoverStatus};
use crate::telemetry::normalizer::round_to;

/// Interval between fleet updates
pub const UPDATE_PERIOD: std::time::Duration = std::time::Duration::from_secs(5);

pub const LOCATIONS: [&str; 5] = ["Zone A", "Zone B", "Zone C", "Zone D", "Charging Bay"];

/// Maximum battery change per update, in percent
const BATTERY_STEP: f64 = 5.0;

/// Rover id for a 1-based fleet index.
///
/// ```
/// use station_telemetry::fleet::simulator::rover_id;
///
/// assert_eq!(rover_id(7), "ROV-007");
/// ```
#[must_use]
pub fn rover_id(index: usize) -> String {
    format!("ROV-{:03}", index)
}

fn random_temperature<R: Rng>(rng: &mut R) -> f64 {
    round_to(20.0 + rng.random::<f64>() * 15.0, 1)
}

fn random_speed<R: Rng>(rng: &mut R) -> f64 {
    f64::from(rng.random_range(0..50u32))
}

fn generate_rover<R: Rng>(rng: &mut R, index: usize, now: DateTime<Utc>) -> Rover {
    let status = RoverStatus::ALL[rng.random_range(0..RoverStatus::ALL.len())];
    let location = LOCATIONS[rng.random_range(0..LOCATIONS.len())];
    let staleness_ms = rng.random_range(0..300_000i64);

    Rover {
        id: rover_id(index),
        name: format!("Rover {}", index),
        status,
        battery_level: f64::from(rng.random_range(0..100u32)),
        location: location.to_string(),
        speed: random_speed(rng),
        temperature: random_temperature(rng),
        distance: round_to(rng.random::<f64>() * 500.0, 1),
        last_update: now - Duration::milliseconds(staleness_ms),
        mission_status: if rng.random::<f64>() > 0.3 {
            MissionStatus::Operational
        } else {
            MissionStatus::Warning
        },
    }
}

/// Random fleet with a random-walk update step.
#[derive(Debug)]
pub struct FleetSimulator {
    rovers: Vec<Rover>,
    rng: StdRng,
}

impl FleetSimulator {
    /// Generates `count` rovers, `ROV-001` onwards.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self::with_rng(count, StdRng::from_rng(&mut rand::rng()), Utc::now())
    }

    /// Deterministic fleet for a given seed.
    #[must_use]
    pub fn with_seed(count: usize, seed: u64, now: DateTime<Utc>) -> Self {
        Self::with_rng(count, StdRng::seed_from_u64(seed), now)
    }

    fn with_rng(count: usize, mut rng: StdRng, now: DateTime<Utc>) -> Self {
        let rovers = (1..=count).map(|index| generate_rover(&mut rng, index, now)).collect();
        Self { rovers, rng }
    }

    #[must_use]
    pub fn rovers(&self) -> &[Rover] {
        &self.rovers
    }

    /// Applies one update step stamped with `now`.
    pub fn advance(&mut self, now: DateTime<Utc>) -> &[Rover] {
        let rng = &mut self.rng;
        for rover in &mut self.rovers {
            let step = (rng.random::<f64>() - 0.5) * BATTERY_STEP;
            rover.battery_level = (rover.battery_level + step).clamp(0.0, 100.0);
            rover.speed = random_speed(rng);
            rover.temperature = random_temperature(rng);
            rover.last_update = now;
        }
        &self.rovers
    }
}
