//! # Sample Normalizer
//!
//! Turns a raw slot reading into a [`NormalizedSlotRecord`]: fixes units,
//! rounds for display, estimates SoC, classifies the charging state and
//! derives power.
//!
//! Normalization is total. Missing or garbage numeric inputs produce `None`
//! metrics and an `Idle` classification, never an error.

use chrono::{DateTime, Utc};

use super::calibration::CalibrationProfile;
use super::types::{NormalizedSlotRecord, RawSample, SlotReading};

/// Milliamps per amp
const MILLIAMPS_PER_AMP: f64 = 1000.0;

/// Rounds to a fixed number of decimal places.
///
/// # Examples
///
/// ```
/// use station_telemetry::telemetry::normalizer::round_to;
///
/// assert_eq!(round_to(12.3456, 2), 12.35);
/// assert_eq!(round_to(-0.004, 2), 0.0);
/// ```
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let rounded = (value * factor).round() / factor;
    // Avoid "-0" in display output
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Stateless normalizer parameterized over a calibration profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    profile: CalibrationProfile,
}

impl Normalizer {
    #[must_use]
    pub fn new(profile: CalibrationProfile) -> Self {
        Self { profile }
    }

    #[must_use]
    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    /// Normalizes a slot reading, stamping undated samples with the current time.
    ///
    /// # Examples
    ///
    /// ```
    /// use station_telemetry::telemetry::{ChargingState, Normalizer, RawSample, SlotReading};
    ///
    /// let normalizer = Normalizer::default();
    /// let reading = SlotReading::occupied(1, "BAT_001", RawSample::new(12.8, 2500.0, 31.24));
    /// let record = normalizer.normalize(&reading);
    ///
    /// assert_eq!(record.current_amps, Some(2.5));
    /// assert_eq!(record.temperature_celsius, Some(31.2));
    /// assert_eq!(record.power_watts, Some(32.0));
    /// assert_eq!(record.charging_state, ChargingState::Charging);
    /// ```
    #[must_use]
    pub fn normalize(&self, reading: &SlotReading) -> NormalizedSlotRecord {
        self.normalize_at(reading, Utc::now())
    }

    /// Normalizes a slot reading; `now` is used when the sample has no
    /// capture time and for empty slots.
    #[must_use]
    pub fn normalize_at(&self, reading: &SlotReading, now: DateTime<Utc>) -> NormalizedSlotRecord {
        match &reading.sample {
            Some(sample) => self.normalize_sample(reading.slot_id, reading.battery_id.clone(), sample, now),
            None => NormalizedSlotRecord::empty(reading.slot_id, now),
        }
    }

    /// Normalizes the sample of an occupied slot.
    #[must_use]
    pub fn normalize_sample(
        &self,
        slot_id: u32,
        battery_id: Option<String>,
        sample: &RawSample,
        now: DateTime<Utc>,
    ) -> NormalizedSlotRecord {
        let voltage = sample.voltage_volts.filter(|v| v.is_finite());
        let current_ma = sample.current_milliamps.filter(|c| c.is_finite());
        let temperature = sample.temperature_celsius.filter(|t| t.is_finite());
        let current_amps = current_ma.map(|ma| ma / MILLIAMPS_PER_AMP);

        let power = match (voltage, current_amps) {
            (Some(v), Some(a)) => Some(round_to(v * a, 2)),
            _ => None,
        };

        NormalizedSlotRecord {
            slot_id,
            occupied: true,
            battery_id,
            voltage_volts: voltage.map(|v| round_to(v, 2)),
            current_amps: current_amps.map(|a| round_to(a, 2)),
            temperature_celsius: temperature.map(|t| round_to(t, 1)),
            state_of_charge_percent: voltage.map(|v| round_to(self.profile.state_of_charge(v), 1)),
            charging_state: self.profile.classify(current_ma, voltage),
            power_watts: power,
            observed_at: sample.captured_at.unwrap_or(now),
        }
    }
}
