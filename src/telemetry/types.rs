//! # Telemetry Types
//!
//! Raw sensor readings as delivered by a source, and the canonical records the
//! normalizer produces from them.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Charging state of a station slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargingState {
    Charging,
    Full,
    Idle,
    Discharging,
    /// No battery in the slot.
    Empty,
}

impl ChargingState {
    /// Whether the slot counts towards the station's active battery total.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, ChargingState::Charging | ChargingState::Full)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargingState::Charging => "charging",
            ChargingState::Full => "full",
            ChargingState::Idle => "idle",
            ChargingState::Discharging => "discharging",
            ChargingState::Empty => "empty",
        }
    }
}

impl fmt::Display for ChargingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sensor reading as provided by a live or recorded source.
///
/// Field names on the wire follow the sensor documents:
/// `{ "voltage": 12.6, "current_mA": 850, "temperatureC": 27.5, "created_at": "..." }`.
/// Numeric fields accept numbers or numeric strings; anything else decodes
/// to `None` instead of failing the whole document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawSample {
    #[serde(rename = "voltage", default, deserialize_with = "lenient_f64")]
    pub voltage_volts: Option<f64>,

    #[serde(rename = "current_mA", default, deserialize_with = "lenient_f64")]
    pub current_milliamps: Option<f64>,

    #[serde(rename = "temperatureC", default, deserialize_with = "lenient_f64")]
    pub temperature_celsius: Option<f64>,

    #[serde(rename = "created_at", default, deserialize_with = "lenient_timestamp")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl RawSample {
    /// Creates a reading without a capture timestamp.
    #[must_use]
    pub fn new(voltage_volts: f64, current_milliamps: f64, temperature_celsius: f64) -> Self {
        Self {
            voltage_volts: Some(voltage_volts),
            current_milliamps: Some(current_milliamps),
            temperature_celsius: Some(temperature_celsius),
            captured_at: None,
        }
    }

    #[must_use]
    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    /// Parses one JSON document.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().and_then(finite),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(finite),
        _ => None,
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        // Epoch milliseconds
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    })
}

/// One slot's reading: which slot, which battery, and the sample if a battery
/// is present.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotReading {
    pub slot_id: u32,
    pub battery_id: Option<String>,
    pub sample: Option<RawSample>,
}

impl SlotReading {
    #[must_use]
    pub fn occupied(slot_id: u32, battery_id: impl Into<String>, sample: RawSample) -> Self {
        Self {
            slot_id,
            battery_id: Some(battery_id.into()),
            sample: Some(sample),
        }
    }

    #[must_use]
    pub fn empty(slot_id: u32) -> Self {
        Self {
            slot_id,
            battery_id: None,
            sample: None,
        }
    }

    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.sample.is_some()
    }
}

/// Canonical slot state derived from a raw reading.
///
/// Every optional metric is `None` when `occupied` is false.
/// `state_of_charge_percent` is always within `[0, 100]` and `power_watts` is
/// present only when both voltage and current are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSlotRecord {
    pub slot_id: u32,
    pub occupied: bool,
    pub battery_id: Option<String>,
    pub voltage_volts: Option<f64>,
    pub current_amps: Option<f64>,
    pub temperature_celsius: Option<f64>,
    pub state_of_charge_percent: Option<f64>,
    pub charging_state: ChargingState,
    pub power_watts: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl NormalizedSlotRecord {
    /// Record for a slot with no battery present.
    #[must_use]
    pub fn empty(slot_id: u32, observed_at: DateTime<Utc>) -> Self {
        Self {
            slot_id,
            occupied: false,
            battery_id: None,
            voltage_volts: None,
            current_amps: None,
            temperature_celsius: None,
            state_of_charge_percent: None,
            charging_state: ChargingState::Empty,
            power_watts: None,
            observed_at,
        }
    }
}

/// Snapshot of every slot of one station at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub observed_at: DateTime<Utc>,
    pub station_id: String,
    pub slots: Vec<NormalizedSlotRecord>,
    #[serde(default)]
    pub alerts: Vec<String>,
}

impl StationSnapshot {
    #[must_use]
    pub fn new(station_id: impl Into<String>, observed_at: DateTime<Utc>, slots: Vec<NormalizedSlotRecord>) -> Self {
        Self {
            observed_at,
            station_id: station_id.into(),
            slots,
            alerts: Vec::new(),
        }
    }

    /// Number of slots currently charging or full.
    #[must_use]
    pub fn active_slot_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.charging_state.is_active())
            .count()
    }

    /// Looks up a slot by its id.
    #[must_use]
    pub fn slot(&self, slot_id: u32) -> Option<&NormalizedSlotRecord> {
        self.slots.iter().find(|slot| slot.slot_id == slot_id)
    }
}
