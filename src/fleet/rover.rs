//! Rover telemetry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating status of a rover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoverStatus {
    Active,
    Idle,
    Charging,
    Maintenance,
}

impl RoverStatus {
    pub const ALL: [RoverStatus; 4] = [
        RoverStatus::Active,
        RoverStatus::Idle,
        RoverStatus::Charging,
        RoverStatus::Maintenance,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RoverStatus::Active => "active",
            RoverStatus::Idle => "idle",
            RoverStatus::Charging => "charging",
            RoverStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for RoverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Operational,
    Warning,
}

/// Coarse battery band used for highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryBand {
    /// Above 60 %
    Good,
    /// Above 30 %
    Moderate,
    Low,
}

impl BatteryBand {
    #[must_use]
    pub fn for_level(level: f64) -> Self {
        if level > 60.0 {
            BatteryBand::Good
        } else if level > 30.0 {
            BatteryBand::Moderate
        } else {
            BatteryBand::Low
        }
    }
}

/// Latest telemetry of one rover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rover {
    pub id: String,
    pub name: String,
    pub status: RoverStatus,
    /// Battery level in percent, `[0, 100]`
    pub battery_level: f64,
    pub location: String,
    /// km/h
    pub speed: f64,
    /// °C
    pub temperature: f64,
    /// km travelled
    pub distance: f64,
    pub last_update: DateTime<Utc>,
    pub mission_status: MissionStatus,
}

impl Rover {
    #[must_use]
    pub fn battery_band(&self) -> BatteryBand {
        BatteryBand::for_level(self.battery_level)
    }
}

/// Rover counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    pub charging: usize,
    pub maintenance: usize,
}

impl FleetSummary {
    #[must_use]
    pub fn count(&self, status: RoverStatus) -> usize {
        match status {
            RoverStatus::Active => self.active,
            RoverStatus::Idle => self.idle,
            RoverStatus::Charging => self.charging,
            RoverStatus::Maintenance => self.maintenance,
        }
    }
}

impl fmt::Display for FleetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} active", self.active, self.total)
    }
}

/// Counts rovers per status.
///
/// ```
/// use station_telemetry::fleet::{summary, FleetSimulator};
///
/// let fleet = FleetSimulator::new(12);
/// let counts = summary(fleet.rovers());
/// assert_eq!(counts.total, 12);
/// assert_eq!(counts.active + counts.idle + counts.charging + counts.maintenance, 12);
/// ```
#[must_use]
pub fn summary(rovers: &[Rover]) -> FleetSummary {
    rovers.iter().fold(
        FleetSummary {
            total: rovers.len(),
            ..FleetSummary::default()
        },
        |mut counts, rover| {
            match rover.status {
                RoverStatus::Active => counts.active += 1,
                RoverStatus::Idle => counts.idle += 1,
                RoverStatus::Charging => counts.charging += 1,
                RoverStatus::Maintenance => counts.maintenance += 1,
            }
            counts
        },
    )
}

/// Rovers with the given status, in fleet order.
pub fn with_status(rovers: &[Rover], status: RoverStatus) -> impl Iterator<Item = &Rover> {
    rovers.iter().filter(move |rover| rover.status == status)
}
