//! Live history of the selected rover.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::rover::{Rover, RoverStatus};
use crate::history::{metric, TrackedSample, WindowBuffer};
use crate::telemetry::normalizer::round_to;

/// Points kept for the selected rover (about two minutes of 5 s updates)
pub const DEFAULT_BUFFER_CAPACITY: usize = 24;

/// Feeds fleet updates for one selected rover into a [`WindowBuffer`].
///
/// ```
/// use chrono::{Duration, Utc};
/// use station_telemetry::fleet::{FleetSimulator, RoverTracker};
///
/// let start = Utc::now();
/// let mut fleet = FleetSimulator::with_seed(12, 1, start);
/// let mut tracker = RoverTracker::default();
///
/// tracker.observe(fleet.rovers(), start);
/// tracker.observe(fleet.advance(start + Duration::seconds(5)), start + Duration::seconds(5));
///
/// assert!(tracker.selected().is_some());
/// assert_eq!(tracker.window().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RoverTracker {
    window: WindowBuffer,
}

impl Default for RoverTracker {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl RoverTracker {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            window: WindowBuffer::new(capacity),
        }
    }

    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.window.selected()
    }

    #[must_use]
    pub fn window(&self) -> &WindowBuffer {
        &self.window
    }

    /// Switches to another rover, discarding the current history.
    pub fn select(&mut self, rover_id: &str) {
        info!("Tracking rover {}", rover_id);
        self.window.select(rover_id);
    }

    /// Records the selected rover's readings from a fleet update.
    ///
    /// Without a selection, the first active rover (or the first rover) is
    /// selected. Returns the drain rate when a point was recorded.
    pub fn observe(&mut self, rovers: &[Rover], now: DateTime<Utc>) -> Option<f64> {
        if self.window.selected().is_none() {
            let default = default_selection(rovers)?;
            self.select(&default.id);
        }

        let selected = self.window.selected()?;
        let Some(rover) = rovers.iter().find(|rover| rover.id == selected) else {
            debug!("Selected rover {} missing from update", selected);
            return None;
        };

        let sample = TrackedSample::new(now, rover.battery_level)
            .with_metric(metric::BATTERY, Some(round_to(rover.battery_level, 1)))
            .with_metric(metric::TEMPERATURE, Some(rover.temperature))
            .with_metric(metric::SPEED, Some(rover.speed));

        let id = rover.id.clone();
        self.window.append(&id, sample)
    }
}

/// First active rover, else the first rover.
#[must_use]
pub fn default_selection(rovers: &[Rover]) -> Option<&Rover> {
    rovers
        .iter()
        .find(|rover| rover.status == RoverStatus::Active)
        .or_else(|| rovers.first())
}
