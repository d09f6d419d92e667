//! Simulated station feed.
//!
//! Generates demo station snapshots on a fixed tick so dashboards keep
//! rendering when no live source is available.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{Result, TelemetryError};
use crate::telemetry::normalizer::round_to;
use crate::telemetry::{ChargingState, NormalizedSlotRecord, StationSnapshot};

/// Receives every snapshot a feed produces.
pub type SnapshotCallback = Arc<dyn Fn(StationSnapshot) + Send + Sync>;

/// Builds one demo snapshot.
///
/// Slot 1 holds a charging battery with randomized readings, slot 2 a full
/// battery resting at 12.60 V, and every other slot is empty.
///
/// ```
/// use chrono::Utc;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
/// use station_telemetry::feed::generate_station_snapshot;
///
/// let mut rng = StdRng::seed_from_u64(1);
/// let snapshot = generate_station_snapshot(&mut rng, "STATION_001", 3, Utc::now());
/// assert_eq!(snapshot.slots.len(), 3);
/// assert_eq!(snapshot.active_slot_count(), 2);
/// ```
pub fn generate_station_snapshot<R: Rng>(
    rng: &mut R,
    station_id: &str,
    slot_count: u32,
    now: DateTime<Utc>,
) -> StationSnapshot {
    let slots = (1..=slot_count)
        .map(|slot_id| match slot_id {
            1 => charging_slot(rng, now),
            2 => full_slot(rng, now),
            _ => NormalizedSlotRecord::empty(slot_id, now),
        })
        .collect();

    StationSnapshot::new(station_id, now, slots)
}

fn charging_slot<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> NormalizedSlotRecord {
    let voltage = round_to(rng.random_range(11.5..13.0), 2);
    let current = round_to(rng.random_range(1.0..9.0), 2);

    NormalizedSlotRecord {
        slot_id: 1,
        occupied: true,
        battery_id: Some("BAT_001".to_string()),
        voltage_volts: Some(voltage),
        current_amps: Some(current),
        temperature_celsius: Some(round_to(rng.random_range(25.0..40.0), 1)),
        state_of_charge_percent: Some(round_to(rng.random_range(40.0..80.0), 1)),
        charging_state: ChargingState::Charging,
        power_watts: Some(round_to(voltage * current, 2)),
        observed_at: now,
    }
}

fn full_slot<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> NormalizedSlotRecord {
    NormalizedSlotRecord {
        slot_id: 2,
        occupied: true,
        battery_id: Some("BAT_002".to_string()),
        voltage_volts: Some(12.6),
        current_amps: Some(0.0),
        temperature_celsius: Some(round_to(rng.random_range(23.0..28.0), 1)),
        state_of_charge_percent: Some(100.0),
        charging_state: ChargingState::Full,
        power_watts: Some(0.0),
        observed_at: now,
    }
}

/// Periodic generator of demo snapshots.
///
/// The first snapshot is emitted one period after [`start`](Self::start).
pub struct SimulatedFeed {
    station_id: String,
    slot_count: u32,
    period: Duration,
    on_data: SnapshotCallback,
    task: Option<JoinHandle<()>>,
}

impl SimulatedFeed {
    pub fn new(station_id: impl Into<String>, slot_count: u32, period: Duration, on_data: SnapshotCallback) -> Self {
        Self {
            station_id: station_id.into(),
            slot_count,
            period: period.max(Duration::from_millis(1)),
            on_data,
            task: None,
        }
    }

    /// Starts ticking. Calling it while already running has no effect.
    pub fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }

        let handle = Handle::try_current()
            .map_err(|e| TelemetryError::SourceUnavailable(format!("no async runtime: {}", e)))?;

        let station_id = self.station_id.clone();
        let slot_count = self.slot_count;
        let period = self.period;
        let on_data = self.on_data.clone();

        self.task = Some(handle.spawn(async move {
            let mut rng = StdRng::from_rng(&mut rand::rng());
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let snapshot = generate_station_snapshot(&mut rng, &station_id, slot_count, Utc::now());
                debug!("Simulated snapshot for {}", snapshot.station_id);
                on_data(snapshot);
            }
        }));

        info!("Simulated feed started ({} ms tick)", self.period.as_millis());
        Ok(())
    }

    /// Stops ticking. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Simulated feed stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for SimulatedFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SimulatedFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedFeed")
            .field("station_id", &self.station_id)
            .field("slot_count", &self.slot_count)
            .field("period", &self.period)
            .field("running", &self.is_running())
            .finish()
    }
}
