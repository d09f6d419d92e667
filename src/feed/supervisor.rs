//! # Live Feed Supervisor
//!
//! Chooses between the live source and the simulated feed and keeps the
//! dashboard supplied with station snapshots.
//!
//! ## States
//!
//! ```text
//!            use_mock_data
//!   start ─────────────────────► Simulated ──stop──► Stopped
//!     │                              ▲
//!     │ live                         │ source error /
//!     ▼                              │ source unavailable
//!   Live ────────────────────────────┘
//!     │
//!     └──────────stop───────────────────────────────► Stopped
//! ```
//!
//! The fallback to the simulated feed happens at most once and is permanent
//! for the lifetime of the supervisor. `Stopped` is terminal.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::simulated::{SimulatedFeed, SnapshotCallback};
use super::source::{DataCallback, ErrorCallback, LiveSource, Subscription};
use crate::config::FeedConfig;
use crate::error::{Result, TelemetryError};
use crate::history::MemoryHistoryStore;
use crate::telemetry::{NormalizedSlotRecord, Normalizer, RawSample, StationSnapshot};

/// Which source currently feeds the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    Live,
    Simulated,
    Stopped,
}

/// Observable supervisor state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedState {
    pub active_source: FeedMode,
    /// Reason for the fallback, if one happened.
    pub last_error: Option<String>,
}

/// Consumer callbacks.
#[derive(Clone)]
pub struct FeedHandlers {
    pub on_data: SnapshotCallback,
    pub on_error: Option<ErrorCallback>,
}

impl FeedHandlers {
    pub fn new(on_data: SnapshotCallback) -> Self {
        Self { on_data, on_error: None }
    }

    pub fn with_error(mut self, on_error: ErrorCallback) -> Self {
        self.on_error = Some(on_error);
        self
    }
}

struct Shared {
    state: FeedState,
    latest: Option<StationSnapshot>,
    live: Option<Subscription>,
    simulated: Option<SimulatedFeed>,
}

struct Inner {
    config: FeedConfig,
    normalizer: Normalizer,
    history: Option<Arc<MemoryHistoryStore>>,
    handlers: FeedHandlers,
    shared: Mutex<Shared>,
}

/// Owner handle of a running feed. Dropping it stops the feed.
pub struct FeedSupervisor {
    inner: Arc<Inner>,
}

impl FeedSupervisor {
    /// Starts the feed.
    ///
    /// With `use_mock_data` set the simulated feed starts directly and
    /// `connect` is never called. Otherwise `connect` builds the live source;
    /// if that or the subscription fails, the supervisor falls back to the
    /// simulated feed and reports the error through `on_error`.
    ///
    /// Live samples are recorded into `history` when one is given.
    pub fn start<F>(
        config: FeedConfig,
        normalizer: Normalizer,
        history: Option<Arc<MemoryHistoryStore>>,
        handlers: FeedHandlers,
        connect: F,
    ) -> Self
    where
        F: FnOnce(&FeedConfig) -> Result<Box<dyn LiveSource>>,
    {
        let initial = if config.use_mock_data {
            FeedMode::Simulated
        } else {
            FeedMode::Live
        };

        let inner = Arc::new(Inner {
            config,
            normalizer,
            history,
            handlers,
            shared: Mutex::new(Shared {
                state: FeedState {
                    active_source: initial,
                    last_error: None,
                },
                latest: None,
                live: None,
                simulated: None,
            }),
        });

        match initial {
            FeedMode::Simulated => {
                info!("Using simulated feed for {}", inner.config.station_id);
                inner.start_simulated();
            }
            _ => Inner::start_live(&inner, connect),
        }

        Self { inner }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> FeedState {
        self.inner.lock().state.clone()
    }

    #[must_use]
    pub fn mode(&self) -> FeedMode {
        self.inner.lock().state.active_source
    }

    /// Most recent snapshot delivered to the consumer.
    #[must_use]
    pub fn latest(&self) -> Option<StationSnapshot> {
        self.inner.lock().latest.clone()
    }

    /// Releases the live subscription and the simulated timer. Idempotent.
    ///
    /// No delivery begins after `stop` returns.
    pub fn stop(&self) {
        self.inner.stop();
    }
}

impl Drop for FeedSupervisor {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl std::fmt::Debug for FeedSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSupervisor")
            .field("station_id", &self.inner.config.station_id)
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_live<F>(this: &Arc<Self>, connect: F)
    where
        F: FnOnce(&FeedConfig) -> Result<Box<dyn LiveSource>>,
    {
        let mut source = match connect(&this.config) {
            Ok(source) => source,
            Err(e) => {
                this.fall_back(TelemetryError::SourceUnavailable(e.to_string()));
                return;
            }
        };

        let on_data: DataCallback = {
            let weak: Weak<Self> = Arc::downgrade(this);
            Arc::new(move |sample: RawSample| {
                if let Some(inner) = weak.upgrade() {
                    inner.deliver_live(sample);
                }
            })
        };
        let on_error: ErrorCallback = {
            let weak: Weak<Self> = Arc::downgrade(this);
            Arc::new(move |e: TelemetryError| {
                if let Some(inner) = weak.upgrade() {
                    inner.fall_back(e);
                }
            })
        };

        info!("Subscribing to {}", source.description());
        match source.subscribe(on_data, on_error) {
            Ok(subscription) => {
                let mut shared = this.lock();
                if shared.state.active_source == FeedMode::Live {
                    shared.live = Some(subscription);
                } else {
                    // Failed or stopped before the subscription was stored
                    drop(shared);
                    drop(subscription);
                }
            }
            Err(e) => this.fall_back(e),
        }
    }

    fn fall_back(self: &Arc<Self>, e: TelemetryError) {
        let live = {
            let mut shared = self.lock();
            if shared.state.active_source != FeedMode::Live {
                debug!("Ignoring source error in {:?} state: {}", shared.state.active_source, e);
                return;
            }
            shared.state.active_source = FeedMode::Simulated;
            shared.state.last_error = Some(e.to_string());
            shared.live.take()
        };
        drop(live);

        warn!("Live source failed, falling back to simulated feed: {}", e);
        if let Some(on_error) = &self.handlers.on_error {
            on_error(e);
        }
        self.start_simulated();
    }

    fn start_simulated(self: &Arc<Self>) {
        let on_data: SnapshotCallback = {
            let weak: Weak<Self> = Arc::downgrade(self);
            Arc::new(move |snapshot: StationSnapshot| {
                if let Some(inner) = weak.upgrade() {
                    inner.deliver_simulated(snapshot);
                }
            })
        };
        let mut feed = SimulatedFeed::new(
            self.config.station_id.clone(),
            self.config.slot_count,
            Duration::from_millis(self.config.simulated_tick_ms),
            on_data,
        );

        let mut shared = self.lock();
        if shared.state.active_source != FeedMode::Simulated {
            return;
        }
        match feed.start() {
            Ok(()) => shared.simulated = Some(feed),
            Err(e) => error!("Simulated feed failed to start: {}", e),
        }
    }

    fn deliver_live(&self, sample: RawSample) {
        if self.lock().state.active_source != FeedMode::Live {
            debug!("Dropping live sample outside live state");
            return;
        }

        if let Some(history) = &self.history {
            history.record(&self.config.collection_name, sample.clone());
        }
        let snapshot = self.live_snapshot(&sample, Utc::now());
        self.deliver(FeedMode::Live, snapshot);
    }

    fn deliver_simulated(&self, snapshot: StationSnapshot) {
        self.deliver(FeedMode::Simulated, snapshot);
    }

    fn deliver(&self, mode: FeedMode, snapshot: StationSnapshot) {
        {
            let mut shared = self.lock();
            if shared.state.active_source != mode {
                return;
            }
            shared.latest = Some(snapshot.clone());
        }
        (self.handlers.on_data)(snapshot);
    }

    /// The live reading fills the live slot; every other slot is empty.
    fn live_snapshot(&self, sample: &RawSample, now: DateTime<Utc>) -> StationSnapshot {
        let slots = (1..=self.config.slot_count)
            .map(|slot_id| {
                if slot_id == self.config.live_slot {
                    self.normalizer.normalize_sample(
                        slot_id,
                        Some(self.config.live_battery_id.clone()),
                        sample,
                        now,
                    )
                } else {
                    NormalizedSlotRecord::empty(slot_id, now)
                }
            })
            .collect();

        StationSnapshot::new(self.config.station_id.clone(), now, slots)
    }

    fn stop(&self) {
        let (live, simulated) = {
            let mut shared = self.lock();
            if shared.state.active_source == FeedMode::Stopped {
                return;
            }
            shared.state.active_source = FeedMode::Stopped;
            (shared.live.take(), shared.simulated.take())
        };

        drop(live);
        if let Some(mut feed) = simulated {
            feed.stop();
        }
        info!("Feed supervisor for {} stopped", self.config.station_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::source::{ChannelSource, SourceMessage};
    use crate::telemetry::ChargingState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct Recorder {
        snapshots: Arc<Mutex<Vec<StationSnapshot>>>,
        errors: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                snapshots: Arc::new(Mutex::new(Vec::new())),
                errors: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn handlers(&self) -> FeedHandlers {
            let snapshots = self.snapshots.clone();
            let errors = self.errors.clone();
            FeedHandlers::new(Arc::new(move |snapshot: StationSnapshot| snapshots.lock().unwrap().push(snapshot)))
                .with_error(Arc::new(move |e: TelemetryError| errors.lock().unwrap().push(e.to_string())))
        }

        fn snapshot_count(&self) -> usize {
            self.snapshots.lock().unwrap().len()
        }

        fn error_count(&self) -> usize {
            self.errors.lock().unwrap().len()
        }
    }

    fn feed_config(use_mock_data: bool) -> FeedConfig {
        FeedConfig {
            use_mock_data,
            ..FeedConfig::default()
        }
    }

    fn channel_connect(
        source: ChannelSource,
    ) -> impl FnOnce(&FeedConfig) -> Result<Box<dyn LiveSource>> {
        move |_| Ok(Box::new(source) as Box<dyn LiveSource>)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn live_supervisor(
        recorder: &Recorder,
        history: Option<Arc<MemoryHistoryStore>>,
    ) -> (FeedSupervisor, mpsc::Sender<SourceMessage>) {
        let (tx, source) = ChannelSource::create("test", 16);
        let supervisor = FeedSupervisor::start(
            feed_config(false),
            Normalizer::default(),
            history,
            recorder.handlers(),
            channel_connect(source),
        );
        (supervisor, tx)
    }

    // ==================== Start Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_mock_mode_never_connects() {
        let recorder = Recorder::new();
        let connects = Arc::new(AtomicUsize::new(0));
        let counter = connects.clone();

        let supervisor = FeedSupervisor::start(
            feed_config(true),
            Normalizer::default(),
            None,
            recorder.handlers(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TelemetryError::SourceUnavailable("unused".to_string()))
            },
        );

        assert_eq!(supervisor.mode(), FeedMode::Simulated);
        assert_eq!(connects.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(recorder.snapshot_count(), 3);
        assert_eq!(recorder.error_count(), 0);
        assert_eq!(supervisor.latest().map(|s| s.slots.len()), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_source_falls_back_immediately() {
        let recorder = Recorder::new();
        let supervisor = FeedSupervisor::start(
            feed_config(false),
            Normalizer::default(),
            None,
            recorder.handlers(),
            |_| Err(TelemetryError::SourceUnavailable("missing credentials".to_string())),
        );

        let state = supervisor.state();
        assert_eq!(state.active_source, FeedMode::Simulated);
        assert!(state.last_error.unwrap().contains("missing credentials"));
        assert_eq!(recorder.error_count(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(recorder.snapshot_count(), 1);
    }

    // ==================== Live Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_live_sample_fills_live_slot() {
        let recorder = Recorder::new();
        let history = Arc::new(MemoryHistoryStore::new(10));
        let (supervisor, tx) = live_supervisor(&recorder, Some(history.clone()));
        assert_eq!(supervisor.mode(), FeedMode::Live);

        tx.send(Ok(RawSample::new(12.8, 2500.0, 31.0))).await.unwrap();
        settle().await;

        let snapshots = recorder.snapshots.lock().unwrap().clone();
        assert_eq!(snapshots.len(), 1);
        let snapshot = &snapshots[0];
        assert_eq!(snapshot.station_id, "STATION_001");
        assert_eq!(snapshot.slots.len(), 3);

        let live = snapshot.slot(1).unwrap();
        assert_eq!(live.battery_id.as_deref(), Some("BAT_001"));
        assert_eq!(live.current_amps, Some(2.5));
        assert_eq!(live.power_watts, Some(32.0));
        assert_eq!(live.charging_state, ChargingState::Charging);
        assert!(!snapshot.slot(2).unwrap().occupied);
        assert!(!snapshot.slot(3).unwrap().occupied);

        assert_eq!(history.len("batteryReadings"), 1);
        assert_eq!(supervisor.latest().as_ref(), Some(snapshot));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_error_falls_back_once() {
        let recorder = Recorder::new();
        let (supervisor, tx) = live_supervisor(&recorder, None);

        tx.send(Ok(RawSample::new(12.5, 0.0, 25.0))).await.unwrap();
        tx.send(Err("quota exceeded".to_string())).await.unwrap();
        settle().await;

        assert_eq!(supervisor.mode(), FeedMode::Simulated);
        assert_eq!(recorder.error_count(), 1);
        assert_eq!(recorder.snapshot_count(), 1);

        // The live task is gone; later sends cannot reach the consumer
        let _ = tx.send(Ok(RawSample::new(12.5, 0.0, 25.0))).await;
        settle().await;
        assert_eq!(recorder.snapshot_count(), 1);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(recorder.snapshot_count(), 3);
        assert_eq!(recorder.error_count(), 1);
        assert_eq!(supervisor.mode(), FeedMode::Simulated);

        // Simulated snapshots carry the demo batteries
        let latest = supervisor.latest().unwrap();
        assert_eq!(latest.slot(2).unwrap().battery_id.as_deref(), Some("BAT_002"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_source_falls_back() {
        let recorder = Recorder::new();
        let (supervisor, tx) = live_supervisor(&recorder, None);
        drop(tx);
        settle().await;

        assert_eq!(supervisor.mode(), FeedMode::Simulated);
        assert_eq!(recorder.error_count(), 1);
    }

    // ==================== Stop Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_terminal() {
        let recorder = Recorder::new();
        let supervisor = FeedSupervisor::start(
            feed_config(true),
            Normalizer::default(),
            None,
            recorder.handlers(),
            |_| Err(TelemetryError::SourceUnavailable("unused".to_string())),
        );

        tokio::time::sleep(Duration::from_millis(1500)).await;
        supervisor.stop();
        supervisor.stop();
        assert_eq!(supervisor.mode(), FeedMode::Stopped);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recorder.snapshot_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releases_live_subscription() {
        let recorder = Recorder::new();
        let (supervisor, tx) = live_supervisor(&recorder, None);
        supervisor.stop();
        settle().await;

        // Errors after stop never trigger a fallback
        let _ = tx.send(Err("late failure".to_string())).await;
        settle().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(supervisor.mode(), FeedMode::Stopped);
        assert_eq!(recorder.error_count(), 0);
        assert_eq!(recorder.snapshot_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_feed() {
        let recorder = Recorder::new();
        let supervisor = FeedSupervisor::start(
            feed_config(true),
            Normalizer::default(),
            None,
            recorder.handlers(),
            |_| Err(TelemetryError::SourceUnavailable("unused".to_string())),
        );
        drop(supervisor);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(recorder.snapshot_count(), 0);
    }
}
