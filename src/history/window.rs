//! # Windowed History Buffer
//!
//! Fixed-capacity, oldest-evicting history of the currently selected entity,
//! with a derived drain-rate metric.
//!
//! ## Drain Rate
//!
//! Each append compares the tracked level (battery percent) against the
//! previous sample of the same entity:
//!
//! `drain_rate = (previous_level - level) / elapsed_minutes`
//!
//! Positive values mean the battery is draining, negative values mean it is
//! charging. The first append after a reset reports 0.
//!
//! ## Usage
//!
//! ```
//! use chrono::{Duration, Utc};
//! use station_telemetry::history::{metric, TrackedSample, WindowBuffer};
//!
//! let mut window = WindowBuffer::new(24);
//! window.select("ROV-001");
//!
//! let start = Utc::now();
//! window.append("ROV-001", TrackedSample::new(start, 80.0));
//! window.append("ROV-001", TrackedSample::new(start + Duration::minutes(1), 75.0));
//!
//! assert_eq!(window.latest().unwrap().metric(metric::DRAIN_RATE), Some(5.0));
//! ```

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::point::{metric, HistoryPoint, Metrics};
use super::sampler::SamplingPolicy;
use crate::telemetry::normalizer::round_to;

/// Milliseconds per minute
const MS_PER_MINUTE: f64 = 60_000.0;

/// One observation of a tracked entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSample {
    pub observed_at: DateTime<Utc>,
    /// Level the drain rate is derived from, in percent.
    pub level: f64,
    /// Extra metrics copied onto the history point.
    pub metrics: Metrics,
}

impl TrackedSample {
    #[must_use]
    pub fn new(observed_at: DateTime<Utc>, level: f64) -> Self {
        Self {
            observed_at,
            level,
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub fn with_metric(mut self, name: &str, value: Option<f64>) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }
}

/// Last raw observation, kept only to derive the next drain rate.
#[derive(Debug, Clone, PartialEq)]
struct PreviousSample {
    entity_id: String,
    observed_at: DateTime<Utc>,
    level: f64,
}

/// Bounded history for the selected entity.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    capacity: usize,
    selected: Option<String>,
    points: VecDeque<HistoryPoint>,
    previous: Option<PreviousSample>,
}

impl WindowBuffer {
    /// Creates an empty buffer holding at most `capacity` points (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            selected: None,
            points: VecDeque::with_capacity(capacity),
            previous: None,
        }
    }

    /// Creates a buffer sized to hold one full series for a range in minutes.
    #[must_use]
    pub fn for_range(range_minutes: u32) -> Self {
        Self::new(SamplingPolicy::for_range(range_minutes).len())
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points oldest first.
    pub fn points(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    /// Makes `entity_id` the tracked entity and clears all history.
    pub fn select(&mut self, entity_id: impl Into<String>) {
        let entity_id = entity_id.into();
        debug!("Window selected {}", entity_id);
        self.selected = Some(entity_id);
        self.reset();
    }

    /// Clears points and the previous sample; the selection is kept.
    pub fn reset(&mut self) {
        self.points.clear();
        self.previous = None;
    }

    /// Appends an observation of `entity_id`.
    ///
    /// Observations of a non-selected entity, and observations older than the
    /// newest buffered point, are dropped. Returns the derived drain rate
    /// (%/min) when the point was buffered.
    pub fn append(&mut self, entity_id: &str, sample: TrackedSample) -> Option<f64> {
        if self.selected.as_deref() != Some(entity_id) {
            return None;
        }

        if let Some(last) = self.points.back() {
            if sample.observed_at < last.observed_at {
                debug!(
                    "Dropping out-of-order sample for {} ({} < {})",
                    entity_id, sample.observed_at, last.observed_at
                );
                return None;
            }
        }

        let drain_rate = self.drain_rate(entity_id, &sample);

        let point = HistoryPoint::new(sample.observed_at)
            .with_metrics(sample.metrics)
            .with_metric(metric::DRAIN_RATE, Some(drain_rate));
        self.points.push_back(point);

        while self.points.len() > self.capacity {
            self.points.pop_front();
        }

        self.previous = Some(PreviousSample {
            entity_id: entity_id.to_string(),
            observed_at: sample.observed_at,
            level: sample.level,
        });

        Some(drain_rate)
    }

    fn drain_rate(&self, entity_id: &str, sample: &TrackedSample) -> f64 {
        let Some(previous) = self.previous.as_ref().filter(|p| p.entity_id == entity_id) else {
            return 0.0;
        };

        let elapsed_minutes =
            (sample.observed_at - previous.observed_at).num_milliseconds() as f64 / MS_PER_MINUTE;
        if elapsed_minutes <= 0.0 {
            return 0.0;
        }

        let rate = (previous.level - sample.level) / elapsed_minutes;
        if rate.is_finite() { round_to(rate, 2) } else { 0.0 }
    }
}

/// Independent bounded buffers keyed by entity id.
#[derive(Debug, Clone)]
pub struct WindowArena {
    capacity: usize,
    buffers: HashMap<String, WindowBuffer>,
}

impl WindowArena {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: HashMap::new(),
        }
    }

    /// Creates an arena whose buffers each hold one full series for a range
    /// in minutes.
    #[must_use]
    pub fn for_range(range_minutes: u32) -> Self {
        Self::new(SamplingPolicy::for_range(range_minutes).len())
    }

    /// Capacity of every buffer in the arena.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends to the entity's own buffer, creating it on first use.
    pub fn append(&mut self, entity_id: &str, sample: TrackedSample) -> Option<f64> {
        let capacity = self.capacity;
        self.buffers
            .entry(entity_id.to_string())
            .or_insert_with(|| {
                let mut buffer = WindowBuffer::new(capacity);
                buffer.select(entity_id);
                buffer
            })
            .append(entity_id, sample)
    }

    #[must_use]
    pub fn buffer(&self, entity_id: &str) -> Option<&WindowBuffer> {
        self.buffers.get(entity_id)
    }

    /// Drops an entity's history.
    pub fn remove(&mut self, entity_id: &str) -> Option<WindowBuffer> {
        self.buffers.remove(entity_id)
    }

    /// Entity ids with a buffer, sorted.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.buffers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
