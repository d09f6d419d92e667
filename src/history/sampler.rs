//! # Historical Sampler
//!
//! Produces an ordered, oldest-first series of [`HistoryPoint`]s for a slot
//! over a requested time range.
//!
//! ## Adaptive Interval
//!
//! The sampling interval grows with the range so the point count, and
//! therefore rendering cost, stays roughly constant:
//!
//! | Range | Interval | Points |
//! |-------|----------|--------|
//! | ≤ 10 min | 3 s | ≤ 201 |
//! | ≤ 30 min | 5 s | ≤ 361 |
//! | ≤ 60 min | 10 s | ≤ 361 |
//! | > 60 min | `range / 360` | 361 |
//!
//! ## Backends
//!
//! Without a store the sampler synthesizes a demo series. With a
//! [`HistoryStore`] it fetches the newest rows (page capped by the same
//! policy), normalizes them, and reverses them to oldest-first.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::point::{metric, HistoryPoint};
use crate::error::{Result, TelemetryError};
use crate::telemetry::normalizer::round_to;
use crate::telemetry::{Normalizer, RawSample};

/// Upper bound on intervals per series (361 points including "now")
pub const MAX_INTERVALS: u64 = 360;

/// Milliseconds per minute
const MS_PER_MINUTE: u64 = 60_000;

/// Interval and point count for one requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    interval_ms: u64,
    intervals: u64,
}

impl SamplingPolicy {
    /// Chooses the sampling interval for a range in minutes.
    ///
    /// # Examples
    ///
    /// ```
    /// use station_telemetry::history::SamplingPolicy;
    ///
    /// let policy = SamplingPolicy::for_range(10);
    /// assert_eq!(policy.interval_ms(), 3000);
    /// assert_eq!(policy.len(), 201);
    /// ```
    #[must_use]
    pub fn for_range(range_minutes: u32) -> Self {
        let range_ms = u64::from(range_minutes) * MS_PER_MINUTE;
        let tier_ms = match range_minutes {
            0..=10 => 3_000,
            11..=30 => 5_000,
            _ => 10_000,
        };
        // Long ranges stretch the interval instead of growing the series
        let interval_ms = tier_ms.max(range_ms.div_ceil(MAX_INTERVALS));

        Self {
            interval_ms,
            intervals: range_ms / interval_ms,
        }
    }

    #[must_use]
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Number of whole intervals in the range.
    #[must_use]
    pub fn intervals(&self) -> u64 {
        self.intervals
    }

    /// Number of points in a full series (one per interval plus "now").
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.intervals as usize + 1
    }

    /// Store query page size, never larger than `max_page_size`.
    #[must_use]
    pub fn page_size(&self, max_page_size: usize) -> usize {
        self.len().min(max_page_size)
    }

    /// Point timestamps, oldest first; the last one is `now`.
    pub fn timestamps(&self, now: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> {
        let interval = Duration::milliseconds(self.interval_ms as i64);
        (0..=self.intervals as i64).rev().map(move |i| now - interval * i as i32)
    }
}

/// Read access to recorded raw samples.
#[cfg_attr(test, mockall::automock)]
pub trait HistoryStore: Send + Sync {
    /// Fetches up to `limit` samples from `collection`, newest first.
    fn fetch_newest_first(&self, collection: &str, limit: usize) -> Result<Vec<RawSample>>;
}

/// Bounded in-memory store of raw samples per collection.
#[derive(Debug)]
pub struct MemoryHistoryStore {
    retained: usize,
    collections: Mutex<HashMap<String, VecDeque<RawSample>>>,
}

impl MemoryHistoryStore {
    /// Creates a store keeping at most `retained` samples per collection.
    #[must_use]
    pub fn new(retained: usize) -> Self {
        Self {
            retained: retained.max(1),
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Appends a sample, evicting the oldest one when full.
    pub fn record(&self, collection: &str, sample: RawSample) {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let rows = collections.entry(collection.to_string()).or_default();
        rows.push_back(sample);
        while rows.len() > self.retained {
            rows.pop_front();
        }
    }

    /// Number of samples held for a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .map(|c| c.get(collection).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn fetch_newest_first(&self, collection: &str, limit: usize) -> Result<Vec<RawSample>> {
        let collections = self
            .collections
            .lock()
            .map_err(|_| TelemetryError::HistoryStore("store lock poisoned".to_string()))?;

        Ok(collections
            .get(collection)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Store binding for the slot fed by the live source.
struct StoreBinding {
    store: Arc<dyn HistoryStore>,
    collection: String,
    slot_id: u32,
    max_page_size: usize,
}

/// Historical series provider for station slots.
pub struct HistoricalSampler {
    normalizer: Normalizer,
    binding: Option<StoreBinding>,
}

impl std::fmt::Debug for HistoricalSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoricalSampler")
            .field("collection", &self.binding.as_ref().map(|b| &b.collection))
            .finish_non_exhaustive()
    }
}

impl HistoricalSampler {
    /// Sampler producing synthesized demo series for every slot.
    #[must_use]
    pub fn simulated(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            binding: None,
        }
    }

    /// Sampler reading `slot_id`'s history from a store; other slots are
    /// synthesized.
    #[must_use]
    pub fn with_store(
        normalizer: Normalizer,
        store: Arc<dyn HistoryStore>,
        collection: impl Into<String>,
        slot_id: u32,
        max_page_size: usize,
    ) -> Self {
        Self {
            normalizer,
            binding: Some(StoreBinding {
                store,
                collection: collection.into(),
                slot_id,
                max_page_size: max_page_size.max(1),
            }),
        }
    }

    /// Samples a slot's history ending now.
    #[must_use]
    pub fn sample(&self, slot_id: u32, range_minutes: u32) -> Vec<HistoryPoint> {
        self.sample_at(slot_id, range_minutes, Utc::now())
    }

    /// Samples a slot's history ending at `now`.
    #[must_use]
    pub fn sample_at(&self, slot_id: u32, range_minutes: u32, now: DateTime<Utc>) -> Vec<HistoryPoint> {
        self.sample_with_rng(slot_id, range_minutes, now, &mut rand::rng())
    }

    /// Samples a slot's history using the given noise source for synthesized series.
    pub fn sample_with_rng<R: Rng>(
        &self,
        slot_id: u32,
        range_minutes: u32,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Vec<HistoryPoint> {
        let policy = SamplingPolicy::for_range(range_minutes);

        if let Some(binding) = self.binding.as_ref().filter(|b| b.slot_id == slot_id) {
            match self.fetch_from_store(binding, &policy, now) {
                Ok(points) => return points,
                Err(e) => {
                    warn!("History store query failed, using simulated series: {}", e);
                }
            }
        }

        synthesize_series(slot_id, &policy, now, rng)
    }

    fn fetch_from_store(
        &self,
        binding: &StoreBinding,
        policy: &SamplingPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<HistoryPoint>> {
        let limit = policy.page_size(binding.max_page_size);
        let rows = binding.store.fetch_newest_first(&binding.collection, limit)?;
        debug!("Fetched {} rows from {} (limit {})", rows.len(), binding.collection, limit);

        let mut points: Vec<HistoryPoint> = rows
            .iter()
            .take(limit)
            .map(|row| self.point_from_row(binding.slot_id, row, now))
            .collect();

        // Newest-first from the store, oldest-first to consumers
        points.reverse();
        points.sort_by_key(|p| p.observed_at);
        Ok(points)
    }

    fn point_from_row(&self, slot_id: u32, row: &RawSample, now: DateTime<Utc>) -> HistoryPoint {
        let record = self.normalizer.normalize_sample(slot_id, None, row, now);
        HistoryPoint::new(record.observed_at)
            .with_metric(metric::VOLTAGE, record.voltage_volts)
            .with_metric(metric::CURRENT, record.current_amps)
            .with_metric(metric::SOC, record.state_of_charge_percent)
            .with_metric(metric::TEMPERATURE, record.temperature_celsius)
    }
}

/// Demo series: slot 1 charging, slot 2 resting full, every other slot empty.
fn synthesize_series<R: Rng>(
    slot_id: u32,
    policy: &SamplingPolicy,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Vec<HistoryPoint> {
    let total = policy.intervals();

    policy
        .timestamps(now)
        .enumerate()
        .map(|(index, observed_at)| {
            let progress = if total == 0 { 1.0 } else { index as f64 / total as f64 };
            let point = HistoryPoint::new(observed_at);

            match slot_id {
                1 => point
                    .with_metric(metric::VOLTAGE, Some(round_to(11.5 + progress * 1.1, 2)))
                    .with_metric(metric::CURRENT, Some(round_to(8.0 - progress * 3.0, 2)))
                    .with_metric(metric::SOC, Some(round_to(40.0 + progress * 50.0, 1)))
                    .with_metric(
                        metric::TEMPERATURE,
                        Some(round_to(25.0 + rng.random::<f64>() * 10.0 + progress * 5.0, 1)),
                    ),
                2 => point
                    .with_metric(metric::VOLTAGE, Some(round_to(12.55 + rng.random::<f64>() * 0.1, 2)))
                    .with_metric(metric::CURRENT, Some(round_to(rng.random::<f64>() * 0.1, 2)))
                    .with_metric(metric::SOC, Some(round_to(99.0 + rng.random::<f64>(), 1)))
                    .with_metric(metric::TEMPERATURE, Some(round_to(24.0 + rng.random::<f64>() * 2.0, 1))),
                _ => point
                    .with_metric(metric::VOLTAGE, None)
                    .with_metric(metric::CURRENT, None)
                    .with_metric(metric::SOC, None)
                    .with_metric(metric::TEMPERATURE, None),
            }
        })
        .collect()
}
