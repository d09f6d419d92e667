//! Plot-ready history points.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Metric names used in [`HistoryPoint::metrics`].
pub mod metric {
    pub const VOLTAGE: &str = "voltage";
    pub const CURRENT: &str = "current";
    pub const SOC: &str = "soc";
    pub const TEMPERATURE: &str = "temperature";
    pub const BATTERY: &str = "battery";
    pub const SPEED: &str = "speed";
    pub const DRAIN_RATE: &str = "drainRate";
}

/// Metric name to value; `None` plots as a gap.
pub type Metrics = BTreeMap<String, Option<f64>>;

/// One plotted sample for an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub observed_at: DateTime<Utc>,
    /// Display time, `HH:MM` in local time.
    pub label: String,
    pub metrics: Metrics,
}

impl HistoryPoint {
    #[must_use]
    pub fn new(observed_at: DateTime<Utc>) -> Self {
        Self {
            observed_at,
            label: display_label(observed_at),
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub fn with_metric(mut self, name: &str, value: Option<f64>) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics.extend(metrics);
        self
    }

    /// Value of a metric, `None` when absent or null.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }
}

/// Formats a timestamp as a 24-hour `HH:MM` axis label.
#[must_use]
pub fn display_label(observed_at: DateTime<Utc>) -> String {
    observed_at.with_timezone(&Local).format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_label_format() {
        let label = display_label(Utc::now());
        assert_eq!(label.len(), 5);
        assert_eq!(&label[2..3], ":");
    }

    #[test]
    fn test_metric_lookup() {
        let point = HistoryPoint::new(Utc::now())
            .with_metric(metric::VOLTAGE, Some(12.6))
            .with_metric(metric::CURRENT, None);

        assert_eq!(point.metric(metric::VOLTAGE), Some(12.6));
        assert_eq!(point.metric(metric::CURRENT), None);
        assert_eq!(point.metric(metric::SOC), None);
        assert!(point.metrics.contains_key(metric::CURRENT));
    }

    #[test]
    fn test_serializes_null_metrics() {
        let point = HistoryPoint::new(Utc::now()).with_metric(metric::SOC, None);
        let json = serde_json::to_value(&point).unwrap();
        assert!(json["metrics"]["soc"].is_null());
    }
}
