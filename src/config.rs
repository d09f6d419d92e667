//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files, with
//! environment overrides for feed selection.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::{Result, TelemetryError};
use crate::telemetry::calibration::CalibrationProfile;

/// Environment variable selecting the simulated feed at startup
pub const ENV_USE_MOCK_DATA: &str = "USE_MOCK_DATA";

/// Environment variable naming the live source's dataset
pub const ENV_COLLECTION_NAME: &str = "COLLECTION_NAME";

/// Maximum number of station slots
const MAX_SLOT_COUNT: u32 = 16;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Live feed / simulated feed selection
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default)]
    pub use_mock_data: bool,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    #[serde(default = "default_station_id")]
    pub station_id: String,

    #[serde(default = "default_slot_count")]
    pub slot_count: u32,

    #[serde(default = "default_live_slot")]
    pub live_slot: u32,

    #[serde(default = "default_live_battery_id")]
    pub live_battery_id: String,

    #[serde(default = "default_simulated_tick_ms")]
    pub simulated_tick_ms: u64,
}

/// State-of-charge and charging-state calibration
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    #[serde(default = "default_voltage_min")]
    pub voltage_min: f64,

    #[serde(default = "default_voltage_max")]
    pub voltage_max: f64,

    #[serde(default = "default_full_voltage")]
    pub full_voltage: f64,

    #[serde(default = "default_current_deadband_ma")]
    pub current_deadband_ma: f64,
}

/// History sampling and buffering limits
#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_rover_buffer_capacity")]
    pub rover_buffer_capacity: usize,

    /// Chart range in minutes; sizes the per-slot windows
    #[serde(default = "default_chart_range_minutes")]
    pub chart_range_minutes: u32,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    #[serde(default = "default_retained_samples")]
    pub retained_samples: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files; empty disables file logging
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_collection_name() -> String { "batteryReadings".to_string() }
fn default_station_id() -> String { "STATION_001".to_string() }
fn default_slot_count() -> u32 { 3 }
fn default_live_slot() -> u32 { 1 }
fn default_live_battery_id() -> String { "BAT_001".to_string() }
fn default_simulated_tick_ms() -> u64 { 1000 }

fn default_voltage_min() -> f64 { 11.8 }
fn default_voltage_max() -> f64 { 13.8 }
fn default_full_voltage() -> f64 { 13.6 }
fn default_current_deadband_ma() -> f64 { 100.0 }

fn default_rover_buffer_capacity() -> usize { 24 }
fn default_chart_range_minutes() -> u32 { 10 }
fn default_max_page_size() -> usize { 361 }
fn default_retained_samples() -> usize { 2000 }

fn default_log_level() -> String { "info".to_string() }

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            use_mock_data: false,
            collection_name: default_collection_name(),
            station_id: default_station_id(),
            slot_count: default_slot_count(),
            live_slot: default_live_slot(),
            live_battery_id: default_live_battery_id(),
            simulated_tick_ms: default_simulated_tick_ms(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            voltage_min: default_voltage_min(),
            voltage_max: default_voltage_max(),
            full_voltage: default_full_voltage(),
            current_deadband_ma: default_current_deadband_ma(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            rover_buffer_capacity: default_rover_buffer_capacity(),
            chart_range_minutes: default_chart_range_minutes(),
            max_page_size: default_max_page_size(),
            retained_samples: default_retained_samples(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl CalibrationConfig {
    /// Build the calibration profile used by the normalizer
    pub fn profile(&self) -> CalibrationProfile {
        CalibrationProfile::new(
            self.voltage_min,
            self.voltage_max,
            self.full_voltage,
            self.current_deadband_ma,
        )
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Environment overrides (`USE_MOCK_DATA`, `COLLECTION_NAME`) are applied
    /// after parsing and before validation.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use station_telemetry::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-level overrides through a lookup function
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_USE_MOCK_DATA) {
            let value = value.trim().to_ascii_lowercase();
            self.feed.use_mock_data = value == "true" || value == "1";
        }

        if let Some(name) = lookup(ENV_COLLECTION_NAME) {
            let name = name.trim();
            if !name.is_empty() {
                self.feed.collection_name = name.to_string();
            }
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.feed.collection_name.is_empty() {
            return Err(invalid("collection_name cannot be empty"));
        }

        if self.feed.station_id.is_empty() {
            return Err(invalid("station_id cannot be empty"));
        }

        if self.feed.slot_count == 0 || self.feed.slot_count > MAX_SLOT_COUNT {
            return Err(invalid(format!("slot_count must be between 1 and {}", MAX_SLOT_COUNT)));
        }

        if self.feed.live_slot == 0 || self.feed.live_slot > self.feed.slot_count {
            return Err(invalid("live_slot must be between 1 and slot_count"));
        }

        if self.feed.simulated_tick_ms == 0 || self.feed.simulated_tick_ms > 60000 {
            return Err(invalid("simulated_tick_ms must be between 1 and 60000"));
        }

        let cal = &self.calibration;
        for (name, value) in [
            ("voltage_min", cal.voltage_min),
            ("voltage_max", cal.voltage_max),
            ("full_voltage", cal.full_voltage),
            ("current_deadband_ma", cal.current_deadband_ma),
        ] {
            if !value.is_finite() {
                return Err(invalid(format!("{} must be a finite number", name)));
            }
        }

        if cal.voltage_min >= cal.voltage_max {
            return Err(invalid("voltage_min must be less than voltage_max"));
        }

        if cal.full_voltage <= cal.voltage_min || cal.full_voltage > cal.voltage_max {
            return Err(invalid("full_voltage must be within (voltage_min, voltage_max]"));
        }

        if cal.current_deadband_ma < 0.0 {
            return Err(invalid("current_deadband_ma cannot be negative"));
        }

        if self.history.rover_buffer_capacity == 0 {
            return Err(invalid("rover_buffer_capacity must be greater than 0"));
        }

        if self.history.chart_range_minutes == 0 {
            return Err(invalid("chart_range_minutes must be greater than 0"));
        }

        if self.history.max_page_size == 0 {
            return Err(invalid("max_page_size must be greater than 0"));
        }

        if self.history.retained_samples == 0 {
            return Err(invalid("retained_samples must be greater than 0"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

fn invalid(msg: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.feed.use_mock_data);
        assert_eq!(config.feed.slot_count, 3);
        assert_eq!(config.history.rover_buffer_capacity, 24);
        assert_eq!(config.history.chart_range_minutes, 10);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[feed]
station_id = "STATION_042"
slot_count = 4

[calibration]
voltage_min = 12.0

[history]

[logging]
level = "debug"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = tokio_test::assert_ok!(Config::load(temp_file.path()));
        assert_eq!(config.feed.station_id, "STATION_042");
        assert_eq!(config.feed.slot_count, 4);
        assert_eq!(config.calibration.voltage_min, 12.0);
        assert_eq!(config.calibration.voltage_max, 13.8);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_config_with_missing_sections() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[feed]\nsimulated_tick_ms = 500\n").unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.feed.simulated_tick_ms, 500);
        assert_eq!(config.calibration.full_voltage, 13.6);
    }

    #[test]
    fn test_load_invalid_toml() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[feed\nslot_count = ").unwrap();
        temp_file.flush().unwrap();

        assert!(matches!(
            Config::load(temp_file.path()),
            Err(TelemetryError::Config(_))
        ));
    }

    #[test]
    fn test_shipped_default_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let contents = std::fs::read_to_string(path).unwrap();
        let config: Config = toml::from_str(&contents).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.feed.collection_name, "batteryReadings");
        assert_eq!(config.history.max_page_size, 361);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/station-telemetry.toml");
        assert!(matches!(result, Err(TelemetryError::Io(_))));
    }

    // ==================== Environment Overrides ====================

    #[test]
    fn test_use_mock_data_override() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[(ENV_USE_MOCK_DATA, "true")]));
        assert!(config.feed.use_mock_data);

        config.apply_overrides(lookup_from(&[(ENV_USE_MOCK_DATA, "no")]));
        assert!(!config.feed.use_mock_data);

        config.apply_overrides(lookup_from(&[(ENV_USE_MOCK_DATA, " 1 ")]));
        assert!(config.feed.use_mock_data);
    }

    #[test]
    fn test_collection_name_override() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[(ENV_COLLECTION_NAME, "roverReadings")]));
        assert_eq!(config.feed.collection_name, "roverReadings");

        // Blank values leave the configured name in place
        config.apply_overrides(lookup_from(&[(ENV_COLLECTION_NAME, "  ")]));
        assert_eq!(config.feed.collection_name, "roverReadings");
    }

    #[test]
    fn test_no_overrides_keeps_values() {
        let mut config = Config::default();
        config.feed.use_mock_data = true;
        config.apply_overrides(lookup_from(&[]));
        assert!(config.feed.use_mock_data);
        assert_eq!(config.feed.collection_name, "batteryReadings");
    }

    // ==================== Validation ====================

    #[test]
    fn test_empty_collection_name() {
        let mut config = Config::default();
        config.feed.collection_name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_station_id() {
        let mut config = Config::default();
        config.feed.station_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_slot_count_bounds() {
        let mut config = Config::default();
        config.feed.slot_count = 0;
        assert!(config.validate().is_err());

        config.feed.slot_count = 17;
        assert!(config.validate().is_err());

        config.feed.slot_count = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_live_slot_out_of_range() {
        let mut config = Config::default();
        config.feed.live_slot = 0;
        assert!(config.validate().is_err());

        config.feed.live_slot = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_simulated_tick_bounds() {
        let mut config = Config::default();
        config.feed.simulated_tick_ms = 0;
        assert!(config.validate().is_err());

        config.feed.simulated_tick_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_voltage_range_inverted() {
        let mut config = Config::default();
        config.calibration.voltage_min = 13.8;
        config.calibration.voltage_max = 11.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_full_voltage_outside_range() {
        let mut config = Config::default();
        config.calibration.full_voltage = 14.0;
        assert!(config.validate().is_err());

        config.calibration.full_voltage = 11.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_calibration() {
        let mut config = Config::default();
        config.calibration.voltage_max = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_deadband() {
        let mut config = Config::default();
        config.calibration.current_deadband_ma = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_history_limits() {
        let mut config = Config::default();
        config.history.rover_buffer_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.chart_range_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.max_page_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.retained_samples = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_calibration_profile_from_config() {
        let config = Config::default();
        let profile = config.calibration.profile();
        assert_eq!(profile.voltage_min(), 11.8);
        assert_eq!(profile.voltage_max(), 13.8);
        assert_eq!(profile.full_voltage(), 13.6);
        assert_eq!(profile.current_deadband_ma(), 100.0);
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_collection_name(), "batteryReadings");
        assert_eq!(default_station_id(), "STATION_001");
        assert_eq!(default_slot_count(), 3);
        assert_eq!(default_live_slot(), 1);
        assert_eq!(default_live_battery_id(), "BAT_001");
        assert_eq!(default_simulated_tick_ms(), 1000);
        assert_eq!(default_voltage_min(), 11.8);
        assert_eq!(default_voltage_max(), 13.8);
        assert_eq!(default_full_voltage(), 13.6);
        assert_eq!(default_current_deadband_ma(), 100.0);
        assert_eq!(default_rover_buffer_capacity(), 24);
        assert_eq!(default_chart_range_minutes(), 10);
        assert_eq!(default_max_page_size(), 361);
        assert_eq!(default_retained_samples(), 2000);
        assert_eq!(default_log_level(), "info");
    }
}
