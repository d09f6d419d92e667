//! # Calibration Module
//!
//! Voltage-to-SoC estimation and charging-state classification for a battery
//! chemistry.
//!
//! ## State of Charge
//!
//! SoC is a linear interpolation of terminal voltage across a two-point curve:
//! `voltage_min` maps to 0% and `voltage_max` maps to 100%. Voltages outside
//! the curve clamp to the endpoints.
//!
//! The formula used is: `soc = (v - v_min) / (v_max - v_min) * 100`
//!
//! ## Deadband
//!
//! Sensor noise around zero current would make the classifier flicker between
//! charging and discharging. Currents within `±current_deadband_ma` are treated
//! as no current flow.
//!
//! ## Usage
//!
//! ```
//! use station_telemetry::telemetry::calibration::CalibrationProfile;
//! use station_telemetry::telemetry::ChargingState;
//!
//! let profile = CalibrationProfile::lead_acid();
//!
//! assert_eq!(profile.state_of_charge(11.8), 0.0);
//! assert_eq!(profile.state_of_charge(13.8), 100.0);
//! assert_eq!(profile.classify(Some(150.0), Some(12.0)), ChargingState::Charging);
//! ```

use super::types::ChargingState;

/// Calibration curve and classification thresholds for one chemistry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationProfile {
    /// Voltage reported as 0% SoC.
    voltage_min: f64,
    /// Voltage reported as 100% SoC.
    voltage_max: f64,
    /// Voltage at or above which a battery is considered full.
    full_voltage: f64,
    /// Half-width of the neutral current band in milliamps.
    current_deadband_ma: f64,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self::lead_acid()
    }
}

impl CalibrationProfile {
    /// Creates a profile from explicit thresholds.
    ///
    /// A negative deadband is treated as zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use station_telemetry::telemetry::calibration::CalibrationProfile;
    ///
    /// // Nominal 4S LiFePO4 pack
    /// let profile = CalibrationProfile::new(12.0, 13.6, 13.4, 50.0);
    /// assert!((profile.state_of_charge(12.8) - 50.0).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn new(voltage_min: f64, voltage_max: f64, full_voltage: f64, current_deadband_ma: f64) -> Self {
        Self {
            voltage_min,
            voltage_max,
            full_voltage,
            current_deadband_ma: current_deadband_ma.max(0.0),
        }
    }

    /// Nominal 12V lead-acid profile (11.8V empty, 13.8V full, 13.6V float).
    #[must_use]
    pub fn lead_acid() -> Self {
        Self {
            voltage_min: 11.8,
            voltage_max: 13.8,
            full_voltage: 13.6,
            current_deadband_ma: 100.0,
        }
    }

    #[must_use]
    pub fn voltage_min(&self) -> f64 {
        self.voltage_min
    }

    #[must_use]
    pub fn voltage_max(&self) -> f64 {
        self.voltage_max
    }

    #[must_use]
    pub fn full_voltage(&self) -> f64 {
        self.full_voltage
    }

    #[must_use]
    pub fn current_deadband_ma(&self) -> f64 {
        self.current_deadband_ma
    }

    /// Estimates state of charge in percent from terminal voltage.
    ///
    /// Always returns a value in `[0, 100]`. Non-finite input reads as 0%.
    ///
    /// # Examples
    ///
    /// ```
    /// use station_telemetry::telemetry::calibration::CalibrationProfile;
    ///
    /// let profile = CalibrationProfile::lead_acid();
    /// assert_eq!(profile.state_of_charge(10.0), 0.0);
    /// assert_eq!(profile.state_of_charge(14.4), 100.0);
    /// ```
    #[must_use]
    pub fn state_of_charge(&self, voltage: f64) -> f64 {
        if !voltage.is_finite() {
            return 0.0;
        }
        if voltage >= self.voltage_max {
            return 100.0;
        }
        if voltage <= self.voltage_min {
            return 0.0;
        }

        let soc = (voltage - self.voltage_min) / (self.voltage_max - self.voltage_min) * 100.0;
        soc.clamp(0.0, 100.0)
    }

    /// Classifies the charging state of an occupied slot.
    ///
    /// Precedence:
    /// 1. current above the deadband and voltage at full → `Full`
    /// 2. current above the deadband → `Charging`
    /// 3. current below the negative deadband → `Discharging`
    /// 4. voltage at full → `Full`
    /// 5. otherwise → `Idle`
    ///
    /// A missing current or voltage reading classifies as `Idle`.
    #[must_use]
    pub fn classify(&self, current_ma: Option<f64>, voltage: Option<f64>) -> ChargingState {
        let (Some(current_ma), Some(voltage)) = (current_ma, voltage) else {
            return ChargingState::Idle;
        };

        let at_full = voltage >= self.full_voltage;

        if current_ma > self.current_deadband_ma {
            if at_full {
                ChargingState::Full
            } else {
                ChargingState::Charging
            }
        } else if current_ma < -self.current_deadband_ma {
            ChargingState::Discharging
        } else if at_full {
            ChargingState::Full
        } else {
            ChargingState::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== State of Charge Tests ====================

    #[test]
    fn test_soc_endpoints() {
        let profile = CalibrationProfile::lead_acid();
        assert_eq!(profile.state_of_charge(11.8), 0.0);
        assert_eq!(profile.state_of_charge(13.8), 100.0);
    }

    #[test]
    fn test_soc_midpoint() {
        let profile = CalibrationProfile::lead_acid();
        assert!((profile.state_of_charge(12.8) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_soc_clamps_outside_curve() {
        let profile = CalibrationProfile::lead_acid();
        assert_eq!(profile.state_of_charge(0.0), 0.0);
        assert_eq!(profile.state_of_charge(-12.0), 0.0);
        assert_eq!(profile.state_of_charge(15.0), 100.0);
    }

    #[test]
    fn test_soc_non_finite() {
        let profile = CalibrationProfile::lead_acid();
        assert_eq!(profile.state_of_charge(f64::NAN), 0.0);
        assert_eq!(profile.state_of_charge(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_soc_monotonic() {
        let profile = CalibrationProfile::lead_acid();
        let mut previous = profile.state_of_charge(10.0);
        let mut voltage = 10.0;
        while voltage <= 15.0 {
            let soc = profile.state_of_charge(voltage);
            assert!(soc >= previous, "SoC dropped at {}V", voltage);
            assert!((0.0..=100.0).contains(&soc));
            previous = soc;
            voltage += 0.01;
        }
    }

    #[test]
    fn test_custom_profile_curve() {
        let profile = CalibrationProfile::new(12.0, 13.6, 13.4, 50.0);
        assert!((profile.state_of_charge(12.8) - 50.0).abs() < 1e-9);
        assert_eq!(profile.state_of_charge(13.6), 100.0);
    }

    #[test]
    fn test_negative_deadband_clamped() {
        let profile = CalibrationProfile::new(11.8, 13.8, 13.6, -10.0);
        assert_eq!(profile.current_deadband_ma(), 0.0);
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_classify_precedence() {
        let profile = CalibrationProfile::lead_acid();
        assert_eq!(profile.classify(Some(150.0), Some(13.7)), ChargingState::Full);
        assert_eq!(profile.classify(Some(150.0), Some(12.0)), ChargingState::Charging);
        assert_eq!(profile.classify(Some(-150.0), Some(12.0)), ChargingState::Discharging);
        assert_eq!(profile.classify(Some(-150.0), Some(13.7)), ChargingState::Discharging);
        assert_eq!(profile.classify(Some(50.0), Some(13.7)), ChargingState::Full);
        assert_eq!(profile.classify(Some(0.0), Some(12.0)), ChargingState::Idle);
    }

    #[test]
    fn test_classify_deadband_edges() {
        let profile = CalibrationProfile::lead_acid();
        // Exactly on the deadband edge is still neutral
        assert_eq!(profile.classify(Some(100.0), Some(12.0)), ChargingState::Idle);
        assert_eq!(profile.classify(Some(-100.0), Some(12.0)), ChargingState::Idle);
        assert_eq!(profile.classify(Some(100.1), Some(12.0)), ChargingState::Charging);
        assert_eq!(profile.classify(Some(-100.1), Some(12.0)), ChargingState::Discharging);
    }

    #[test]
    fn test_classify_full_voltage_boundary() {
        let profile = CalibrationProfile::lead_acid();
        assert_eq!(profile.classify(Some(500.0), Some(13.6)), ChargingState::Full);
        assert_eq!(profile.classify(Some(500.0), Some(13.59)), ChargingState::Charging);
    }

    #[test]
    fn test_classify_missing_inputs() {
        let profile = CalibrationProfile::lead_acid();
        assert_eq!(profile.classify(None, Some(13.7)), ChargingState::Idle);
        assert_eq!(profile.classify(Some(500.0), None), ChargingState::Idle);
        assert_eq!(profile.classify(None, None), ChargingState::Idle);
    }

    #[test]
    fn test_default_is_lead_acid() {
        assert_eq!(CalibrationProfile::default(), CalibrationProfile::lead_acid());
    }
}
