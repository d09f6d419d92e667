//! # Telemetry Module
//!
//! Battery slot telemetry model and normalization.
//!
//! This module handles:
//! - Raw sensor readings (voltage, current, temperature) as delivered by a source
//! - Unit conversion and display rounding
//! - State-of-charge estimation against a calibration profile
//! - Charging-state classification with a current deadband
//! - Station snapshots combining every slot's record

pub mod calibration;
pub mod normalizer;
pub mod types;

pub use calibration::CalibrationProfile;
pub use normalizer::Normalizer;
pub use types::{ChargingState, NormalizedSlotRecord, RawSample, SlotReading, StationSnapshot};
