//! # Fleet Module
//!
//! Rover fleet telemetry:
//! - Rover model and per-status summary
//! - Simulated fleet with periodic random-walk updates
//! - [`RoverTracker`] keeping a drain-rate history for the selected rover

pub mod rover;
pub mod simulator;
pub mod tracker;

pub use rover::{summary, with_status, BatteryBand, FleetSummary, MissionStatus, Rover, RoverStatus};
pub use simulator::FleetSimulator;
pub use tracker::{default_selection, RoverTracker};
