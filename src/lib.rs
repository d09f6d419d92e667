//! # Station Telemetry Library
//!
//! Telemetry pipeline for a battery-swap station and its rover fleet.
//!
//! This library provides normalization of raw slot readings, historical
//! series sampling, windowed live history with drain-rate derivation, and a
//! feed supervisor that falls back to simulated data when the live source
//! fails.

pub mod config;
pub mod error;
pub mod feed;
pub mod fleet;
pub mod history;
pub mod telemetry;
