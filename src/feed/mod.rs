//! # Feed Module
//!
//! Delivery of station snapshots to the dashboard.
//!
//! This module handles:
//! - Live sources behind the [`LiveSource`] subscribe contract
//! - The simulated demo feed ticking on a fixed period
//! - The [`FeedSupervisor`] that picks a source and falls back to the
//!   simulated feed when the live source fails

pub mod simulated;
pub mod source;
pub mod supervisor;

pub use simulated::{generate_station_snapshot, SimulatedFeed, SnapshotCallback};
pub use source::{
    ChannelSource, DataCallback, ErrorCallback, LineSource, LiveSource, SourceMessage, Subscription,
};
pub use supervisor::{FeedHandlers, FeedMode, FeedState, FeedSupervisor};
