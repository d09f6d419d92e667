//! # History Module
//!
//! Time series for plotting:
//! - [`HistoricalSampler`] builds a slot's series over a requested range
//! - [`WindowBuffer`] keeps a bounded live history for one selected entity
//!   and derives its drain rate

pub mod point;
pub mod sampler;
pub mod window;

pub use point::{metric, HistoryPoint, Metrics};
pub use sampler::{HistoricalSampler, HistoryStore, MemoryHistoryStore, SamplingPolicy};
pub use window::{TrackedSample, WindowArena, WindowBuffer};
