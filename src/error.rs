//! # Error Types
//!
//! Custom error types for Station Telemetry using `thiserror`.

use thiserror::Error;

/// Main error type for Station Telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The live feed failed to deliver (network, auth or query failure)
    #[error("Live source error: {0}")]
    Source(String),

    /// The live feed could not be constructed at all
    #[error("Live source unavailable: {0}")]
    SourceUnavailable(String),

    /// Historical store query failed
    #[error("History store error: {0}")]
    HistoryStore(String),
}

/// Result type alias for Station Telemetry
pub type Result<T> = std::result::Result<T, TelemetryError>;
