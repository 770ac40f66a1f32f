//! Unified error handling for the track-refiner library.
//!
//! Data-quality problems (malformed coordinates, empty batches, missing
//! validation context) are never errors: they are encoded in the returned
//! result and its diagnostics. Only programming-contract violations reach
//! the caller as an `Err`.

use std::fmt;

/// Unified error type for track-refiner operations.
#[derive(Debug, Clone)]
pub enum TrackError {
    /// A configuration value is outside its accepted range
    InvalidConfig {
        field: &'static str,
        value: f64,
        message: String,
    },
    /// Generic internal error
    Internal { message: String },
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackError::InvalidConfig {
                field,
                value,
                message,
            } => {
                write!(
                    f,
                    "Invalid configuration: {} = {}: {}",
                    field, value, message
                )
            }
            TrackError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for TrackError {}

/// Result type alias for track-refiner operations.
pub type Result<T> = std::result::Result<T, TrackError>;
