//! # Track Refiner
//!
//! GPS track denoising, reduction and integrity validation.
//!
//! This library takes a batch of raw, timestamped GPS fixes and produces:
//! - a denoised, reduced trajectory suitable for route display and distance
//!   accounting (speed filtering, temporal grouping, spatial clustering,
//!   median reduction)
//! - an integrity assessment detecting likely GPS spoofing, jamming or
//!   teleportation
//!
//! The pipeline is a pure in-process library: no network I/O, no persistence,
//! no streaming. It operates over a finite, already-collected batch and is
//! safely reentrant because every stage reads an immutable
//! [`ProcessorSettings`] value threaded through the invocation.
//!
//! ## Quick Start
//!
//! ```rust
//! use track_refiner::{process, GpsPoint, PipelineConfig, Position};
//!
//! let batch = vec![
//!     Position::new(GpsPoint::new(51.5074, -0.1278), 0),
//!     Position::new(GpsPoint::new(51.5075, -0.1279), 2_000),
//!     Position::new(GpsPoint::new(51.5076, -0.1280), 4_000),
//! ];
//!
//! let result = process(&batch, &PipelineConfig::default()).unwrap();
//! assert!(result.stats.processed_count <= result.stats.original_count);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, TrackError};

// Geographic utilities (distance, speed, chord deviation)
pub mod geo_utils;

// Per-point integrity scoring and risk classification
pub mod validator;
pub use validator::{
    Action, RiskLevel, ValidationContext, ValidationResult, ValidatorConfig, Warning,
};

// Movement-mode classification and adaptive thresholds
pub mod movement;
pub use movement::{classify_movement, settings_for_mode, MovementAnalysis, MovementType};

// Speed filtering of raw samples
pub mod filter;
pub use filter::filter_by_speed;

// Temporal grouping and spatial clustering
pub mod grouping;
pub use grouping::{cluster_spatially, group_by_time};

// Cluster reduction (per-axis median / mean collapse)
pub mod reduce;
pub use reduce::reduce_cluster;

// Pipeline orchestration
pub mod pipeline;
pub use pipeline::{
    process, Diagnostic, DiagnosticKind, PipelineConfig, ProcessingResult, ProcessingStats,
    ValidationOptions, ValidationSummary,
};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use track_refiner::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A raw timestamped GPS fix as reported by the tracked device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub point: GpsPoint,
    /// Unix timestamp in milliseconds
    pub timestamp_ms: i64,
}

impl Position {
    /// Create a new timestamped position.
    pub fn new(point: GpsPoint, timestamp_ms: i64) -> Self {
        Self {
            point,
            timestamp_ms,
        }
    }
}

/// A single output point produced by collapsing a cluster of raw fixes.
///
/// The coordinates are a per-axis median (or mean for small clusters), so the
/// point is not guaranteed to equal any original sample on both axes jointly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReducedPosition {
    pub point: GpsPoint,
    /// Mean timestamp of the collapsed cluster, in milliseconds
    pub timestamp_ms: i64,
    /// How many raw fixes this point represents
    pub original_count: usize,
}

/// Bounding box for a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Thresholds for the reduction pipeline.
///
/// A pure configuration value: the orchestrator computes it once per
/// invocation (fixed or derived from the detected movement mode) and passes
/// it explicitly to every stage. It is never stored on shared mutable state,
/// which keeps the pipeline reentrant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSettings {
    /// Maximum plausible speed between consecutive raw samples (km/h)
    pub max_speed_kmh: f64,
    /// Minimum speed between consecutive raw samples (km/h); slower pairs
    /// are treated as jitter around a stationary device
    pub min_speed_kmh: f64,
    /// Radius for spatial clustering within a time group (meters)
    pub cluster_radius_m: f64,
    /// Span of an anchored time group (milliseconds)
    pub time_window_ms: i64,
    /// Cluster size at which the reducer switches from mean to median
    pub min_points_for_median: usize,
    /// Optional Douglas-Peucker tolerance (degrees) applied to the final
    /// reduced polyline for display. `None` disables simplification.
    pub simplify_tolerance_deg: Option<f64>,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            max_speed_kmh: 150.0,
            min_speed_kmh: 0.5,
            cluster_radius_m: 20.0,
            time_window_ms: 30_000,
            min_points_for_median: 3,
            simplify_tolerance_deg: None,
        }
    }
}

impl ProcessorSettings {
    /// Create settings, rejecting out-of-range values immediately instead of
    /// silently coercing them.
    pub fn new(
        max_speed_kmh: f64,
        min_speed_kmh: f64,
        cluster_radius_m: f64,
        time_window_ms: i64,
        min_points_for_median: usize,
    ) -> Result<Self> {
        let settings = Self {
            max_speed_kmh,
            min_speed_kmh,
            cluster_radius_m,
            time_window_ms,
            min_points_for_median,
            simplify_tolerance_deg: None,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the numeric ranges of these settings.
    pub fn validate(&self) -> Result<()> {
        if !self.max_speed_kmh.is_finite() || self.max_speed_kmh <= 0.0 || self.max_speed_kmh > 500.0
        {
            return Err(TrackError::InvalidConfig {
                field: "max_speed_kmh",
                value: self.max_speed_kmh,
                message: "must be in (0, 500]".to_string(),
            });
        }
        if !self.min_speed_kmh.is_finite()
            || self.min_speed_kmh < 0.0
            || self.min_speed_kmh >= self.max_speed_kmh
        {
            return Err(TrackError::InvalidConfig {
                field: "min_speed_kmh",
                value: self.min_speed_kmh,
                message: "must be non-negative and below max_speed_kmh".to_string(),
            });
        }
        if !self.cluster_radius_m.is_finite() || self.cluster_radius_m <= 0.0 {
            return Err(TrackError::InvalidConfig {
                field: "cluster_radius_m",
                value: self.cluster_radius_m,
                message: "must be positive".to_string(),
            });
        }
        if self.time_window_ms <= 0 {
            return Err(TrackError::InvalidConfig {
                field: "time_window_ms",
                value: self.time_window_ms as f64,
                message: "must be positive".to_string(),
            });
        }
        if self.min_points_for_median < 2 {
            return Err(TrackError::InvalidConfig {
                field: "min_points_for_median",
                value: self.min_points_for_median as f64,
                message: "must be at least 2".to_string(),
            });
        }
        if let Some(tol) = self.simplify_tolerance_deg {
            if !tol.is_finite() || tol <= 0.0 {
                return Err(TrackError::InvalidConfig {
                    field: "simplify_tolerance_deg",
                    value: tol,
                    message: "must be positive when set".to_string(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
