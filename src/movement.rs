//! Movement-mode classification and adaptive threshold selection.
//!
//! Classifies a position sequence into a movement mode (walking, scooter,
//! car, train, static) from its consecutive-pair speed distribution, then
//! maps the mode to a [`ProcessorSettings`] value through a declarative
//! per-mode table. The table is data, not scattered literals, so thresholds
//! can be tuned independently of the detection heuristic.

use std::collections::HashMap;

use log::debug;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::geo_utils::speed_kmh;
use crate::{Position, ProcessorSettings};

/// Inferred movement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Unknown,
    Static,
    Walking,
    Scooter,
    Car,
    Train,
}

/// Result of classifying a position sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementAnalysis {
    pub movement_type: MovementType,
    /// Fraction of observed speeds consistent with the mode, in [0, 1]
    pub confidence: f64,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    /// Thresholds appropriate for the detected mode
    pub settings: ProcessorSettings,
}

/// Typical speed band per mode, in km/h (inclusive).
const SPEED_BANDS: [(MovementType, f64, f64); 4] = [
    (MovementType::Walking, 0.5, 8.0),
    (MovementType::Scooter, 3.0, 25.0),
    (MovementType::Car, 5.0, 120.0),
    (MovementType::Train, 20.0, 200.0),
];

/// Speeds above this are treated as analysis noise, not real movement.
const SPEED_OUTLIER_KMH: f64 = 500.0;

/// Per-mode processing thresholds.
static MODE_SETTINGS: Lazy<HashMap<MovementType, ProcessorSettings>> = Lazy::new(|| {
    let entry = |max_speed_kmh: f64,
                 min_speed_kmh: f64,
                 cluster_radius_m: f64,
                 time_window_ms: i64,
                 min_points_for_median: usize| ProcessorSettings {
        max_speed_kmh,
        min_speed_kmh,
        cluster_radius_m,
        time_window_ms,
        min_points_for_median,
        simplify_tolerance_deg: None,
    };

    let mut table = HashMap::new();
    table.insert(MovementType::Static, entry(5.0, 0.0, 5.0, 60_000, 4));
    table.insert(MovementType::Walking, entry(15.0, 0.3, 10.0, 20_000, 3));
    table.insert(MovementType::Scooter, entry(40.0, 1.0, 15.0, 15_000, 3));
    table.insert(MovementType::Car, entry(150.0, 2.0, 30.0, 10_000, 2));
    table.insert(MovementType::Train, entry(250.0, 5.0, 50.0, 20_000, 2));
    table
});

/// Look up the processing thresholds for a movement mode.
///
/// `Unknown` maps to the default settings.
pub fn settings_for_mode(mode: MovementType) -> ProcessorSettings {
    MODE_SETTINGS
        .get(&mode)
        .cloned()
        .unwrap_or_default()
}

/// Classify a position sequence into a movement mode.
///
/// Fewer than 5 points yields `Unknown` with default settings. Non-positive
/// speeds and speeds above 500 km/h are excluded from the statistic only;
/// the underlying positions are untouched.
pub fn classify_movement(positions: &[Position]) -> MovementAnalysis {
    if positions.len() < 5 {
        return MovementAnalysis {
            movement_type: MovementType::Unknown,
            confidence: 0.0,
            avg_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            settings: ProcessorSettings::default(),
        };
    }

    let speeds: Vec<f64> = positions
        .windows(2)
        .map(|w| {
            speed_kmh(
                &w[0].point,
                &w[1].point,
                w[0].timestamp_ms,
                w[1].timestamp_ms,
            )
        })
        .filter(|s| *s > 0.0 && *s <= SPEED_OUTLIER_KMH)
        .collect();

    if speeds.is_empty() {
        return MovementAnalysis {
            movement_type: MovementType::Static,
            confidence: 1.0,
            avg_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            settings: settings_for_mode(MovementType::Static),
        };
    }

    let n = speeds.len() as f64;
    let avg = speeds.iter().sum::<f64>() / n;
    let max = speeds.iter().cloned().fold(0.0_f64, f64::max);
    let variance = speeds.iter().map(|s| (s - avg).powi(2)).sum::<f64>() / n;

    // Primary candidate: the mode whose speed band covers the largest
    // fraction of observed speeds
    let mut movement_type = MovementType::Unknown;
    let mut confidence = 0.0;
    for (mode, lo, hi) in SPEED_BANDS {
        let in_band = speeds.iter().filter(|s| **s >= lo && **s <= hi).count();
        let fraction = in_band as f64 / n;
        if fraction > confidence {
            confidence = fraction;
            movement_type = mode;
        }
    }

    // Override rules applied afterward; a firing rule replaces the mode and
    // keeps the higher of its confidence floor and the band confidence
    let overrides: [(bool, MovementType, f64); 3] = [
        (avg < 1.0 && max < 3.0, MovementType::Walking, 0.8),
        (avg > 15.0 && max > 30.0, MovementType::Car, 0.7),
        (
            avg > 8.0 && avg < 20.0 && variance < 50.0,
            MovementType::Scooter,
            0.6,
        ),
    ];
    for (applies, mode, confidence_floor) in overrides {
        if applies {
            movement_type = mode;
            confidence = confidence.max(confidence_floor);
        }
    }

    debug!(
        "classified movement as {:?} (confidence {:.2}, avg {:.1} km/h, max {:.1} km/h)",
        movement_type, confidence, avg, max
    );

    MovementAnalysis {
        movement_type,
        confidence,
        avg_speed_kmh: avg,
        max_speed_kmh: max,
        settings: settings_for_mode(movement_type),
    }
}
