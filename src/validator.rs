//! Per-point integrity scoring and risk classification.
//!
//! Each reported fix is scored against an optional expectation (an anchor
//! location the worker should be near) and a short history of previously
//! accepted fixes. Six checks run in a fixed order and each can only raise
//! the risk level, never lower it:
//!
//! 1. Range check (malformed coordinates short-circuit to HIGH)
//! 2. Deviation from the expected location
//! 3. Consistent-shift (jamming) detection
//! 4. Teleportation detection
//! 5. Suspicious decimal-accuracy heuristics
//! 6. Movement-pattern plausibility
//!
//! Missing context never escalates risk: checks that require an expectation
//! or history are simply skipped.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{haversine_distance, point_to_chord_deviation, speed_kmh};
use crate::{GpsPoint, Position};

/// Thresholds for the integrity checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Maximum allowed distance from the expected location (km).
    /// Default: 5.0
    pub max_deviation_km: f64,

    /// Per-axis variance (and mean latitude offset magnitude) threshold for
    /// the consistent-shift check, in degrees. Default: 0.001 (~111 m)
    pub consistent_shift_threshold: f64,

    /// Minimum mean offset distance for a consistent shift to be flagged (km).
    /// Default: 0.5
    pub min_shift_distance_km: f64,

    /// Implied speed above `max_speed_kmh * teleport_multiplier` is flagged
    /// as teleportation. Default: 3.0
    pub teleport_multiplier: f64,

    /// A fractional part within this of a whole degree is suspicious.
    /// Default: 0.0001
    pub suspicious_accuracy_threshold: f64,

    /// Average chord deviation below this is implausibly straight for
    /// city-scale movement (meters). Default: 10.0
    pub straight_line_threshold_m: f64,

    /// Consecutive speed deltas above this count as jumps (km/h).
    /// Default: 20.0
    pub speed_jump_kmh: f64,

    /// Fraction of jump deltas above which movement is flagged erratic.
    /// Default: 0.3
    pub speed_jump_fraction: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_deviation_km: 5.0,
            consistent_shift_threshold: 0.001,
            min_shift_distance_km: 0.5,
            teleport_multiplier: 3.0,
            suspicious_accuracy_threshold: 0.0001,
            straight_line_threshold_m: 10.0,
            speed_jump_kmh: 20.0,
            speed_jump_fraction: 0.3,
        }
    }
}

/// Monotonic risk classification for a single fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// What the orchestrator should do with a scored fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Accept,
    FlagForReview,
    RequireVerification,
}

/// Warning tags attached by individual checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Warning {
    MalformedCoordinates,
    LocationDeviation,
    ConsistentShift,
    Teleportation,
    SuspiciousAccuracy,
    SuspiciousMovement,
}

/// Sub-result of the consistent-shift check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShiftCheck {
    pub mean_offset_km: f64,
    pub lat_variance: f64,
    pub lng_variance: f64,
    pub consistent: bool,
}

/// Per-check sub-results, present only for checks that actually ran.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckDetails {
    pub deviation_km: Option<f64>,
    pub shift: Option<ShiftCheck>,
    pub implied_speed_kmh: Option<f64>,
    pub suspicious_accuracy: Option<bool>,
    pub avg_chord_deviation_m: Option<f64>,
    pub speed_jump_fraction: Option<f64>,
}

/// Result of scoring one fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub risk: RiskLevel,
    pub warnings: Vec<Warning>,
    pub checks: CheckDetails,
}

impl ValidationResult {
    /// Map the risk level to the action consumed by the pipeline's
    /// filtering stage.
    pub fn action(&self) -> Action {
        match self.risk {
            RiskLevel::Low => Action::Accept,
            RiskLevel::Medium => Action::FlagForReview,
            RiskLevel::High => Action::RequireVerification,
        }
    }

    /// MEDIUM risk: still accepted, but should be surfaced for review.
    pub fn requires_attention(&self) -> bool {
        self.risk == RiskLevel::Medium
    }

    /// HIGH risk: the fix is rejected pending verification.
    pub fn requires_verification(&self) -> bool {
        self.risk == RiskLevel::High
    }
}

/// Everything the validator knows about the world besides the fix itself.
///
/// All fields are optional in effect: an empty context skips every check
/// that needs it and the fix scores LOW by default.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    /// Anchor location the worker is expected to be near
    pub expected: Option<GpsPoint>,
    /// Last accepted positions, oldest first (bounded to 5 by the caller)
    pub previous_accepted: Vec<GpsPoint>,
    /// Most recently accepted fix
    pub last_accepted: Option<GpsPoint>,
    /// Time since the last accepted fix, in milliseconds
    pub time_diff_ms: Option<i64>,
    /// Maximum plausible sustained speed for this worker (km/h);
    /// non-positive disables the teleportation check
    pub max_speed_kmh: f64,
    /// Raw fixes immediately preceding this one (bounded to 10), used for
    /// movement-pattern checks
    pub recent_raw: Vec<Position>,
}

/// Score a single fix against its context.
///
/// Risk is monotonic: each check may raise it but never lower it. Absent
/// context skips checks rather than escalating.
pub fn validate(point: &GpsPoint, ctx: &ValidationContext, config: &ValidatorConfig) -> ValidationResult {
    let mut risk = RiskLevel::Low;
    let mut warnings = Vec::new();
    let mut checks = CheckDetails::default();

    // Check 1: range/type. Malformed coordinates short-circuit.
    if !point.is_valid() {
        warn!(
            "malformed coordinates ({}, {}), rejecting",
            point.latitude, point.longitude
        );
        return ValidationResult {
            is_valid: false,
            risk: RiskLevel::High,
            warnings: vec![Warning::MalformedCoordinates],
            checks,
        };
    }

    // Check 2: deviation from the expected location
    if let Some(expected) = &ctx.expected {
        let deviation_km = haversine_distance(point, expected) / 1000.0;
        checks.deviation_km = Some(deviation_km);
        if deviation_km > config.max_deviation_km {
            debug!(
                "location deviation {:.2} km exceeds {:.2} km",
                deviation_km, config.max_deviation_km
            );
            risk = risk.max(RiskLevel::Medium);
            warnings.push(Warning::LocationDeviation);
        }
    }

    // Check 3: consistent-shift (jamming) detection
    if let Some(expected) = &ctx.expected {
        if ctx.previous_accepted.len() >= 3 {
            let shift = detect_consistent_shift(
                point,
                &ctx.previous_accepted,
                expected,
                config.consistent_shift_threshold,
            );
            checks.shift = Some(shift);
            if shift.consistent && shift.mean_offset_km > config.min_shift_distance_km {
                warn!(
                    "consistent shift of {:.2} km from expected location",
                    shift.mean_offset_km
                );
                risk = risk.max(RiskLevel::High);
                warnings.push(Warning::ConsistentShift);
            }
        }
    }

    // Check 4: teleportation. A zero time delta or a context built without a
    // speed limit skips the check rather than flagging every moving fix.
    if let (Some(last), Some(dt_ms)) = (&ctx.last_accepted, ctx.time_diff_ms) {
        if dt_ms > 0 && ctx.max_speed_kmh > 0.0 {
            let distance_km = haversine_distance(point, last) / 1000.0;
            let hours = dt_ms as f64 / 3_600_000.0;
            let implied = distance_km / hours;
            checks.implied_speed_kmh = Some(implied);
            if implied > ctx.max_speed_kmh * config.teleport_multiplier {
                warn!(
                    "teleportation: implied speed {:.0} km/h against limit {:.0} km/h",
                    implied,
                    ctx.max_speed_kmh * config.teleport_multiplier
                );
                risk = risk.max(RiskLevel::High);
                warnings.push(Warning::Teleportation);
            }
        }
    }

    // Check 5: suspicious decimal accuracy
    let suspicious = has_suspicious_accuracy(point.latitude, config.suspicious_accuracy_threshold)
        || has_suspicious_accuracy(point.longitude, config.suspicious_accuracy_threshold);
    checks.suspicious_accuracy = Some(suspicious);
    if suspicious {
        risk = risk.max(RiskLevel::Medium);
        warnings.push(Warning::SuspiciousAccuracy);
    }

    // Check 6: movement-pattern plausibility
    if ctx.recent_raw.len() >= 5 {
        let (avg_deviation_m, jump_fraction) =
            movement_pattern_stats(&ctx.recent_raw, config.speed_jump_kmh);
        checks.avg_chord_deviation_m = Some(avg_deviation_m);
        checks.speed_jump_fraction = Some(jump_fraction);

        let too_straight = avg_deviation_m < config.straight_line_threshold_m;
        let erratic = jump_fraction > config.speed_jump_fraction;
        if too_straight || erratic {
            debug!(
                "suspicious movement: avg deviation {:.1} m, jump fraction {:.2}",
                avg_deviation_m, jump_fraction
            );
            risk = risk.max(RiskLevel::Medium);
            warnings.push(Warning::SuspiciousMovement);
        }
    }

    ValidationResult {
        is_valid: risk != RiskLevel::High,
        risk,
        warnings,
        checks,
    }
}

/// Detect a near-constant offset from the expected location across the
/// previous accepted positions and the current one.
///
/// Jamming and replay attacks tend to shift every report by the same vector,
/// so both axis variances stay tiny while the mean offset is large.
fn detect_consistent_shift(
    point: &GpsPoint,
    previous: &[GpsPoint],
    expected: &GpsPoint,
    threshold: f64,
) -> ShiftCheck {
    let mut lat_offsets: Vec<f64> = previous
        .iter()
        .map(|p| p.latitude - expected.latitude)
        .collect();
    let mut lng_offsets: Vec<f64> = previous
        .iter()
        .map(|p| p.longitude - expected.longitude)
        .collect();
    lat_offsets.push(point.latitude - expected.latitude);
    lng_offsets.push(point.longitude - expected.longitude);

    let (lat_mean, lat_variance) = mean_and_variance(&lat_offsets);
    let (lng_mean, lng_variance) = mean_and_variance(&lng_offsets);

    let consistent =
        lat_variance < threshold && lng_variance < threshold && lat_mean.abs() > threshold;

    // Distance of the mean shifted point from the expectation
    let shifted = GpsPoint::new(expected.latitude + lat_mean, expected.longitude + lng_mean);
    let mean_offset_km = haversine_distance(expected, &shifted) / 1000.0;

    ShiftCheck {
        mean_offset_km,
        lat_variance,
        lng_variance,
        consistent,
    }
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

/// String-level heuristics on the decimal representation of a coordinate.
///
/// Synthetic coordinates tend to carry too many decimal digits, long runs of
/// repeated digits, or land implausibly close to a whole degree.
fn has_suspicious_accuracy(value: f64, near_whole_threshold: f64) -> bool {
    let frac = value.fract().abs();
    if frac < near_whole_threshold || frac > 1.0 - near_whole_threshold {
        return true;
    }

    let text = format!("{}", value.abs());
    let digits = match text.split_once('.') {
        Some((_, d)) => d,
        None => return true, // exactly whole
    };

    if digits.len() > 8 {
        return true;
    }

    let mut run_char = ' ';
    let mut run_len = 0usize;
    for c in digits.chars() {
        if c == run_char {
            run_len += 1;
        } else {
            run_char = c;
            run_len = 1;
        }
        if run_char == '0' && run_len >= 4 {
            return true;
        }
        if run_len >= 5 {
            return true;
        }
    }

    false
}

/// Statistics for the movement-pattern check over the recent raw window.
///
/// Returns (average chord deviation of interior points in meters, fraction
/// of consecutive speed deltas exceeding `speed_jump_kmh`).
fn movement_pattern_stats(recent: &[Position], speed_jump_kmh: f64) -> (f64, f64) {
    // Straight-line test: perpendicular deviation of each interior point
    // from the chord between its neighbors
    let mut deviation_sum = 0.0;
    let mut deviation_count = 0usize;
    for i in 1..recent.len() - 1 {
        let dev = point_to_chord_deviation(
            &recent[i].point,
            &recent[i - 1].point,
            &recent[i + 1].point,
        );
        if dev.is_finite() {
            deviation_sum += dev;
            deviation_count += 1;
        }
    }
    let avg_deviation = if deviation_count > 0 {
        deviation_sum / deviation_count as f64
    } else {
        f64::INFINITY
    };

    // Speed-jump test: fraction of consecutive inter-point speed deltas
    // exceeding the jump threshold
    let speeds: Vec<f64> = recent
        .windows(2)
        .map(|w| {
            speed_kmh(
                &w[0].point,
                &w[1].point,
                w[0].timestamp_ms,
                w[1].timestamp_ms,
            )
        })
        .collect();

    let mut jumps = 0usize;
    let mut deltas = 0usize;
    for w in speeds.windows(2) {
        let delta = (w[1] - w[0]).abs();
        if delta.is_finite() {
            deltas += 1;
            if delta > speed_jump_kmh {
                jumps += 1;
            }
        }
    }
    let jump_fraction = if deltas > 0 {
        jumps as f64 / deltas as f64
    } else {
        0.0
    };

    (avg_deviation, jump_fraction)
}
