//! Pipeline orchestration: validation, adaptive thresholds, filtering,
//! grouping, clustering, reduction and statistics.
//!
//! The orchestrator never errors on data quality: malformed points become
//! diagnostics, missing context skips checks, and an empty batch yields an
//! empty result. The only `Err` is a configuration contract violation.
//!
//! Reentrancy: the effective [`ProcessorSettings`] for an invocation is
//! computed once (fixed, or derived from the detected movement mode) and
//! passed explicitly to every stage. Nothing is stored on shared state.

use geo::{algorithm::simplify::Simplify, Coord, LineString};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::filter_by_speed;
use crate::geo_utils::polyline_length;
use crate::grouping::{cluster_spatially, group_by_time};
use crate::movement::{classify_movement, MovementAnalysis};
use crate::reduce::reduce_cluster;
use crate::validator::{validate, Action, ValidationContext, ValidatorConfig, Warning};
use crate::{Bounds, GpsPoint, Position, ProcessorSettings, ReducedPosition};

/// How many accepted positions the validator sees as history.
const ACCEPTED_HISTORY: usize = 5;

/// How many preceding raw positions feed the movement-pattern checks.
const RAW_HISTORY: usize = 10;

/// Validation options for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Anchor location the worker is expected to be near (e.g. a task's
    /// target address), if any
    pub expected: Option<GpsPoint>,
    /// Thresholds for the integrity checks
    pub validator: ValidatorConfig,
}

/// Configuration for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Thresholds used when adaptive mode is off, and the source of the
    /// display simplification tolerance either way
    pub settings: ProcessorSettings,
    /// Derive thresholds from the detected movement mode
    pub adaptive: bool,
    /// Score every point before processing; `None` disables validation
    pub validation: Option<ValidationOptions>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            settings: ProcessorSettings::default(),
            adaptive: true,
            validation: None,
        }
    }
}

/// Why a raw point did not reach the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MalformedCoordinate,
    ValidationRejected,
    SpeedFiltered,
}

/// A structured skip/rejection event, returned instead of being logged and
/// lost so callers and tests can assert on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Timestamp of the affected raw sample
    pub timestamp_ms: i64,
    pub detail: String,
}

/// Outcome counts of the validation stage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Points scored
    pub total: usize,
    /// Points kept (including flagged ones)
    pub accepted: usize,
    /// Kept, but at MEDIUM risk and surfaced for review
    pub flagged: usize,
    /// Rejected at HIGH risk
    pub rejected: usize,
}

/// Reduction and distance statistics for one invocation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub original_count: usize,
    pub processed_count: usize,
    /// `(original - processed) / original * 100`
    pub reduction_percent: f64,
    /// Sum of consecutive haversine distances over the well-formed input
    pub original_distance_m: f64,
    /// Sum of consecutive haversine distances over the output
    pub processed_distance_m: f64,
    /// `(processed - original) / original * 100`; negative when denoising
    /// shortened the track
    pub distance_change_percent: f64,
}

/// Everything one invocation produces. Ephemeral: created per call and
/// returned to the caller, which owns any persistence or display.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    /// Reduced trajectory in group order and within-group cluster-discovery
    /// order; never re-sorted by time
    pub positions: Vec<ReducedPosition>,
    /// Present when adaptive mode ran
    pub movement: Option<MovementAnalysis>,
    /// Present when validation ran
    pub validation: Option<ValidationSummary>,
    /// Bounding box of the output track, for map rendering
    pub bounds: Option<Bounds>,
    pub stats: ProcessingStats,
    pub diagnostics: Vec<Diagnostic>,
}

impl ProcessingResult {
    /// Serialize the result for a host layer.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Process a batch of raw fixes into a reduced trajectory plus analysis.
///
/// Errors only on invalid configuration; data-quality issues are encoded in
/// the result and its diagnostics.
pub fn process(positions: &[Position], config: &PipelineConfig) -> Result<ProcessingResult> {
    config.settings.validate()?;

    info!("processing batch of {} positions", positions.len());

    if positions.is_empty() {
        return Ok(ProcessingResult {
            positions: Vec::new(),
            movement: None,
            validation: config.validation.as_ref().map(|_| ValidationSummary::default()),
            bounds: None,
            stats: ProcessingStats::default(),
            diagnostics: Vec::new(),
        });
    }

    let mut diagnostics = Vec::new();

    // Stage 1: integrity scoring (or plain sanitization when disabled).
    // Inherently sequential: each point's score depends on the incrementally
    // built accepted-history window.
    let (working, validation) = match &config.validation {
        Some(options) => {
            let (accepted, summary) = run_validation(
                positions,
                options,
                config.settings.max_speed_kmh,
                &mut diagnostics,
            );
            (accepted, Some(summary))
        }
        None => (sanitize(positions, &mut diagnostics), None),
    };

    // Stage 2: adaptive thresholds from the detected movement mode
    let (effective, movement) = if config.adaptive {
        let analysis = classify_movement(&working);
        let mut settings = analysis.settings.clone();
        settings.simplify_tolerance_deg = config.settings.simplify_tolerance_deg;
        debug!(
            "adaptive settings from {:?}: radius {} m, window {} ms",
            analysis.movement_type, settings.cluster_radius_m, settings.time_window_ms
        );
        (settings, Some(analysis))
    } else {
        (config.settings.clone(), None)
    };

    // Stage 3: speed filter -> anchored time groups -> greedy spatial
    // clusters -> reduction, preserving group and cluster-discovery order
    let filtered = filter_by_speed(&working, &effective, &mut diagnostics);

    let mut reduced: Vec<ReducedPosition> = Vec::new();
    for group in group_by_time(&filtered, effective.time_window_ms) {
        for cluster in cluster_spatially(&group, effective.cluster_radius_m) {
            if let Some(point) = reduce_cluster(&cluster, effective.min_points_for_median) {
                reduced.push(point);
            }
        }
    }

    // Stage 4: optional display simplification
    if let Some(tolerance) = effective.simplify_tolerance_deg {
        reduced = simplify_for_display(reduced, tolerance);
    }

    let stats = compute_stats(positions, &reduced);
    debug!(
        "reduced {} -> {} positions ({:.1}% reduction)",
        stats.original_count, stats.processed_count, stats.reduction_percent
    );

    let output_points: Vec<GpsPoint> = reduced.iter().map(|r| r.point).collect();
    let bounds = Bounds::from_points(&output_points);

    Ok(ProcessingResult {
        positions: reduced,
        movement,
        validation,
        bounds,
        stats,
        diagnostics,
    })
}

/// Drop malformed points, recording a diagnostic for each.
fn sanitize(positions: &[Position], diagnostics: &mut Vec<Diagnostic>) -> Vec<Position> {
    positions
        .iter()
        .filter(|p| {
            if p.point.is_valid() {
                true
            } else {
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::MalformedCoordinate,
                    timestamp_ms: p.timestamp_ms,
                    detail: format!("({}, {})", p.point.latitude, p.point.longitude),
                });
                false
            }
        })
        .copied()
        .collect()
}

/// Score every point with a growing accepted-history window and apply the
/// action mapping.
fn run_validation(
    positions: &[Position],
    options: &ValidationOptions,
    max_speed_kmh: f64,
    diagnostics: &mut Vec<Diagnostic>,
) -> (Vec<Position>, ValidationSummary) {
    let mut accepted: Vec<Position> = Vec::with_capacity(positions.len());
    let mut summary = ValidationSummary {
        total: positions.len(),
        ..Default::default()
    };

    for (index, position) in positions.iter().enumerate() {
        let history_start = accepted.len().saturating_sub(ACCEPTED_HISTORY);
        let raw_start = index.saturating_sub(RAW_HISTORY);

        let context = ValidationContext {
            expected: options.expected,
            previous_accepted: accepted[history_start..]
                .iter()
                .map(|p| p.point)
                .collect(),
            last_accepted: accepted.last().map(|p| p.point),
            time_diff_ms: accepted
                .last()
                .map(|p| position.timestamp_ms - p.timestamp_ms),
            max_speed_kmh,
            recent_raw: positions[raw_start..index].to_vec(),
        };

        let result = validate(&position.point, &context, &options.validator);
        match result.action() {
            Action::Accept => {
                summary.accepted += 1;
                accepted.push(*position);
            }
            Action::FlagForReview => {
                summary.accepted += 1;
                summary.flagged += 1;
                accepted.push(*position);
            }
            Action::RequireVerification => {
                summary.rejected += 1;
                let kind = if result.warnings.contains(&Warning::MalformedCoordinates) {
                    DiagnosticKind::MalformedCoordinate
                } else {
                    DiagnosticKind::ValidationRejected
                };
                diagnostics.push(Diagnostic {
                    kind,
                    timestamp_ms: position.timestamp_ms,
                    detail: format!("{:?}", result.warnings),
                });
            }
        }
    }

    debug!(
        "validation: {} accepted ({} flagged), {} rejected",
        summary.accepted, summary.flagged, summary.rejected
    );
    (accepted, summary)
}

/// Douglas-Peucker simplification of the reduced polyline for display.
///
/// DP keeps a subset of the original vertices, so surviving coordinates are
/// matched back to their `ReducedPosition` in order.
fn simplify_for_display(reduced: Vec<ReducedPosition>, tolerance: f64) -> Vec<ReducedPosition> {
    if reduced.len() < 3 {
        return reduced;
    }

    let line = LineString::new(
        reduced
            .iter()
            .map(|r| Coord {
                x: r.point.longitude,
                y: r.point.latitude,
            })
            .collect(),
    );
    let simplified = line.simplify(&tolerance);

    let mut survivors = simplified.0.iter();
    let mut next = survivors.next();
    let mut out = Vec::with_capacity(simplified.0.len());
    for position in reduced {
        if let Some(coord) = next {
            // DP returns bit-identical copies of surviving input vertices, so
            // exact f64 equality is the correct match; an epsilon could bind
            // a survivor to a dropped near-duplicate neighbor instead
            if position.point.longitude == coord.x && position.point.latitude == coord.y {
                out.push(position);
                next = survivors.next();
            }
        }
    }
    out
}

fn compute_stats(input: &[Position], output: &[ReducedPosition]) -> ProcessingStats {
    let original_count = input.len();
    let processed_count = output.len();

    let original_points: Vec<GpsPoint> = input
        .iter()
        .map(|p| p.point)
        .filter(|p| p.is_valid())
        .collect();
    let output_points: Vec<GpsPoint> = output.iter().map(|r| r.point).collect();

    let original_distance_m = polyline_length(&original_points);
    let processed_distance_m = polyline_length(&output_points);

    let reduction_percent = if original_count > 0 {
        (original_count - processed_count) as f64 / original_count as f64 * 100.0
    } else {
        0.0
    };
    let distance_change_percent = if original_distance_m > 0.0 {
        (processed_distance_m - original_distance_m) / original_distance_m * 100.0
    } else {
        0.0
    };

    ProcessingStats {
        original_count,
        processed_count,
        reduction_percent,
        original_distance_m,
        processed_distance_m,
        distance_change_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::MovementType;
    use crate::TrackError;

    fn pos(lat: f64, lng: f64, ts_ms: i64) -> Position {
        Position::new(GpsPoint::new(lat, lng), ts_ms)
    }

    fn fixed_config() -> PipelineConfig {
        PipelineConfig {
            settings: ProcessorSettings::default(),
            adaptive: false,
            validation: None,
        }
    }

    #[test]
    fn test_empty_input_empty_result() {
        let result = process(&[], &PipelineConfig::default()).unwrap();
        assert!(result.positions.is_empty());
        assert!(result.bounds.is_none());
        assert_eq!(result.stats.original_count, 0);
        assert_eq!(result.stats.reduction_percent, 0.0);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_invalid_config_is_the_only_error() {
        let config = PipelineConfig {
            settings: ProcessorSettings {
                max_speed_kmh: -5.0,
                ..Default::default()
            },
            ..fixed_config()
        };
        let err = process(&[pos(51.5, -0.12, 0)], &config).unwrap_err();
        assert!(matches!(err, TrackError::InvalidConfig { field: "max_speed_kmh", .. }));
    }

    #[test]
    fn test_walking_cluster_collapses_to_median() {
        // Five fixes ~2 m apart, 2 s apart: classified as walking, one time
        // bucket, one cluster, one output point with the per-axis median
        let positions: Vec<Position> = (0..5)
            .map(|i| pos(51.5 + i as f64 * 0.000018, -0.12, i as i64 * 2_000))
            .collect();

        let result = process(&positions, &PipelineConfig::default()).unwrap();

        let movement = result.movement.unwrap();
        assert_eq!(movement.movement_type, MovementType::Walking);
        assert_eq!(movement.settings.cluster_radius_m, 10.0);

        assert_eq!(result.positions.len(), 1);
        let reduced = result.positions[0];
        assert_eq!(reduced.original_count, 5);
        // Median of the five latitudes is the middle fix
        assert!((reduced.point.latitude - 51.500036).abs() < 1e-9);
        assert_eq!(reduced.point.longitude, -0.12);
        assert_eq!(reduced.timestamp_ms, 4_000);

        assert_eq!(result.stats.original_count, 5);
        assert_eq!(result.stats.processed_count, 1);
        assert_eq!(result.stats.reduction_percent, 80.0);
    }

    #[test]
    fn test_malformed_point_skipped_batch_continues() {
        let positions = vec![
            pos(51.5, -0.12, 0),
            pos(f64::NAN, -0.12, 10_000),
            pos(51.5001, -0.12, 20_000),
        ];
        let result = process(&positions, &fixed_config()).unwrap();
        assert_eq!(result.stats.original_count, 3);
        assert_eq!(
            result
                .diagnostics
                .iter()
                .filter(|d| d.kind == DiagnosticKind::MalformedCoordinate)
                .count(),
            1
        );
        // The surviving points still flow through the pipeline
        assert!(result.stats.processed_count >= 1);
    }

    #[test]
    fn test_validation_rejects_teleport_and_counts() {
        // Walking-pace track with one 500 km excursion
        let mut positions: Vec<Position> = (0..3)
            .map(|i| pos(51.5 + i as f64 * 0.000126, -0.12, i as i64 * 10_000))
            .collect();
        positions.push(pos(56.0, -0.12, 30_000)); // ~500 km north
        positions.push(pos(51.5005, -0.12, 40_000));

        let config = PipelineConfig {
            validation: Some(ValidationOptions {
                expected: Some(GpsPoint::new(51.5, -0.12)),
                validator: ValidatorConfig::default(),
            }),
            ..fixed_config()
        };
        let result = process(&positions, &config).unwrap();

        let summary = result.validation.unwrap();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.accepted, 4);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::ValidationRejected && d.timestamp_ms == 30_000));
        // The excursion never reaches the output
        assert!(result
            .positions
            .iter()
            .all(|r| r.point.latitude < 52.0));
    }

    #[test]
    fn test_validation_flags_but_keeps_medium_risk() {
        let positions = vec![
            pos(51.500126, -0.12, 0),
            pos(51.5000012, -0.12, 10_000), // run of zeros: suspicious accuracy
        ];
        let config = PipelineConfig {
            validation: Some(ValidationOptions::default()),
            ..fixed_config()
        };
        let result = process(&positions, &config).unwrap();
        let summary = result.validation.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.flagged, 1);
        assert_eq!(summary.rejected, 0);
    }

    #[test]
    fn test_processed_never_exceeds_original() {
        let positions: Vec<Position> = (0..50)
            .map(|i| {
                pos(
                    51.5 + (i % 7) as f64 * 0.00002,
                    -0.12 + (i % 5) as f64 * 0.00002,
                    i as i64 * 3_000,
                )
            })
            .collect();
        let result = process(&positions, &PipelineConfig::default()).unwrap();
        assert!(result.stats.processed_count <= result.stats.original_count);
    }

    #[test]
    fn test_reduction_is_a_fixed_point() {
        // Maximally spread track: every point is its own time group, so
        // processing is the identity, and reprocessing the output with the
        // same settings must not reduce further
        let positions: Vec<Position> = (0..6)
            .map(|i| pos(51.5 + i as f64 * 0.009, -0.12, i as i64 * 60_000))
            .collect();
        let config = fixed_config();

        let first = process(&positions, &config).unwrap();
        assert_eq!(first.positions.len(), 6);

        let again: Vec<Position> = first
            .positions
            .iter()
            .map(|r| Position::new(r.point, r.timestamp_ms))
            .collect();
        let second = process(&again, &config).unwrap();
        assert_eq!(second.positions.len(), first.positions.len());
    }

    #[test]
    fn test_output_preserves_discovery_order() {
        // Two time groups; output follows group order even though the
        // second group's timestamp is earlier. Out-of-order input is not
        // corrected by re-sorting.
        let positions = vec![
            pos(51.5000, -0.12, 60_000),
            pos(51.5009, -0.12, 70_000), // ~100 m in 10 s, same time group
            pos(51.5018, -0.12, 0),      // 60 s from the anchor: new group
        ];
        let result = process(&positions, &fixed_config()).unwrap();
        let latitudes: Vec<f64> = result.positions.iter().map(|r| r.point.latitude).collect();
        assert_eq!(latitudes, vec![51.5000, 51.5009, 51.5018]);
        assert_eq!(result.positions[2].timestamp_ms, 0);
    }

    #[test]
    fn test_display_simplification_drops_collinear_points() {
        // Five collinear fixes 100 m apart, far apart in time so reduction
        // is the identity; simplification then keeps only the endpoints
        let positions: Vec<Position> = (0..5)
            .map(|i| pos(51.5 + i as f64 * 0.0009, -0.12, i as i64 * 60_000))
            .collect();
        let config = PipelineConfig {
            settings: ProcessorSettings {
                simplify_tolerance_deg: Some(0.0001),
                ..Default::default()
            },
            adaptive: false,
            validation: None,
        };
        let result = process(&positions, &config).unwrap();
        assert_eq!(result.positions.len(), 2);
        assert_eq!(result.positions[0].timestamp_ms, 0);
        assert_eq!(result.positions[1].timestamp_ms, 240_000);
    }

    #[test]
    fn test_bounds_cover_output() {
        let positions: Vec<Position> = (0..4)
            .map(|i| pos(51.5 + i as f64 * 0.009, -0.12, i as i64 * 60_000))
            .collect();
        let result = process(&positions, &fixed_config()).unwrap();
        let bounds = result.bounds.unwrap();
        assert!(bounds.min_lat >= 51.5 - 1e-9);
        assert!(bounds.max_lat <= 51.527 + 1e-9);
    }

    #[test]
    fn test_result_serializes_to_json() {
        let positions: Vec<Position> = (0..5)
            .map(|i| pos(51.5 + i as f64 * 0.000018, -0.12, i as i64 * 2_000))
            .collect();
        let result = process(&positions, &PipelineConfig::default()).unwrap();
        let json = result.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["stats"]["original_count"], 5);
        assert_eq!(value["movement"]["movement_type"], "walking");
        assert!(value["positions"].is_array());
    }
}
