//! Cluster reduction: collapse a spatial cluster to one representative point.
//!
//! Clusters of one pass through unchanged. Small clusters collapse to the
//! per-axis arithmetic mean; larger ones to the per-axis median, which is
//! robust to a stray outlier inside the radius. The median is taken on each
//! axis independently, so the representative point is not guaranteed to
//! coincide with any single real fix (accepted approximation; a joint
//! geometric median would differ for asymmetric clusters).

use crate::{GpsPoint, Position, ReducedPosition};

/// Collapse a cluster to one [`ReducedPosition`].
///
/// - empty cluster: `None`
/// - single point: unchanged, `original_count = 1`
/// - fewer than `min_points_for_median`: per-axis mean, mean timestamp
/// - otherwise: per-axis median, mean timestamp
pub fn reduce_cluster(cluster: &[Position], min_points_for_median: usize) -> Option<ReducedPosition> {
    match cluster.len() {
        0 => None,
        1 => Some(ReducedPosition {
            point: cluster[0].point,
            timestamp_ms: cluster[0].timestamp_ms,
            original_count: 1,
        }),
        n if n < min_points_for_median => Some(ReducedPosition {
            point: GpsPoint::new(
                mean(cluster.iter().map(|p| p.point.latitude)),
                mean(cluster.iter().map(|p| p.point.longitude)),
            ),
            timestamp_ms: mean_timestamp(cluster),
            original_count: n,
        }),
        n => Some(ReducedPosition {
            point: GpsPoint::new(
                median(cluster.iter().map(|p| p.point.latitude).collect()),
                median(cluster.iter().map(|p| p.point.longitude).collect()),
            ),
            timestamp_ms: mean_timestamp(cluster),
            original_count: n,
        }),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    sum / count as f64
}

fn mean_timestamp(cluster: &[Position]) -> i64 {
    let sum: i64 = cluster.iter().map(|p| p.timestamp_ms).sum();
    sum / cluster.len() as i64
}

/// Median of one coordinate axis. Even-sized inputs average the two middle
/// values.
fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}
