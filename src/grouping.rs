//! Temporal grouping and spatial clustering of filtered positions.
//!
//! Positions are first bucketed into anchored time windows, then each bucket
//! is clustered spatially with a greedy, seed-anchored single pass. The
//! greedy pass is deliberately *not* transitive clustering: two points close
//! to each other can land in different clusters if neither is within radius
//! of a shared seed, and the outcome depends on input order. This mirrors
//! how repeated fixes around a stop collapse in practice and keeps the pass
//! linear; an R-tree only accelerates the within-radius-of-seed query
//! without changing membership.

use log::debug;
use rstar::{primitives::GeomWithData, RTree};

use crate::geo_utils::{haversine_distance, meters_to_degrees};
use crate::Position;

/// Bucket positions into anchored time windows.
///
/// A group's span is measured from its *first* member: a point joins the
/// open group while `|t - first.t| <= window_ms`, otherwise it closes the
/// group and seeds a new one. Windows are anchored, not sliding.
pub fn group_by_time(positions: &[Position], window_ms: i64) -> Vec<Vec<Position>> {
    let mut groups: Vec<Vec<Position>> = Vec::new();

    for position in positions {
        match groups.last_mut() {
            Some(group) => {
                let anchor = group[0].timestamp_ms;
                if (position.timestamp_ms - anchor).abs() <= window_ms {
                    group.push(*position);
                } else {
                    groups.push(vec![*position]);
                }
            }
            None => groups.push(vec![*position]),
        }
    }

    debug!(
        "grouped {} positions into {} time windows",
        positions.len(),
        groups.len()
    );
    groups
}

/// Greedy, seed-anchored spatial clustering within one time group.
///
/// Iterates points in order; an unvisited point seeds a new cluster and
/// every later unvisited point within `radius_m` of that *seed* joins it.
/// Membership is seed-anchored and order-dependent by design (documented
/// approximation, not transitive clustering).
///
/// Candidate lookup goes through an R-tree with a conservative degree-space
/// radius; every candidate is confirmed with a haversine check, so the
/// result is identical to a linear scan.
pub fn cluster_spatially(group: &[Position], radius_m: f64) -> Vec<Vec<Position>> {
    if group.len() <= 1 {
        return group.iter().map(|p| vec![*p]).collect();
    }

    let tree: RTree<GeomWithData<[f64; 2], usize>> = RTree::bulk_load(
        group
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new([p.point.longitude, p.point.latitude], i))
            .collect(),
    );

    let mut visited = vec![false; group.len()];
    let mut clusters: Vec<Vec<Position>> = Vec::new();

    for seed_idx in 0..group.len() {
        if visited[seed_idx] {
            continue;
        }
        visited[seed_idx] = true;
        let seed = &group[seed_idx];

        // Conservative prefilter radius in degrees (inflated so the degree
        // box strictly covers the haversine radius); exact membership is
        // decided by the haversine check below
        let degree_radius = meters_to_degrees(radius_m * 1.05, seed.point.latitude);
        let mut candidates: Vec<usize> = tree
            .locate_within_distance(
                [seed.point.longitude, seed.point.latitude],
                degree_radius * degree_radius,
            )
            .map(|entry| entry.data)
            .collect();
        candidates.sort_unstable();

        let mut cluster = vec![*seed];
        for idx in candidates {
            if idx <= seed_idx || visited[idx] {
                continue;
            }
            if haversine_distance(&seed.point, &group[idx].point) <= radius_m {
                visited[idx] = true;
                cluster.push(group[idx]);
            }
        }
        clusters.push(cluster);
    }

    clusters
}
