//! Speed filtering of raw samples.
//!
//! Drops samples that imply an unrealistic velocity relative to the
//! immediately preceding *raw* sample. Comparing raw-to-raw (rather than
//! against the last accepted point) confines the damage of a single bad
//! sample to the two pairs touching it instead of a growing chain.

use log::debug;

use crate::geo_utils::speed_kmh;
use crate::pipeline::{Diagnostic, DiagnosticKind};
use crate::{Position, ProcessorSettings};

/// Keep samples whose speed relative to the previous raw sample lies within
/// `[min_speed_kmh, max_speed_kmh]`. The first sample is always kept.
///
/// Rejections are recorded in `diagnostics` rather than logged and lost.
pub fn filter_by_speed(
    positions: &[Position],
    settings: &ProcessorSettings,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Position> {
    if positions.is_empty() {
        return Vec::new();
    }

    let mut kept = Vec::with_capacity(positions.len());
    kept.push(positions[0]);

    for window in positions.windows(2) {
        let (prev, current) = (&window[0], &window[1]);
        let speed = speed_kmh(
            &prev.point,
            &current.point,
            prev.timestamp_ms,
            current.timestamp_ms,
        );

        if speed >= settings.min_speed_kmh && speed <= settings.max_speed_kmh {
            kept.push(*current);
        } else {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::SpeedFiltered,
                timestamp_ms: current.timestamp_ms,
                detail: format!(
                    "speed {:.1} km/h outside [{:.1}, {:.1}]",
                    speed, settings.min_speed_kmh, settings.max_speed_kmh
                ),
            });
        }
    }

    debug!(
        "speed filter kept {} of {} positions",
        kept.len(),
        positions.len()
    );
    kept
}
