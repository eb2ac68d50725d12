// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rectangle-shape validation for ordered quadrilateral corners.

use ticketscan_core::config::ShapeTolerances;
use ticketscan_core::{Point, Quad};

/// Geometry of a quadrilateral as seen by the shape check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeMetrics {
    /// Cyclic side lengths `|P0P1|, |P1P2|, |P2P3|, |P3P0|`.
    pub sides: [f64; 4],
    /// Mean of the two longest sides over the mean of the two shortest.
    pub aspect_ratio: f64,
    /// Relative length difference of sides 0/2 and 1/3.
    pub opposite_deltas: [f64; 2],
    /// Interior angle at each corner, in degrees.
    pub angles: [f64; 4],
}

impl ShapeMetrics {
    pub fn measure(corners: &Quad) -> Self {
        let sides: [f64; 4] = std::array::from_fn(|i| corners[i].distance(corners[(i + 1) % 4]));

        let mut sorted = sides;
        sorted.sort_by(f64::total_cmp);
        let short_side = (sorted[0] + sorted[1]) / 2.0;
        let long_side = (sorted[2] + sorted[3]) / 2.0;

        let delta = |a: f64, b: f64| (a - b).abs() / a.max(b);

        Self {
            sides,
            aspect_ratio: long_side / short_side,
            opposite_deltas: [delta(sides[0], sides[2]), delta(sides[1], sides[3])],
            angles: std::array::from_fn(|i| {
                interior_angle(corners[(i + 3) % 4], corners[i], corners[(i + 1) % 4])
            }),
        }
    }

    /// All three checks; any NaN (degenerate sides) fails.
    pub fn passes(&self, tol: &ShapeTolerances) -> bool {
        let aspect_ok = self.aspect_ratio >= tol.min_aspect && self.aspect_ratio <= tol.max_aspect;
        let symmetry_ok = self
            .opposite_deltas
            .iter()
            .all(|d| *d <= tol.max_side_asymmetry);
        let angles_ok = self
            .angles
            .iter()
            .all(|a| *a >= tol.min_angle_deg && *a <= tol.max_angle_deg);
        aspect_ok && symmetry_ok && angles_ok
    }
}

/// Whether the ordered corners look like a photographed rectangle.
pub fn validate_rectangular_shape(corners: &Quad, tol: &ShapeTolerances) -> bool {
    ShapeMetrics::measure(corners).passes(tol)
}

/// Angle at `vertex` between the edges towards `prev` and `next`, in degrees.
/// NaN when either edge has zero length.
fn interior_angle(prev: Point, vertex: Point, next: Point) -> f64 {
    let (v1x, v1y) = (prev.x - vertex.x, prev.y - vertex.y);
    let (v2x, v2y) = (next.x - vertex.x, next.y - vertex.y);
    let norms = (v1x * v1x + v1y * v1y).sqrt() * (v2x * v2x + v2y * v2y).sqrt();
    if norms == 0.0 {
        return f64::NAN;
    }
    let cos = ((v1x * v2x + v1y * v2y) / norms).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}
