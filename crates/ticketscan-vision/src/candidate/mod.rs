// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Candidate evaluation: filter contours down to the single largest
// quadrilateral that looks like a photographed sheet of paper.

pub mod shape;
pub mod strategy;

use imageproc::geometry::arc_length;
use imageproc::point::Point as PixelPoint;
use serde::Serialize;
use ticketscan_core::config::{AreaBounds, ShapeTolerances};
use ticketscan_core::error::Result;
use ticketscan_core::{DetectorConfig, Point, Quad};
use tracing::{debug, instrument, trace};

pub use shape::{ShapeMetrics, validate_rectangular_shape};
pub use strategy::{
    BoundingRect, BoundingRectFallback, CornerChain, CornerStrategy, DouglasPeucker,
};

use crate::edges::Contour;

/// A quadrilateral derived from one contour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolygonCandidate {
    /// Corners in original-frame coordinates.
    pub corners: Quad,
    /// Contour area at working resolution (px²).
    pub area: f64,
    /// `area` over the working-resolution frame area.
    pub area_ratio: f64,
}

/// Outcome of evaluating one cycle's contours.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub best: Option<PolygonCandidate>,
    /// Contours examined.
    pub contours: usize,
    /// Contours that passed every gate.
    pub accepted: usize,
}

/// Filters and approximates contours into quadrilateral candidates and keeps
/// the largest valid one.
pub struct CandidateEvaluator {
    area: AreaBounds,
    epsilon_fraction: f64,
    shape: ShapeTolerances,
    upscale: f64,
    chain: CornerChain,
}

impl CandidateEvaluator {
    pub fn new(config: &DetectorConfig) -> Self {
        Self::with_chain(config, CornerChain::default())
    }

    pub fn with_chain(config: &DetectorConfig, chain: CornerChain) -> Self {
        Self {
            area: config.area,
            epsilon_fraction: config.polygon_epsilon_fraction,
            shape: config.shape,
            upscale: config.downscale_factor.max(1) as f64,
            chain,
        }
    }

    /// Run every gate over `contours` found in a `scaled_width` x
    /// `scaled_height` working image.
    ///
    /// Fails only if the corner chain fails outright for some contour.
    #[instrument(skip(self, contours), fields(contours = contours.len()))]
    pub fn evaluate(
        &self,
        contours: &[Contour],
        scaled_width: u32,
        scaled_height: u32,
    ) -> Result<Evaluation> {
        let frame_area = scaled_width as f64 * scaled_height as f64;
        let mut evaluation = Evaluation {
            contours: contours.len(),
            ..Evaluation::default()
        };

        for contour in contours {
            // Cheap reject before anything costly.
            let area = polygon_area(contour);
            if area <= self.area.min_area {
                continue;
            }

            let perimeter = arc_length(contour, true);
            let Some(polygon) = self
                .chain
                .approximate(contour, self.epsilon_fraction * perimeter)?
            else {
                continue;
            };

            let Some(corners) = resolve_corners(&polygon) else {
                trace!(vertices = polygon.len(), "too few vertices");
                continue;
            };

            let area_ratio = area / frame_area;
            if !within_area_bounds(area, frame_area, &self.area) {
                trace!(area, area_ratio, "outside area bounds");
                continue;
            }
            if !is_convex(&corners) {
                trace!(area, "not convex");
                continue;
            }
            if !validate_rectangular_shape(&corners, &self.shape) {
                trace!(area, "not rectangular");
                continue;
            }

            evaluation.accepted += 1;
            let better = evaluation.best.is_none_or(|best| area > best.area);
            if better {
                evaluation.best = Some(PolygonCandidate {
                    corners: corners.map(|p| p.scaled(self.upscale)),
                    area,
                    area_ratio,
                });
            }
        }

        debug!(
            accepted = evaluation.accepted,
            best_area = evaluation.best.map(|b| b.area),
            "candidates evaluated"
        );
        Ok(evaluation)
    }
}

/// `area / frame_area >= min_ratio` and `area <= max_ratio * frame_area`.
pub fn within_area_bounds(area: f64, frame_area: f64, bounds: &AreaBounds) -> bool {
    let too_small = area / frame_area < bounds.min_ratio;
    let too_large = area > bounds.max_ratio * frame_area;
    !(too_small || too_large)
}

/// Shoelace area of a closed pixel contour.
pub fn polygon_area(points: &[PixelPoint<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: i64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum();
    twice.abs() as f64 / 2.0
}

/// Reduce a polygon to exactly four corners.
///
/// Four vertices are used as-is; more are reduced by extremal selection;
/// fewer cannot form a quadrilateral.
pub fn resolve_corners(polygon: &[PixelPoint<i32>]) -> Option<Quad> {
    let points: Vec<Point> = polygon
        .iter()
        .map(|p| Point::new(p.x as f64, p.y as f64))
        .collect();
    match points.len() {
        4 => Some([points[0], points[1], points[2], points[3]]),
        n if n > 4 => Some(extremal_corners(&points)),
        _ => None,
    }
}

/// Top-left = min(x+y), top-right = max(x-y), bottom-right = max(x+y),
/// bottom-left = min(x-y). Ties keep the earliest point.
pub fn extremal_corners(points: &[Point]) -> Quad {
    fn sum(p: &Point) -> f64 {
        p.x + p.y
    }
    fn diff(p: &Point) -> f64 {
        p.x - p.y
    }
    let pick = |key: fn(&Point) -> f64, want_max: bool| {
        let mut best = points[0];
        let mut best_key = key(&best);
        for p in &points[1..] {
            let k = key(p);
            if (want_max && k > best_key) || (!want_max && k < best_key) {
                best = *p;
                best_key = k;
            }
        }
        best
    };
    [
        pick(sum, false),
        pick(diff, true),
        pick(sum, true),
        pick(diff, false),
    ]
}

/// Strict convexity: every turn has the same non-zero orientation.
pub fn is_convex(corners: &Quad) -> bool {
    let mut sign = 0.0f64;
    for i in 0..4 {
        let (a, b, c) = (corners[i], corners[(i + 1) % 4], corners[(i + 2) % 4]);
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross == 0.0 || (sign != 0.0 && cross.signum() != sign) {
            return false;
        }
        sign = cross.signum();
    }
    true
}
