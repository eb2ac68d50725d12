// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Corner strategies: ordered ways of turning a contour into a polygon.
// The chain tries each strategy in turn; a strategy that errors or panics
// hands over to the next one.

use std::panic::{self, AssertUnwindSafe};

use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;
use ticketscan_core::error::{Result, ScanError};
use tracing::debug;

/// Produces a simplified polygon from a contour.
///
/// `Ok(None)` discards the contour; `Err` lets the next strategy try.
pub trait CornerStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn polygon(&self, contour: &[Point<i32>], epsilon: f64) -> Result<Option<Vec<Point<i32>>>>;
}

/// Douglas-Peucker simplification of the closed contour.
///
/// The curve is split at its first point and the point farthest from it, and
/// both open halves are simplified independently, so the result never repeats
/// a vertex.
pub struct DouglasPeucker;

impl CornerStrategy for DouglasPeucker {
    fn name(&self) -> &'static str {
        "douglas-peucker"
    }

    fn polygon(&self, contour: &[Point<i32>], epsilon: f64) -> Result<Option<Vec<Point<i32>>>> {
        if contour.len() < 3 {
            return Err(ScanError::Approximation(format!(
                "contour has {} points, need at least 3",
                contour.len()
            )));
        }
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(ScanError::Approximation(format!(
                "epsilon must be positive, got {epsilon}"
            )));
        }

        let origin = contour[0];
        let (split, _) = contour
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, p)| {
                let (dx, dy) = ((p.x - origin.x) as i64, (p.y - origin.y) as i64);
                (i, dx * dx + dy * dy)
            })
            .fold((0, 0), |best, cur| if cur.1 > best.1 { cur } else { best });
        if split == 0 {
            return Err(ScanError::Approximation(
                "contour collapses to a single point".into(),
            ));
        }

        let mut second_half = contour[split..].to_vec();
        second_half.push(origin);

        let mut polygon = approximate_polygon_dp(&contour[..=split], epsilon, false);
        let tail = approximate_polygon_dp(&second_half, epsilon, false);
        // `polygon` ends at the split point and `tail` starts there; `tail`
        // ends back at the origin.
        polygon.extend(tail.into_iter().skip(1));
        polygon.pop();
        Ok(Some(polygon))
    }
}

/// Axis-aligned bounding rectangle of a contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingRect {
    /// Extent of the points; an empty slice gives a zero-sized rectangle.
    pub fn of(points: &[Point<i32>]) -> Self {
        let Some(first) = points.first() else {
            return Self {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            };
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    /// `(x,y), (x+w,y), (x+w,y+h), (x,y+h)`.
    pub fn corners(&self) -> [Point<i32>; 4] {
        let (x, y, w, h) = (self.x, self.y, self.width, self.height);
        [
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ]
    }
}

/// Fallback: the contour's bounding rectangle. Degenerate extents discard
/// the contour.
pub struct BoundingRectFallback;

impl CornerStrategy for BoundingRectFallback {
    fn name(&self) -> &'static str {
        "bounding-rect"
    }

    fn polygon(&self, contour: &[Point<i32>], _epsilon: f64) -> Result<Option<Vec<Point<i32>>>> {
        let rect = BoundingRect::of(contour);
        if rect.width == 0 || rect.height == 0 {
            debug!(?rect, "bounding rect is degenerate; discarding contour");
            return Ok(None);
        }
        Ok(Some(rect.corners().to_vec()))
    }
}

/// Ordered list of strategies, each one independently failure-wrapped.
pub struct CornerChain {
    strategies: Vec<Box<dyn CornerStrategy>>,
}

impl Default for CornerChain {
    fn default() -> Self {
        Self::new(vec![Box::new(DouglasPeucker), Box::new(BoundingRectFallback)])
    }
}

impl CornerChain {
    pub fn new(strategies: Vec<Box<dyn CornerStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// First strategy that does not fail wins. Errors only when every
    /// strategy failed.
    pub fn approximate(
        &self,
        contour: &[Point<i32>],
        epsilon: f64,
    ) -> Result<Option<Vec<Point<i32>>>> {
        let mut last_failure = String::from("no strategies configured");
        for strategy in &self.strategies {
            let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
                strategy.polygon(contour, epsilon)
            }));
            match attempt {
                Ok(Ok(polygon)) => return Ok(polygon),
                Ok(Err(err)) => {
                    debug!(strategy = strategy.name(), error = %err, "corner strategy failed");
                    last_failure = format!("{}: {err}", strategy.name());
                }
                Err(payload) => {
                    let detail = crate::panic_message(payload.as_ref());
                    debug!(strategy = strategy.name(), %detail, "corner strategy panicked");
                    last_failure = format!("{} panicked: {detail}", strategy.name());
                }
            }
        }
        Err(ScanError::Approximation(format!(
            "every corner strategy failed (last: {last_failure})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dense pixel contour around the rectangle `(x0,y0)-(x1,y1)`, clockwise
    /// from the top-left corner.
    pub(crate) fn rect_contour(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<Point<i32>> {
        let mut pts = Vec::new();
        for x in x0..x1 {
            pts.push(Point::new(x, y0));
        }
        for y in y0..y1 {
            pts.push(Point::new(x1, y));
        }
        for x in (x0 + 1..=x1).rev() {
            pts.push(Point::new(x, y1));
        }
        for y in (y0 + 1..=y1).rev() {
            pts.push(Point::new(x0, y));
        }
        pts
    }

    struct Exploding;

    impl CornerStrategy for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn polygon(&self, _: &[Point<i32>], _: f64) -> Result<Option<Vec<Point<i32>>>> {
            panic!("approximation blew up");
        }
    }

    struct Refusing;

    impl CornerStrategy for Refusing {
        fn name(&self) -> &'static str {
            "refusing"
        }

        fn polygon(&self, _: &[Point<i32>], _: f64) -> Result<Option<Vec<Point<i32>>>> {
            Err(ScanError::Approximation("refused".into()))
        }
    }

    #[test]
    fn douglas_peucker_collapses_rectangle_to_four_corners() {
        let contour = rect_contour(10, 20, 110, 80);
        let epsilon = 0.1 * imageproc::geometry::arc_length(&contour, true);
        let polygon = DouglasPeucker.polygon(&contour, epsilon).unwrap().unwrap();
        assert_eq!(
            polygon,
            vec![
                Point::new(10, 20),
                Point::new(110, 20),
                Point::new(110, 80),
                Point::new(10, 80),
            ]
        );
    }

    #[test]
    fn douglas_peucker_rejects_bad_input() {
        let contour = rect_contour(0, 0, 10, 10);
        assert!(DouglasPeucker.polygon(&contour, 0.0).is_err());
        assert!(DouglasPeucker.polygon(&contour[..2], 1.0).is_err());
        let same = vec![Point::new(3, 3); 5];
        assert!(DouglasPeucker.polygon(&same, 1.0).is_err());
    }

    #[test]
    fn bounding_rect_corners() {
        let rect = BoundingRect {
            x: 10,
            y: 10,
            width: 100,
            height: 50,
        };
        assert_eq!(
            rect.corners(),
            [
                Point::new(10, 10),
                Point::new(110, 10),
                Point::new(110, 60),
                Point::new(10, 60),
            ]
        );
    }

    #[test]
    fn bounding_rect_of_points() {
        let rect = BoundingRect::of(&rect_contour(10, 10, 110, 60));
        assert_eq!(
            rect,
            BoundingRect {
                x: 10,
                y: 10,
                width: 100,
                height: 50
            }
        );
    }

    #[test]
    fn degenerate_fallback_discards() {
        let line: Vec<_> = (0..50).map(|x| Point::new(x, 7)).collect();
        assert_eq!(BoundingRectFallback.polygon(&line, 1.0).unwrap(), None);
    }

    #[test]
    fn panicking_strategy_falls_back_to_bounding_rect() {
        let chain = CornerChain::new(vec![Box::new(Exploding), Box::new(BoundingRectFallback)]);
        let polygon = chain
            .approximate(&rect_contour(10, 10, 110, 60), 5.0)
            .unwrap()
            .unwrap();
        assert_eq!(
            polygon,
            vec![
                Point::new(10, 10),
                Point::new(110, 10),
                Point::new(110, 60),
                Point::new(10, 60),
            ]
        );
    }

    #[test]
    fn zero_epsilon_falls_back_in_default_chain() {
        let chain = CornerChain::default();
        let polygon = chain
            .approximate(&rect_contour(10, 10, 110, 60), 0.0)
            .unwrap()
            .unwrap();
        assert_eq!(polygon[2], Point::new(110, 60));
    }

    #[test]
    fn all_strategies_failing_is_an_error() {
        let chain = CornerChain::new(vec![Box::new(Refusing), Box::new(Exploding)]);
        let err = chain
            .approximate(&rect_contour(0, 0, 10, 10), 1.0)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exploding panicked"), "{msg}");

        assert!(CornerChain::new(Vec::new())
            .approximate(&rect_contour(0, 0, 10, 10), 1.0)
            .is_err());
    }
}
