// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Edge map and contour extraction.

use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::edges::canny;
use imageproc::point::Point;
use ticketscan_core::config::EdgeThresholds;
use tracing::debug;

/// A closed boundary curve at working resolution.
pub type Contour = Vec<Point<i32>>;

/// Binary Canny edge map. Thresholds are tuned for recall; later stages
/// filter the false edges out.
pub fn detect_edges(image: &GrayImage, thresholds: &EdgeThresholds) -> GrayImage {
    canny(image, thresholds.low, thresholds.high)
}

/// Every closed boundary in the edge map as a flat list. Containment is
/// dropped: outer and hole borders are treated alike.
pub fn extract_contours(edges: &GrayImage) -> Vec<Contour> {
    let contours: Vec<Contour> = find_contours::<i32>(edges)
        .into_iter()
        .map(|contour| contour.points)
        .filter(|points| !points.is_empty())
        .collect();
    debug!(count = contours.len(), "contours extracted");
    contours
}
