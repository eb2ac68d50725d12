// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Framing guidance: turn a detection result into a short instruction the
// overlay can show while the user lines up the ticket.

use serde::{Deserialize, Serialize};
use ticketscan_core::{DetectionResult, DetectorConfig, Quad};

/// What the user should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramingHint {
    /// No document outline in view.
    NoDocument,
    /// The ticket fills too little of the frame.
    MoveCloser,
    /// The ticket fills too much of the frame.
    MoveBack,
    /// Framing is right but confidence is still building.
    HoldSteady,
    /// Good enough to capture.
    Ready,
}

impl FramingHint {
    /// Assess a published result for a `frame_width` x `frame_height` frame.
    pub fn assess(
        result: &DetectionResult,
        frame_width: u32,
        frame_height: u32,
        config: &DetectorConfig,
    ) -> Self {
        let Some(corners) = result.corners else {
            return FramingHint::NoDocument;
        };
        let frame_area = frame_width as f64 * frame_height as f64;
        if frame_area <= 0.0 {
            return FramingHint::NoDocument;
        }

        let ratio = quad_area(&corners) / frame_area;
        let bands = &config.confidence;
        if ratio < bands.ideal_min {
            FramingHint::MoveCloser
        } else if ratio > bands.ideal_max {
            FramingHint::MoveBack
        } else if result.confidence >= config.capture_threshold {
            FramingHint::Ready
        } else {
            FramingHint::HoldSteady
        }
    }

    /// Plain-English overlay text.
    pub fn message(self) -> &'static str {
        match self {
            FramingHint::NoDocument => "Point the camera at your ticket.",
            FramingHint::MoveCloser => "Move a little closer to the ticket.",
            FramingHint::MoveBack => "Move back so the whole ticket fits.",
            FramingHint::HoldSteady => "Hold steady...",
            FramingHint::Ready => "Looks good. Take the photo.",
        }
    }

    pub fn is_ready(self) -> bool {
        self == FramingHint::Ready
    }
}

fn quad_area(corners: &Quad) -> f64 {
    let twice: f64 = (0..4)
        .map(|i| {
            let (a, b) = (corners[i], corners[(i + 1) % 4]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice.abs() / 2.0
}
