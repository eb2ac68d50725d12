// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Confidence scoring: map the winning candidate's area ratio to a raw score
// and smooth it across cycles with an exponential moving average.

use ticketscan_core::config::ConfidenceBands;
use ticketscan_core::{DetectionResult, DetectorConfig};
use tracing::trace;

use crate::candidate::PolygonCandidate;

/// Raw per-cycle confidence for a candidate's area ratio (`None` when no
/// candidate survived).
pub fn raw_confidence(area_ratio: Option<f64>, bands: &ConfidenceBands) -> f64 {
    let Some(ratio) = area_ratio else {
        return 0.0;
    };
    if ratio >= bands.ideal_min && ratio <= bands.ideal_max {
        bands.ideal_score
    } else if ratio > bands.ideal_max && ratio <= bands.near_max {
        bands.near_score
    } else if ratio >= bands.far_min && ratio < bands.ideal_min {
        bands.far_score
    } else {
        bands.fallback_score
    }
}

/// The smoothing accumulator carried across cycles of one detection session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothingState {
    smoothed: f64,
}

impl SmoothingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f64 {
        self.smoothed
    }

    /// `smoothed = alpha * raw + (1 - alpha) * smoothed`.
    pub fn update(&mut self, raw: f64, alpha: f64) -> f64 {
        self.smoothed = (alpha * raw + (1.0 - alpha) * self.smoothed).clamp(0.0, 1.0);
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.smoothed = 0.0;
    }
}

/// Turns the cycle's winner into the published [`DetectionResult`].
pub struct ConfidenceScorer {
    bands: ConfidenceBands,
    alpha: f64,
}

impl ConfidenceScorer {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            bands: config.confidence,
            alpha: config.smoothing_alpha,
        }
    }

    pub fn score(
        &self,
        winner: Option<&PolygonCandidate>,
        state: &mut SmoothingState,
    ) -> DetectionResult {
        let raw = raw_confidence(winner.map(|w| w.area_ratio), &self.bands);
        let confidence = state.update(raw, self.alpha);
        trace!(raw, confidence, "confidence smoothed");
        DetectionResult {
            corners: winner.map(|w| w.corners),
            confidence,
        }
    }
}
