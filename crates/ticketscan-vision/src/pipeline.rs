// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Detection cycle orchestration: run preprocess → edges → contours →
// candidates → confidence as one fail-safe unit. Any failure, including a
// panic inside a library routine, degrades the cycle to an empty result
// tagged with the stage that failed; nothing propagates to the caller.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use ticketscan_core::error::{Result, ScanError};
use ticketscan_core::{DetectionResult, DetectorConfig, Frame, Stage};
use tracing::{debug, instrument, trace, warn};

use crate::buffers::BufferPool;
use crate::candidate::{CandidateEvaluator, CornerChain};
use crate::confidence::{ConfidenceScorer, SmoothingState};
use crate::edges::{detect_edges, extract_contours};
use crate::preprocess::{Preprocessor, working_size};

/// A cycle failure together with the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage}: {error}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub error: ScanError,
}

/// Attach a stage tag to a fallible step.
pub trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|error| StageError { stage, error })
    }
}

/// Diagnostics for one cycle, published next to the result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// What the cycle published.
    pub result: DetectionResult,
    /// Set when the cycle degraded.
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    /// Contours extracted from the edge map.
    pub contours: usize,
    /// Contours that passed every candidate gate.
    pub candidates: usize,
    /// Area ratio of the winning candidate.
    pub area_ratio: Option<f64>,
    pub elapsed_ms: f64,
}

impl CycleReport {
    pub fn is_degraded(&self) -> bool {
        self.failed_stage.is_some()
    }
}

struct CycleOutput {
    result: DetectionResult,
    contours: usize,
    candidates: usize,
    area_ratio: Option<f64>,
}

/// The per-frame detector. Holds no cross-cycle state of its own: the
/// smoothing accumulator is passed in by the owning session.
pub struct DocumentDetector {
    config: DetectorConfig,
    preprocessor: Preprocessor,
    evaluator: CandidateEvaluator,
    scorer: ConfidenceScorer,
    pool: BufferPool,
}

impl DocumentDetector {
    /// Build a detector after validating the configuration.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        Self::with_chain(config, CornerChain::default())
    }

    /// Build a detector with a custom corner-strategy chain.
    pub fn with_chain(config: DetectorConfig, chain: CornerChain) -> Result<Self> {
        config.validate()?;
        if chain.is_empty() {
            return Err(ScanError::Config("corner chain needs at least one strategy".into()));
        }
        let pool = BufferPool::new(config.working_buffers);
        debug!(
            strategies = chain.len(),
            working_buffers = pool.capacity(),
            "document detector ready"
        );
        Ok(Self {
            preprocessor: Preprocessor::new(&config),
            evaluator: CandidateEvaluator::with_chain(&config, chain),
            scorer: ConfidenceScorer::new(&config),
            pool,
            config,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Convenience wrapper returning only the published result.
    pub fn detect(&self, frame: &Frame, state: &mut SmoothingState) -> DetectionResult {
        self.run_cycle(frame, state).result
    }

    /// Run one full cycle. Never fails and never panics outward; a failed
    /// cycle yields `{ corners: None, confidence: 0 }` and leaves `state`
    /// untouched.
    #[instrument(skip_all, fields(width = frame.width(), height = frame.height()))]
    pub fn run_cycle(&self, frame: &Frame, state: &mut SmoothingState) -> CycleReport {
        let started = Instant::now();
        let stage = Cell::new(Stage::Idle);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.cycle(frame, state, &stage)));
        let failure = match outcome {
            Ok(Ok(output)) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1e3;
                debug!(
                    confidence = output.result.confidence,
                    detected = output.result.is_detected(),
                    area_ratio = output.area_ratio,
                    elapsed_ms,
                    "cycle complete"
                );
                return CycleReport {
                    result: output.result,
                    failed_stage: None,
                    error: None,
                    contours: output.contours,
                    candidates: output.candidates,
                    area_ratio: output.area_ratio,
                    elapsed_ms,
                };
            }
            Ok(Err(err)) => err,
            Err(payload) => {
                let at = stage.get();
                StageError {
                    stage: at,
                    error: ScanError::StagePanicked {
                        stage: at,
                        detail: crate::panic_message(payload.as_ref()),
                    },
                }
            }
        };

        warn!(stage = %failure.stage, error = %failure.error, "detection cycle degraded");
        CycleReport {
            result: DetectionResult::none(),
            failed_stage: Some(failure.stage),
            error: Some(failure.error.to_string()),
            contours: 0,
            candidates: 0,
            area_ratio: None,
            elapsed_ms: started.elapsed().as_secs_f64() * 1e3,
        }
    }

    fn cycle(
        &self,
        frame: &Frame,
        state: &mut SmoothingState,
        stage: &Cell<Stage>,
    ) -> std::result::Result<CycleOutput, StageError> {
        let enter = |next: Stage| {
            stage.set(next);
            trace!(stage = %next, "entering stage");
            next
        };
        let pool = &self.pool;

        let s = enter(Stage::Scale);
        let (width, height) =
            working_size(frame.width(), frame.height(), self.config.downscale_factor).at(s)?;

        let s = enter(Stage::Resize);
        let resized = self.preprocessor.downscale(frame, width, height).at(s)?;

        let s = enter(Stage::Grayscale);
        let gray = self.preprocessor.grayscale(&resized, pool).at(s)?;
        drop(resized);

        let s = enter(Stage::MorphOpen);
        let opened = self.preprocessor.open(&gray, pool).at(s)?;
        drop(gray);

        let s = enter(Stage::MorphClose);
        let closed = self.preprocessor.close(&opened, pool).at(s)?;
        drop(opened);

        let s = enter(Stage::Blur);
        let blurred = self.preprocessor.blur(&closed, pool).at(s)?;
        drop(closed);

        let s = enter(Stage::Canny);
        let edges = pool.adopt(detect_edges(&blurred, &self.config.canny)).at(s)?;
        drop(blurred);

        enter(Stage::FindContours);
        let contours = extract_contours(&edges);
        drop(edges);

        let s = enter(Stage::EvaluateCandidates);
        let evaluation = self.evaluator.evaluate(&contours, width, height).at(s)?;

        enter(Stage::Smooth);
        let result = self.scorer.score(evaluation.best.as_ref(), state);

        enter(Stage::Publish);
        Ok(CycleOutput {
            result,
            contours: evaluation.contours,
            candidates: evaluation.accepted,
            area_ratio: evaluation.best.map(|b| b.area_ratio),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::point::Point;
    use ticketscan_core::PixelFormat;

    use crate::candidate::{BoundingRectFallback, CornerStrategy};

    /// Dark RGBA frame with a bright axis-aligned sheet at `(x, y, w, h)`.
    fn sheet_frame(width: u32, height: u32, sheet: (u32, u32, u32, u32)) -> Frame {
        let (sx, sy, sw, sh) = sheet;
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let inside = x >= sx && x < sx + sw && y >= sy && y < sy + sh;
                let v = if inside { 235 } else { 25 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Frame::new(width, height, PixelFormat::Rgba8, data)
    }

    fn detector() -> DocumentDetector {
        DocumentDetector::new(DetectorConfig::default()).unwrap()
    }

    #[test]
    fn blank_frame_finds_nothing() {
        let det = detector();
        let mut state = SmoothingState::new();
        let frame = Frame::new(320, 240, PixelFormat::Luma8, vec![128u8; 320 * 240]);
        let report = det.run_cycle(&frame, &mut state);
        assert!(!report.is_degraded());
        assert_eq!(report.result, DetectionResult::none());
        assert_eq!(det.pool().in_flight(), 0);
    }

    #[test]
    fn sheet_is_detected_and_confidence_builds() {
        let det = detector();
        let mut state = SmoothingState::new();
        // 800x600 frame, 400x300 sheet: 25% of the frame.
        let frame = sheet_frame(800, 600, (200, 150, 400, 300));

        let first = det.run_cycle(&frame, &mut state);
        assert!(!first.is_degraded(), "{:?}", first.error);
        let corners = first.result.corners.expect("sheet corners");
        let expected = [(200.0, 150.0), (600.0, 150.0), (600.0, 450.0), (200.0, 450.0)];
        for (x, y) in expected {
            let nearest = corners
                .iter()
                .map(|c| ((c.x - x).powi(2) + (c.y - y).powi(2)).sqrt())
                .fold(f64::INFINITY, f64::min);
            assert!(nearest < 20.0, "no corner near ({x}, {y}): {corners:?}");
        }
        assert!((first.result.confidence - 0.3).abs() < 1e-9);

        let second = det.run_cycle(&frame, &mut state);
        assert!((second.result.confidence - 0.51).abs() < 1e-9);
        assert_eq!(det.pool().in_flight(), 0);
    }

    #[test]
    fn collapsed_frame_fails_at_scale() {
        let det = detector();
        let mut state = SmoothingState::new();
        state.update(0.9, 1.0);

        let frame = Frame::new(3, 3, PixelFormat::Luma8, vec![0u8; 9]);
        let report = det.run_cycle(&frame, &mut state);
        assert_eq!(report.failed_stage, Some(Stage::Scale));
        assert_eq!(report.result, DetectionResult::none());
        // The accumulator is left alone by a failed cycle.
        assert_eq!(state.value(), 0.9);
    }

    #[test]
    fn short_buffer_fails_at_resize() {
        let det = detector();
        let mut state = SmoothingState::new();
        let frame = Frame::new(64, 64, PixelFormat::Rgba8, vec![0u8; 100]);
        let report = det.run_cycle(&frame, &mut state);
        assert_eq!(report.failed_stage, Some(Stage::Resize));
        assert!(report.error.unwrap().contains("expected 16384"));
        assert_eq!(det.pool().in_flight(), 0);
    }

    #[test]
    fn exhausted_pool_fails_cycle_and_releases_buffers() {
        let config = DetectorConfig {
            working_buffers: 1,
            ..DetectorConfig::default()
        };
        let det = DocumentDetector::new(config).unwrap();
        let mut state = SmoothingState::new();
        let report = det.run_cycle(&sheet_frame(160, 120, (40, 30, 80, 60)), &mut state);
        assert_eq!(report.failed_stage, Some(Stage::MorphOpen));
        assert_eq!(det.pool().in_flight(), 0);
    }

    struct Panicking;

    impl CornerStrategy for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn polygon(&self, _: &[Point<i32>], _: f64) -> Result<Option<Vec<Point<i32>>>> {
            panic!("unexpected");
        }
    }

    #[test]
    fn failing_chain_degrades_at_candidate_stage() {
        let det = DocumentDetector::with_chain(
            DetectorConfig::default(),
            CornerChain::new(vec![Box::new(Panicking)]),
        )
        .unwrap();
        let mut state = SmoothingState::new();
        let report = det.run_cycle(&sheet_frame(800, 600, (200, 150, 400, 300)), &mut state);
        assert_eq!(report.failed_stage, Some(Stage::EvaluateCandidates));
        assert_eq!(report.result, DetectionResult::none());
        assert_eq!(det.pool().in_flight(), 0);
    }

    #[test]
    fn fallback_chain_still_detects_sheet() {
        let det = DocumentDetector::with_chain(
            DetectorConfig::default(),
            CornerChain::new(vec![Box::new(Panicking), Box::new(BoundingRectFallback)]),
        )
        .unwrap();
        let mut state = SmoothingState::new();
        let report = det.run_cycle(&sheet_frame(800, 600, (200, 150, 400, 300)), &mut state);
        assert!(!report.is_degraded());
        assert!(report.result.is_detected());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = DetectorConfig {
            downscale_factor: 0,
            ..DetectorConfig::default()
        };
        assert!(matches!(
            DocumentDetector::new(config),
            Err(ScanError::Config(_))
        ));
    }

    #[test]
    fn empty_chain_is_rejected() {
        let empty = CornerChain::new(Vec::new());
        assert!(matches!(
            DocumentDetector::with_chain(DetectorConfig::default(), empty),
            Err(ScanError::Config(_))
        ));
    }

    #[test]
    fn pool_is_sized_from_config() {
        let config = DetectorConfig {
            working_buffers: 6,
            ..DetectorConfig::default()
        };
        let det = DocumentDetector::new(config).unwrap();
        assert_eq!(det.pool().capacity(), 6);
        assert_eq!(det.pool().idle(), 0);
    }

    #[test]
    fn stage_error_display_names_stage() {
        let err: std::result::Result<(), _> =
            Err(ScanError::Approximation("x".into())).at(Stage::EvaluateCandidates);
        let msg = err.unwrap_err().to_string();
        assert!(msg.starts_with("evaluate-candidates:"), "{msg}");
    }
}
