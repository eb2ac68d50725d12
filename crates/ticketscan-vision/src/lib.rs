// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ticketscan-vision: per-frame document boundary detection.
//
// A frame flows through preprocessing (downscale, grayscale, morphology,
// blur), Canny edge detection and contour extraction, then candidate
// evaluation and confidence smoothing. `pipeline::DocumentDetector` runs the
// whole sequence as one fail-safe cycle.

pub mod buffers;
pub mod candidate;
pub mod confidence;
pub mod edges;
pub mod guidance;
pub mod pipeline;
pub mod preprocess;

use std::any::Any;

pub use buffers::{BufferPool, WorkingBuffer};
pub use candidate::{CandidateEvaluator, CornerChain, CornerStrategy, PolygonCandidate};
pub use confidence::{ConfidenceScorer, SmoothingState};
pub use guidance::FramingHint;
pub use pipeline::{CycleReport, DocumentDetector, StageError};
pub use preprocess::Preprocessor;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
