// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Ticketscan.

use thiserror::Error;

use crate::types::{PixelFormat, Stage};

/// Top-level error type for all Ticketscan operations.
#[derive(Debug, Error)]
pub enum ScanError {
    // -- Per-cycle detection errors --
    #[error(
        "working resolution {scaled_width}x{scaled_height} is empty \
         (frame {frame_width}x{frame_height}, downscale {factor})"
    )]
    Dimension {
        frame_width: u32,
        frame_height: u32,
        factor: u32,
        scaled_width: u32,
        scaled_height: u32,
    },

    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} {format:?}")]
    BufferFormat {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("polygon approximation failed: {0}")]
    Approximation(String),

    #[error("working buffer pool exhausted ({capacity} buffers in flight)")]
    BufferPoolExhausted { capacity: usize },

    #[error("stage {stage} panicked: {detail}")]
    StagePanicked { stage: Stage, detail: String },

    #[error("image processing failed: {0}")]
    Image(String),

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Session lifecycle --
    #[error("detection session is not running")]
    SessionClosed,
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanError>;
