// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Ticketscan: camera frames, detected corners, the
// published detection result and the per-cycle stage tags.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Pixel layout of a camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit single channel.
    Luma8,
    /// 8-bit interleaved R, G, B.
    Rgb8,
    /// 8-bit interleaved R, G, B, A.
    Rgba8,
    /// 8-bit interleaved B, G, R, A (the native layout of most mobile
    /// camera previews).
    Bgra8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Luma8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }
}

/// One image from the camera stream.
///
/// Frames are read-only and externally owned: the pixel data sits behind an
/// `Arc` so the capture side can hand the same buffer to the preview and to
/// the detector without copying.
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Arc<[u8]>,
}

impl Frame {
    /// Wrap a pixel buffer. The length is not checked here; a mismatched
    /// buffer fails the detection cycle that consumes it.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            format,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes a tightly packed buffer of this size and format holds.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.channels()
    }

    /// Check that the buffer length matches the declared geometry.
    pub fn check_layout(&self) -> Result<()> {
        let expected = self.expected_len();
        if self.data.len() != expected {
            return Err(ScanError::BufferFormat {
                width: self.width,
                height: self.height,
                format: self.format,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// A 2D point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn scaled(self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

/// Four document corners, in the order produced by the detector
/// (top-left, top-right, bottom-right, bottom-left when extremal selection
/// ran; contour order otherwise).
pub type Quad = [Point; 4];

/// The only value visible outside the detection core.
///
/// Overwritten once per cycle and read by the overlay renderer, the capture
/// trigger and the post-capture perspective-correction stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    /// The winning quadrilateral in original-frame coordinates.
    pub corners: Option<Quad>,
    /// Temporally smoothed confidence in `[0, 1]`.
    pub confidence: f64,
}

impl DetectionResult {
    /// The degraded result published when nothing was found or a cycle failed.
    pub const fn none() -> Self {
        Self {
            corners: None,
            confidence: 0.0,
        }
    }

    pub fn is_detected(&self) -> bool {
        self.corners.is_some()
    }
}

/// Step of a detection cycle. Used as the diagnostic tag when a cycle fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Idle,
    Scale,
    Resize,
    Grayscale,
    MorphOpen,
    MorphClose,
    Blur,
    Canny,
    FindContours,
    EvaluateCandidates,
    Smooth,
    Publish,
}

impl Stage {
    /// Per-cycle progression, in order.
    pub const CYCLE: [Stage; 12] = [
        Stage::Idle,
        Stage::Scale,
        Stage::Resize,
        Stage::Grayscale,
        Stage::MorphOpen,
        Stage::MorphClose,
        Stage::Blur,
        Stage::Canny,
        Stage::FindContours,
        Stage::EvaluateCandidates,
        Stage::Smooth,
        Stage::Publish,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Scale => "scale",
            Stage::Resize => "resize",
            Stage::Grayscale => "grayscale",
            Stage::MorphOpen => "morph-open",
            Stage::MorphClose => "morph-close",
            Stage::Blur => "blur",
            Stage::Canny => "canny",
            Stage::FindContours => "find-contours",
            Stage::EvaluateCandidates => "evaluate-candidates",
            Stage::Smooth => "smooth",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
