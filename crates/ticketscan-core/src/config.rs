// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Detector configuration. Every constant the detection pipeline uses lives
// here so it can be re-tuned without touching the algorithms.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Canny hysteresis thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeThresholds {
    pub low: f32,
    pub high: f32,
}

impl Default for EdgeThresholds {
    fn default() -> Self {
        Self {
            low: 50.0,
            high: 120.0,
        }
    }
}

/// Size gates applied to each contour at working resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaBounds {
    /// Absolute floor in px² (working resolution).
    pub min_area: f64,
    /// Candidates covering less than this fraction of the frame are rejected.
    pub min_ratio: f64,
    /// Candidates covering more than this fraction of the frame are rejected.
    pub max_ratio: f64,
}

impl Default for AreaBounds {
    fn default() -> Self {
        Self {
            min_area: 800.0,
            min_ratio: 0.05,
            max_ratio: 0.6,
        }
    }
}

/// Tolerances of the rectangle-shape check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeTolerances {
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Largest allowed relative difference between opposite sides.
    pub max_side_asymmetry: f64,
    pub min_angle_deg: f64,
    pub max_angle_deg: f64,
}

impl Default for ShapeTolerances {
    fn default() -> Self {
        Self {
            min_aspect: 0.4,
            max_aspect: 2.5,
            max_side_asymmetry: 0.25,
            min_angle_deg: 50.0,
            max_angle_deg: 130.0,
        }
    }
}

/// Area-ratio bands mapped to a raw per-cycle confidence.
///
/// The cut points are empirically tuned defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceBands {
    /// Lower edge of the ideal band (inclusive).
    pub ideal_min: f64,
    /// Upper edge of the ideal band (inclusive).
    pub ideal_max: f64,
    /// Upper edge of the "slightly too close" band (inclusive).
    pub near_max: f64,
    /// Lower edge of the "slightly too far" band (inclusive).
    pub far_min: f64,
    pub ideal_score: f64,
    pub near_score: f64,
    pub far_score: f64,
    /// Score for any other accepted candidate.
    pub fallback_score: f64,
}

impl Default for ConfidenceBands {
    fn default() -> Self {
        Self {
            ideal_min: 0.15,
            ideal_max: 0.45,
            near_max: 0.5,
            far_min: 0.08,
            ideal_score: 1.0,
            near_score: 0.8,
            far_score: 0.6,
            fallback_score: 0.5,
        }
    }
}

/// Complete detector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Integer downscale applied before any processing.
    pub downscale_factor: u32,
    /// Pipeline invocations per second, independent of the camera rate.
    pub target_rate_hz: f64,
    pub canny: EdgeThresholds,
    /// Side of the elliptical structuring element used for open/close.
    pub morph_kernel_size: u32,
    /// Side of the Gaussian blur kernel.
    pub blur_kernel_size: u32,
    pub area: AreaBounds,
    /// Polygon approximation epsilon as a fraction of the contour perimeter.
    pub polygon_epsilon_fraction: f64,
    pub shape: ShapeTolerances,
    pub confidence: ConfidenceBands,
    /// EMA weight of the newest raw confidence.
    pub smoothing_alpha: f64,
    /// Smoothed confidence at which framing guidance reports "ready".
    pub capture_threshold: f64,
    /// Capacity of the working-buffer pool.
    pub working_buffers: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            downscale_factor: 4,
            target_rate_hz: 5.0,
            canny: EdgeThresholds::default(),
            morph_kernel_size: 5,
            blur_kernel_size: 7,
            area: AreaBounds::default(),
            polygon_epsilon_fraction: 0.10,
            shape: ShapeTolerances::default(),
            confidence: ConfidenceBands::default(),
            smoothing_alpha: 0.3,
            capture_threshold: 0.8,
            working_buffers: 4,
        }
    }
}

impl DetectorConfig {
    /// Parse a (possibly partial) JSON document over the defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Wall-clock spacing between two pipeline invocations. Saturates at
    /// `Duration::MAX` for rates `validate` would reject.
    pub fn target_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.target_rate_hz).unwrap_or(Duration::MAX)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(ScanError::Config(msg));

        if self.downscale_factor == 0 {
            return fail("downscale_factor must be at least 1".into());
        }
        if !(self.target_rate_hz.is_finite() && self.target_rate_hz > 0.0) {
            return fail(format!(
                "target_rate_hz must be positive, got {}",
                self.target_rate_hz
            ));
        }
        if Duration::try_from_secs_f64(1.0 / self.target_rate_hz).is_err() {
            return fail(format!(
                "target_rate_hz {} is too low to express as an interval",
                self.target_rate_hz
            ));
        }
        if !(self.canny.low >= 0.0 && self.canny.low < self.canny.high) {
            return fail(format!(
                "canny thresholds must satisfy 0 <= low < high, got {}/{}",
                self.canny.low, self.canny.high
            ));
        }
        for (name, size) in [
            ("morph_kernel_size", self.morph_kernel_size),
            ("blur_kernel_size", self.blur_kernel_size),
        ] {
            if size == 0 || size % 2 == 0 || size > 31 {
                return fail(format!("{name} must be odd and in 1..=31, got {size}"));
            }
        }
        let area = &self.area;
        if area.min_area < 0.0 || !(0.0..=1.0).contains(&area.min_ratio) {
            return fail("area bounds must be non-negative fractions".into());
        }
        if area.min_ratio > area.max_ratio || area.max_ratio > 1.0 {
            return fail(format!(
                "area ratio bounds inverted: min {} > max {}",
                area.min_ratio, area.max_ratio
            ));
        }
        if !(self.polygon_epsilon_fraction > 0.0 && self.polygon_epsilon_fraction < 1.0) {
            return fail(format!(
                "polygon_epsilon_fraction must be in (0, 1), got {}",
                self.polygon_epsilon_fraction
            ));
        }
        let shape = &self.shape;
        if shape.min_aspect <= 0.0 || shape.min_aspect > shape.max_aspect {
            return fail("aspect bounds must satisfy 0 < min <= max".into());
        }
        if shape.min_angle_deg < 0.0
            || shape.max_angle_deg > 180.0
            || shape.min_angle_deg > shape.max_angle_deg
        {
            return fail("angle bounds must satisfy 0 <= min <= max <= 180".into());
        }
        let bands = &self.confidence;
        for score in [
            bands.ideal_score,
            bands.near_score,
            bands.far_score,
            bands.fallback_score,
        ] {
            if !(0.0..=1.0).contains(&score) {
                return fail(format!("confidence scores must lie in [0, 1], got {score}"));
            }
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return fail(format!(
                "smoothing_alpha must be in (0, 1], got {}",
                self.smoothing_alpha
            ));
        }
        if self.working_buffers == 0 {
            return fail("working_buffers must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = DetectorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.downscale_factor, 4);
        assert_eq!(config.target_interval(), Duration::from_millis(200));
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = DetectorConfig::from_json_str(
            r#"{ "target_rate_hz": 10.0, "canny": { "high": 150.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.target_rate_hz, 10.0);
        assert_eq!(config.canny.high, 150.0);
        assert_eq!(config.canny.low, 50.0);
        assert_eq!(config.area, AreaBounds::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            r#"{ "downscale_factor": 0 }"#,
            r#"{ "target_rate_hz": 0.0 }"#,
            r#"{ "target_rate_hz": 1e-20 }"#,
            r#"{ "canny": { "low": 130.0, "high": 120.0 } }"#,
            r#"{ "blur_kernel_size": 6 }"#,
            r#"{ "area": { "min_ratio": 0.7 } }"#,
            r#"{ "smoothing_alpha": 1.5 }"#,
            r#"{ "working_buffers": 0 }"#,
        ];
        for json in cases {
            match DetectorConfig::from_json_str(json) {
                Err(ScanError::Config(_)) => {}
                other => panic!("{json}: expected Config error, got {other:?}"),
            }
        }
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "smoothing_alpha": 0.5 }}"#).unwrap();
        let config = DetectorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.smoothing_alpha, 0.5);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = DetectorConfig::from_json_file("/nonexistent/ticketscan.json").unwrap_err();
        assert!(matches!(err, ScanError::Io(_)));
    }

    #[test]
    fn pretty_json_round_trips() {
        let config = DetectorConfig::default();
        let json = config.to_json_pretty().unwrap();
        assert_eq!(DetectorConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn target_interval_never_panics() {
        let config = DetectorConfig::default();
        assert_eq!(config.target_interval(), Duration::from_millis(200));

        let tiny = DetectorConfig {
            target_rate_hz: 1e-20,
            ..DetectorConfig::default()
        };
        assert!(matches!(tiny.validate(), Err(ScanError::Config(_))));
        assert_eq!(tiny.target_interval(), Duration::MAX);
    }
}
