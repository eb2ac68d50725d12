// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ticketscan: command-line front end.
//
// Entry point. Initialises logging, then either replays still images through
// a live detection session as if they came from a camera, runs a single
// detection cycle, or prints the detector configuration. Results go to
// stdout as JSON lines; logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use ticketscan_core::error::{Result, ScanError};
use ticketscan_core::human_errors::{Severity, humanize_error};
use ticketscan_core::{DetectorConfig, Frame, PixelFormat};
use ticketscan_session::{DetectionSession, SessionStats};
use ticketscan_vision::{CycleReport, DocumentDetector, FramingHint, SmoothingState};

#[derive(Parser)]
#[command(name = "ticketscan")]
#[command(about = "Live document-boundary detection for photographing paper tickets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed images to a detection session at camera speed and print each
    /// published result.
    Replay {
        /// Images to replay, in order.
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Simulated camera frame rate.
        #[arg(long, default_value = "30.0")]
        fps: f64,

        /// How many camera frames each image is shown for.
        #[arg(long, default_value = "30")]
        frames_per_image: u32,

        /// JSON detector configuration (missing fields use defaults).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run one detection cycle on an image.
    Detect {
        image: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective detector configuration.
    Config {
        /// Validate this file instead of printing the defaults.
        #[arg(long)]
        check: Option<PathBuf>,
    },
}

/// One stdout line per published cycle.
#[derive(Serialize)]
struct ReportLine<'a> {
    image: &'a str,
    hint: FramingHint,
    message: &'static str,
    #[serde(flatten)]
    report: &'a CycleReport,
}

#[derive(Serialize)]
struct SummaryLine {
    summary: SessionStats,
    drop_rate: f64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Replay {
            images,
            fps,
            frames_per_image,
            config,
        } => replay(&images, fps, frames_per_image, config.as_deref()).await,
        Commands::Detect { image, config } => detect(&image, config.as_deref()),
        Commands::Config { check } => show_config(check.as_deref()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let human = humanize_error(&e);
            error!(
                error = %e,
                severity = ?human.severity,
                retriable = human.retriable,
                "ticketscan failed"
            );
            eprintln!("{}", error_text(&e));
            ExitCode::FAILURE
        }
    }
}

/// What the user sees on stderr when a command fails.
fn error_text(err: &ScanError) -> String {
    let human = humanize_error(err);
    let mut text = format!("{}\n{}", human.message, human.suggestion);
    match human.severity {
        Severity::Transient if human.retriable => {
            text.push_str("\nRunning the command again may work.")
        }
        Severity::Permanent => text.push_str("\nRetrying with the same input will not help."),
        _ => {}
    }
    text
}

fn load_config(path: Option<&Path>) -> Result<DetectorConfig> {
    match path {
        Some(p) => {
            info!(path = %p.display(), "loading detector configuration");
            DetectorConfig::from_json_file(p)
        }
        None => Ok(DetectorConfig::default()),
    }
}

/// Decode an image file into an RGBA camera frame.
fn load_frame(path: &Path) -> Result<Frame> {
    let img = image::open(path)
        .map_err(|e| ScanError::Image(format!("{}: {e}", path.display())))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(width, height, PixelFormat::Rgba8, img.into_raw()))
}

/// Spacing of simulated camera frames.
fn frame_interval(fps: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(1.0 / fps) {
        Ok(interval) if fps > 0.0 && !interval.is_zero() => Ok(interval),
        _ => Err(ScanError::Config(format!(
            "--fps must be a usable positive rate, got {fps}"
        ))),
    }
}

fn print_line<T: Serialize>(line: &T) -> Result<()> {
    println!("{}", serde_json::to_string(line)?);
    Ok(())
}

fn report_line<'a>(
    image: &'a str,
    report: &'a CycleReport,
    frame: &Frame,
    config: &DetectorConfig,
) -> ReportLine<'a> {
    let hint = FramingHint::assess(&report.result, frame.width(), frame.height(), config);
    ReportLine {
        image,
        hint,
        message: hint.message(),
        report,
    }
}

async fn replay(
    images: &[PathBuf],
    fps: f64,
    frames_per_image: u32,
    config: Option<&Path>,
) -> Result<()> {
    let frame_interval = frame_interval(fps)?;
    let config = load_config(config)?;
    let frames = images
        .iter()
        .map(|p| Ok((p.display().to_string(), load_frame(p)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut session = DetectionSession::start(config.clone()).await?;
    let mut reports = session.subscribe_reports();
    let mut ticker = tokio::time::interval(frame_interval);

    for (name, frame) in &frames {
        info!(image = %name, width = frame.width(), height = frame.height(), "replaying image");
        let mut shown = 0;
        while shown < frames_per_image {
            tokio::select! {
                _ = ticker.tick() => {
                    session.submit_frame(frame.clone())?;
                    shown += 1;
                }
                changed = reports.changed() => {
                    if changed.is_err() {
                        return Err(ScanError::SessionClosed);
                    }
                    if let Some(report) = reports.borrow_and_update().clone() {
                        print_line(&report_line(name, &report, frame, &config))?;
                    }
                }
            }
        }
    }

    // Give the last frame one detection interval to publish.
    if let Ok(Ok(())) = tokio::time::timeout(config.target_interval(), reports.changed()).await {
        if let (Some(report), Some((name, frame))) =
            (reports.borrow_and_update().clone(), frames.last())
        {
            print_line(&report_line(name, &report, frame, &config))?;
        }
    }

    session.stop().await?;
    let stats = session.stats();
    print_line(&SummaryLine {
        summary: stats,
        drop_rate: stats.drop_rate(),
    })
}

fn detect(image: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let frame = load_frame(image)?;
    let detector = DocumentDetector::new(config)?;
    let report = detector.run_cycle(&frame, &mut SmoothingState::new());
    let name = image.display().to_string();
    print_line(&report_line(&name, &report, &frame, detector.config()))
}

fn show_config(check: Option<&Path>) -> Result<()> {
    let config = load_config(check)?;
    if check.is_some() {
        info!("configuration is valid");
    }
    println!("{}", config.to_json_pretty()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn replay_requires_images() {
        assert!(Cli::try_parse_from(["ticketscan", "replay"]).is_err());
    }

    #[test]
    fn replay_defaults() {
        let cli = Cli::try_parse_from(["ticketscan", "replay", "a.png", "b.png"]).unwrap();
        match cli.command {
            Commands::Replay {
                images,
                fps,
                frames_per_image,
                config,
            } => {
                assert_eq!(images.len(), 2);
                assert_eq!(fps, 30.0);
                assert_eq!(frames_per_image, 30);
                assert!(config.is_none());
            }
            _ => panic!("expected replay"),
        }
    }

    #[test]
    fn config_check_flag_parses() {
        let cli = Cli::try_parse_from(["ticketscan", "config", "--check", "cfg.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { check: Some(_) }));
    }

    #[test]
    fn load_frame_decodes_png_as_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticket.png");
        RgbImage::from_pixel(12, 8, Rgb([200, 10, 10])).save(&path).unwrap();

        let frame = load_frame(&path).unwrap();
        assert_eq!((frame.width(), frame.height()), (12, 8));
        assert_eq!(frame.format(), PixelFormat::Rgba8);
        assert_eq!(&frame.data()[..4], &[200, 10, 10, 255]);
    }

    #[test]
    fn missing_image_is_an_image_error() {
        let err = load_frame(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, ScanError::Image(_)));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "target_rate_hz": 10.0 }"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.target_rate_hz, 10.0);
        assert_eq!(config.downscale_factor, 4);
        assert_eq!(load_config(None).unwrap(), DetectorConfig::default());
    }

    #[test]
    fn frame_interval_rejects_unusable_rates() {
        assert_eq!(frame_interval(30.0).unwrap(), Duration::from_secs_f64(1.0 / 30.0));
        for fps in [0.0, -5.0, f64::NAN, f64::INFINITY, 1e-20] {
            assert!(
                matches!(frame_interval(fps), Err(ScanError::Config(_))),
                "fps {fps} accepted"
            );
        }
    }

    #[test]
    fn error_text_reflects_severity() {
        let transient = error_text(&ScanError::BufferPoolExhausted { capacity: 4 });
        assert!(transient.ends_with("Running the command again may work."), "{transient}");

        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let permanent = error_text(&ScanError::Serialization(err));
        assert!(permanent.ends_with("will not help."), "{permanent}");

        let action = error_text(&ScanError::SessionClosed);
        assert_eq!(action.lines().count(), 2);
    }

    #[test]
    fn report_line_carries_hint() {
        let frame = Frame::new(4, 4, PixelFormat::Luma8, vec![0u8; 16]);
        let config = DetectorConfig::default();
        let detector = DocumentDetector::new(config.clone()).unwrap();
        let report = detector.run_cycle(&frame, &mut SmoothingState::new());
        let line = report_line("blank", &report, &frame, &config);
        assert_eq!(line.hint, FramingHint::NoDocument);

        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["hint"], "no-document");
        assert_eq!(json["image"], "blank");
        assert!(json.get("confidence").is_none());
        assert!(json["result"]["corners"].is_null());
    }
}
