// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Live detection session: owns the detector, the smoothing accumulator and
// a background worker that samples the camera stream at the target rate.
//
// # Data flow
//
//   camera ──submit_frame──▶ latest-frame slot (watch, overwrite)
//                                 │
//                          worker task: rate gate, then one cycle on the
//                          blocking pool, never two at once
//                                 │
//   overlay / capture ◀──latest()── result slot (watch, single writer)
//
// Frames that arrive while a cycle runs, or before the next tick, are
// overwritten or dropped. Nothing queues.
//
// The watch slots are not strictly lock-free: tokio guards each value with an
// RwLock. Readers only hold it to copy a `DetectionResult` out and the worker
// only to swap one in, so neither side ever waits for more than that copy.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use ticketscan_core::error::{Result, ScanError};
use ticketscan_core::{DetectionResult, DetectorConfig, Frame};
use ticketscan_vision::{CycleReport, DocumentDetector, SmoothingState};

use crate::rate::RateLimiter;

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    cycles: AtomicU64,
    degraded: AtomicU64,
}

/// Point-in-time copy of a session's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_submitted: u64,
    /// Frames skipped by the rate gate or overwritten before a cycle could
    /// take them.
    pub frames_dropped: u64,
    pub cycles_run: u64,
    pub cycles_degraded: u64,
}

impl SessionStats {
    /// Fraction of submitted frames that never reached a cycle.
    pub fn drop_rate(&self) -> f64 {
        if self.frames_submitted == 0 {
            0.0
        } else {
            self.frames_dropped as f64 / self.frames_submitted as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A frame in the latest-value slot, numbered so the worker can tell how many
/// were overwritten in between.
#[derive(Clone)]
struct Submitted {
    seq: u64,
    frame: Frame,
}

/// A running detection session.
///
/// Readers call [`latest`](Self::latest) or [`subscribe`](Self::subscribe)
/// from any thread without blocking; only the worker writes.
pub struct DetectionSession {
    detector: Arc<DocumentDetector>,
    frames: watch::Sender<Option<Submitted>>,
    results: watch::Sender<DetectionResult>,
    reports: watch::Sender<Option<CycleReport>>,
    counters: Arc<Counters>,
    /// Notification handle used to stop the worker between cycles.
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
}

impl DetectionSession {
    /// Validate `config`, build the detector and spawn the worker task.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(config: DetectorConfig) -> Result<Self> {
        let detector = Arc::new(DocumentDetector::new(config)?);

        let (frames, frame_rx) = watch::channel(None);
        let (results, _) = watch::channel(DetectionResult::none());
        let (reports, _) = watch::channel(None);
        let counters = Arc::new(Counters::default());
        let shutdown_signal = Arc::new(Notify::new());

        let worker = Worker {
            detector: Arc::clone(&detector),
            frames: frame_rx,
            results: results.clone(),
            reports: reports.clone(),
            counters: Arc::clone(&counters),
            shutdown: Arc::clone(&shutdown_signal),
        };
        let handle = tokio::spawn(worker.run());

        info!(
            rate_hz = detector.config().target_rate_hz,
            downscale = detector.config().downscale_factor,
            "detection session started"
        );

        Ok(Self {
            detector,
            frames,
            results,
            reports,
            counters,
            shutdown_signal,
            task_handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    pub fn config(&self) -> &DetectorConfig {
        self.detector.config()
    }

    /// Offer a camera frame. Never blocks; replaces any frame the worker has
    /// not picked up yet.
    pub fn submit_frame(&self, frame: Frame) -> Result<()> {
        if !self.is_running() {
            return Err(ScanError::SessionClosed);
        }
        let seq = self.counters.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        self.frames.send_replace(Some(Submitted { seq, frame }));
        Ok(())
    }

    /// The most recently published result.
    pub fn latest(&self) -> DetectionResult {
        *self.results.borrow()
    }

    /// A receiver that is notified each time a cycle publishes.
    pub fn subscribe(&self) -> watch::Receiver<DetectionResult> {
        self.results.subscribe()
    }

    /// Diagnostics of the last completed cycle.
    pub fn last_report(&self) -> Option<CycleReport> {
        self.reports.borrow().clone()
    }

    pub fn subscribe_reports(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        let c = &self.counters;
        SessionStats {
            frames_submitted: c.submitted.load(Ordering::Relaxed),
            frames_dropped: c.dropped.load(Ordering::Relaxed),
            cycles_run: c.cycles.load(Ordering::Relaxed),
            cycles_degraded: c.degraded.load(Ordering::Relaxed),
        }
    }

    /// Tear the session down.
    ///
    /// Waits for an in-flight cycle to finish, then drops the smoothing
    /// accumulator, releases pooled buffers and republishes the empty result.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Ok(());
        };

        info!("stopping detection session");
        self.shutdown_signal.notify_one();
        let joined = handle.await;

        self.detector.pool().clear();
        self.frames.send_replace(None);
        self.results.send_replace(DetectionResult::none());

        if let Err(e) = joined {
            warn!(error = %e, "detection worker ended abnormally");
        }
        let stats = self.stats();
        info!(
            cycles = stats.cycles_run,
            degraded = stats.cycles_degraded,
            dropped = stats.frames_dropped,
            "detection session stopped"
        );
        Ok(())
    }
}

impl Drop for DetectionSession {
    fn drop(&mut self) {
        if self.task_handle.is_some() {
            self.shutdown_signal.notify_one();
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    detector: Arc<DocumentDetector>,
    frames: watch::Receiver<Option<Submitted>>,
    results: watch::Sender<DetectionResult>,
    reports: watch::Sender<Option<CycleReport>>,
    counters: Arc<Counters>,
    shutdown: Arc<Notify>,
}

impl Worker {
    async fn run(mut self) {
        let mut limiter = RateLimiter::new(self.detector.config().target_interval());
        debug!(interval = ?limiter.interval(), "detection worker running");
        // Lives exactly as long as the session's worker.
        let mut state = SmoothingState::new();
        let mut last_seq = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    debug!("detection worker received shutdown signal");
                    break;
                }

                changed = self.frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let Some(Submitted { seq, frame }) = self.frames.borrow_and_update().clone() else {
                continue;
            };
            // Anything between the last frame we saw and this one was
            // overwritten in the slot.
            let overwritten = seq.saturating_sub(last_seq + 1);
            last_seq = seq;
            if overwritten > 0 {
                self.counters.dropped.fetch_add(overwritten, Ordering::Relaxed);
            }

            if !limiter.try_acquire(Instant::now()) {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            state = self.cycle(frame, state).await;
        }
    }

    /// Run one cycle on the blocking pool and publish its outcome. Returns
    /// the smoothing state to carry into the next cycle.
    async fn cycle(&self, frame: Frame, state: SmoothingState) -> SmoothingState {
        let detector = Arc::clone(&self.detector);
        let joined = tokio::task::spawn_blocking(move || {
            let mut state = state;
            let report = detector.run_cycle(&frame, &mut state);
            (report, state)
        })
        .await;

        let (report, next) = match joined {
            Ok(done) => done,
            Err(e) => {
                // run_cycle contains its own panics; this covers the blocking
                // pool itself going away.
                warn!(error = %e, "detection cycle task failed");
                (failed_report(e.to_string()), state)
            }
        };

        self.counters.cycles.fetch_add(1, Ordering::Relaxed);
        if report.is_degraded() {
            self.counters.degraded.fetch_add(1, Ordering::Relaxed);
        }
        self.results.send_replace(report.result);
        self.reports.send_replace(Some(report));
        next
    }
}

fn failed_report(error: String) -> CycleReport {
    CycleReport {
        result: DetectionResult::none(),
        failed_stage: Some(ticketscan_core::Stage::Idle),
        error: Some(error),
        contours: 0,
        candidates: 0,
        area_ratio: None,
        elapsed_ms: 0.0,
    }
}
