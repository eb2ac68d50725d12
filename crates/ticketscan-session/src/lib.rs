// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ticketscan-session: run the detector against a live frame stream.
//
// A `DetectionSession` throttles a 30-60 Hz camera feed down to the target
// detection rate, runs one cycle at a time off the caller's threads and
// publishes each result to a single-writer watch slot.

pub mod rate;
pub mod session;

pub use rate::RateLimiter;
pub use session::{DetectionSession, SessionStats};
