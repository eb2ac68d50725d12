// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for people photographing a ticket.
//
// Per-cycle failures never reach the user during live detection; these
// messages cover what can surface around it (bad settings, unreadable images,
// a session that was already closed).

use crate::error::ScanError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The next frame will probably do better; keep going.
    Transient,
    /// The user has to change something (settings file, camera, image).
    ActionRequired,
    /// Retrying the same input will not help.
    Permanent,
}

/// A plain-English error with a suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    /// Whether the caller may simply try again.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `ScanError` into something a non-technical user can act on.
pub fn humanize_error(err: &ScanError) -> HumanError {
    match err {
        ScanError::Dimension { .. } => HumanError {
            message: "The camera picture is too small to look for a ticket.".into(),
            suggestion: "Use a higher camera resolution, then try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::BufferFormat { .. } | ScanError::Image(_) => HumanError {
            message: "We couldn't read the camera picture.".into(),
            suggestion: "Close the camera and open it again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanError::Approximation(_) | ScanError::StagePanicked { .. } => HumanError {
            message: "We couldn't find the edges of the ticket in that picture.".into(),
            suggestion: "Lay the ticket flat on a dark surface and hold the phone steady.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanError::BufferPoolExhausted { .. } => HumanError {
            message: "The phone is busy.".into(),
            suggestion: "Wait a moment. Detection will pick up again on its own.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanError::Config(detail) => HumanError {
            message: "The scanner settings aren't valid.".into(),
            suggestion: format!(
                "Fix the settings file or delete it to use the defaults. ({detail})"
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => HumanError {
            message: "We couldn't find that file.".into(),
            suggestion: "Check the file name and try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::Io(e) => HumanError {
            message: "We couldn't open that file.".into(),
            suggestion: format!("Check that the file is readable. ({e})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanError::Serialization(e) => HumanError {
            message: "The settings file is damaged.".into(),
            suggestion: format!("Fix the JSON or delete the file to use the defaults. ({e})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanError::SessionClosed => HumanError {
            message: "The scanner has already stopped.".into(),
            suggestion: "Open the camera again to start scanning.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Stage;

    #[test]
    fn missed_edges_are_transient() {
        let err = ScanError::StagePanicked {
            stage: Stage::EvaluateCandidates,
            detail: "index out of bounds".into(),
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn missing_file_is_action_required() {
        let err = ScanError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.message.contains("find"));
    }

    #[test]
    fn bad_settings_mention_detail() {
        let human =
            humanize_error(&ScanError::Config("downscale_factor must be at least 1".into()));
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.suggestion.contains("downscale_factor"));
    }

    #[test]
    fn damaged_json_is_permanent() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let human = humanize_error(&ScanError::Serialization(err));
        assert_eq!(human.severity, Severity::Permanent);
        assert!(!human.retriable);
    }
}
