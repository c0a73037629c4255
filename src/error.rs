//! Error types for the recording-and-analysis workflow.
//!
//! Every failure here is recoverable by user action: capture errors drop the
//! session back to idle, analysis errors return it to ready-to-submit with
//! the audio intact. Nothing is retried automatically.

use std::time::Duration;
use thiserror::Error;

/// Failures of the microphone-capture lifecycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Microphone access was refused or the stream could not be opened.
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    /// No usable input device, or the device went away mid-capture.
    #[error("Audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Capture API misuse, e.g. finishing a session that was never started.
    #[error("Capture session misuse: {0}")]
    InvalidState(&'static str),
}

/// Failures of a single analyzer submission.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// No response from the analyzer (transport-level failure).
    #[error("Could not reach the analyzer: {0}")]
    NetworkFailure(String),

    /// The analyzer answered but reported or produced a processing failure.
    #[error("Analyzer failed: {0}")]
    ServerError(String),

    /// No response within the bounded interval.
    #[error("Analyzer timed out after {0:?}")]
    Timeout(Duration),
}

/// Umbrella type for everything surfaced to the user as a notice.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// Submit was requested with no current audio source.
    #[error("Nothing to analyze: record a speech or choose an audio file first")]
    NothingToAnalyze,
}
