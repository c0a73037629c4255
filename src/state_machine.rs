//! Workflow state machine for the record-analyze-review cycle.
//!
//! Single-writer pattern: all transitions go through `reduce()`, which maps
//! the current state and one event to the next state plus a list of effects.
//! The state is the only source of truth; illegal combinations (analyzing
//! while idle, results without a source) are unrepresentable.
//!
//! Capture attempts and submissions carry a UUID so completion events from a
//! superseded attempt are recognized as stale and dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::analysis::result::AnalysisResult;
use crate::audio::source::{AudioSource, SelectedFile};
use crate::error::{AnalysisError, CaptureError, WorkflowError};

/// Recordings are stopped automatically once they reach this length.
pub const MAX_RECORDING: Duration = Duration::from_secs(600);

/// The six phases of the workflow. Exactly one is active at any time.
#[derive(Debug, Clone)]
pub enum State {
    Idle,
    /// Microphone permission/open pending.
    RequestingMic {
        session_id: Uuid,
    },
    Recording {
        session_id: Uuid,
        started_at: Instant,
    },
    ReadyToSubmit {
        source: Arc<AudioSource>,
    },
    Analyzing {
        submission_id: Uuid,
        source: Arc<AudioSource>,
    },
    /// The source is retained for playback alongside the result.
    Results {
        result: AnalysisResult,
        source: Arc<AudioSource>,
    },
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Everything that can drive a transition: renderer intents plus completion
/// events from the capture session and the analyzer.
#[derive(Debug)]
pub enum Event {
    // Renderer intents
    StartRecording,
    StopRecording,
    ChooseFile { file: Option<SelectedFile> },
    Submit,
    Reset,
    /// Shut down the event loop.
    Exit,

    // Capture lifecycle
    MicReady { id: Uuid },
    MicFailed { id: Uuid, error: CaptureError },
    CaptureFinished { id: Uuid, source: Arc<AudioSource> },
    CaptureFailed { id: Uuid, error: CaptureError },
    /// One-second heartbeat while recording.
    RecordingTick { id: Uuid },

    // Analyzer
    AnalysisSucceeded { id: Uuid, result: AnalysisResult },
    AnalysisFailed { id: Uuid, error: AnalysisError },
}

/// Work the loop hands to the effect runner after a transition.
#[derive(Debug, Clone)]
pub enum Effect {
    StartCapture { id: Uuid },
    StopCapture { id: Uuid },
    SubmitForAnalysis { id: Uuid, source: Arc<AudioSource> },
    StartRecordingTick { id: Uuid },
    /// Surface a user-visible error without changing phase semantics.
    Notify { error: WorkflowError },
    /// Publish a fresh view snapshot.
    EmitView,
}

/// Reducer: `(state, event) -> (next_state, effects)`.
///
/// Rules: never mutate in place, drop events with stale IDs, emit `EmitView`
/// whenever the renderer-visible picture changed.
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    let current_id: Option<Uuid> = match state {
        Idle | ReadyToSubmit { .. } | Results { .. } => None,
        RequestingMic { session_id } | Recording { session_id, .. } => Some(*session_id),
        Analyzing { submission_id, .. } => Some(*submission_id),
    };
    let is_stale = |eid: Uuid| Some(eid) != current_id;

    match (state, event) {
        // -----------------
        // Starting a recording (allowed until results exist; replaces any
        // previously selected source)
        // -----------------
        (Idle, StartRecording) | (ReadyToSubmit { .. }, StartRecording) => {
            let id = Uuid::new_v4();
            (
                RequestingMic { session_id: id },
                vec![StartCapture { id }, EmitView],
            )
        }

        (RequestingMic { session_id }, MicReady { id }) if *session_id == id => (
            Recording {
                session_id: id,
                started_at: Instant::now(),
            },
            vec![StartRecordingTick { id }, EmitView],
        ),
        (RequestingMic { session_id }, MicFailed { id, error }) if *session_id == id => (
            Idle,
            vec![
                Notify {
                    error: error.into(),
                },
                EmitView,
            ],
        ),

        // -----------------
        // Recording
        // -----------------
        (Recording { session_id, .. }, StopRecording) => {
            (state.clone(), vec![StopCapture { id: *session_id }])
        }
        (Recording { session_id, .. }, CaptureFinished { id, source }) if *session_id == id => {
            (ReadyToSubmit { source }, vec![EmitView])
        }
        (Recording { session_id, .. }, CaptureFailed { id, error }) if *session_id == id => (
            Idle,
            vec![
                Notify {
                    error: error.into(),
                },
                EmitView,
            ],
        ),
        (
            Recording {
                session_id,
                started_at,
            },
            RecordingTick { id },
        ) if *session_id == id => {
            if started_at.elapsed() >= MAX_RECORDING {
                log::warn!(
                    "Recording {} reached the {}s limit, stopping automatically",
                    session_id,
                    MAX_RECORDING.as_secs()
                );
                (state.clone(), vec![StopCapture { id: *session_id }])
            } else {
                (state.clone(), vec![EmitView])
            }
        }

        // Stop before the microphone opened cancels the attempt. The capture
        // is torn down if it did open, and its late completions are stale.
        (RequestingMic { session_id }, StopRecording) => (
            Idle,
            vec![StopCapture { id: *session_id }, EmitView],
        ),

        // Stop requested in any other phase is capture misuse.
        (_, StopRecording) => (
            state.clone(),
            vec![
                Notify {
                    error: CaptureError::InvalidState("stop requested with no active recording")
                        .into(),
                },
                EmitView,
            ],
        ),

        // -----------------
        // File selection (no file chosen is a no-op, not an error)
        // -----------------
        (Idle, ChooseFile { file }) | (ReadyToSubmit { .. }, ChooseFile { file }) => match file {
            Some(file) => (
                ReadyToSubmit {
                    source: Arc::new(AudioSource::from_file(file)),
                },
                vec![EmitView],
            ),
            None => (state.clone(), vec![]),
        },

        // -----------------
        // Submission
        // -----------------
        (ReadyToSubmit { source }, Submit) => {
            let id = Uuid::new_v4();
            (
                Analyzing {
                    submission_id: id,
                    source: source.clone(),
                },
                vec![
                    SubmitForAnalysis {
                        id,
                        source: source.clone(),
                    },
                    EmitView,
                ],
            )
        }
        (Idle, Submit) => (
            Idle,
            vec![
                Notify {
                    error: WorkflowError::NothingToAnalyze,
                },
                EmitView,
            ],
        ),

        (
            Analyzing {
                submission_id,
                source,
            },
            AnalysisSucceeded { id, result },
        ) if *submission_id == id => (
            Results {
                result,
                source: source.clone(),
            },
            vec![EmitView],
        ),
        // Failures fall back to ready-to-submit with the source intact so the
        // user can retry without re-recording.
        (
            Analyzing {
                submission_id,
                source,
            },
            AnalysisFailed { id, error },
        ) if *submission_id == id => (
            ReadyToSubmit {
                source: source.clone(),
            },
            vec![
                Notify {
                    error: error.into(),
                },
                EmitView,
            ],
        ),

        // -----------------
        // Reset ("Analyze Another Speech")
        // -----------------
        (Results { .. }, Reset) | (ReadyToSubmit { .. }, Reset) => (Idle, vec![EmitView]),

        // -----------------
        // Stale completions (drop silently)
        // -----------------
        (_, MicReady { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, MicFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureFinished { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, RecordingTick { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, AnalysisSucceeded { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, AnalysisFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),

        // -----------------
        // Everything else: no transition (covers re-entrant Submit while
        // Analyzing, intents out of phase, Exit handled at the loop edge)
        // -----------------
        _ => (state.clone(), vec![]),
    }
}
