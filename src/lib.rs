pub mod analysis;
pub mod audio;
pub mod config;
pub mod effects;
pub mod error;
pub mod state_machine;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::analysis::result::MetricPoint;
use crate::audio::source::SelectedFile;
use crate::effects::EffectRunner;
use crate::state_machine::{reduce, Effect, Event, State};

/// Renderer-facing snapshot of the workflow, published as a tagged union:
/// `{ "status": "idle" }`, `{ "status": "recording", "elapsedSecs": 5 }`, etc.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ViewPhase {
    Idle,
    RequestingMic,
    Recording {
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: u64,
    },
    ReadyToSubmit {
        #[serde(rename = "playbackUrl")]
        playback_url: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(rename = "sizeBytes")]
        size_bytes: usize,
    },
    Analyzing,
    Results {
        feedback: String,
        series: BTreeMap<String, Vec<MetricPoint>>,
        #[serde(rename = "playbackUrl")]
        playback_url: String,
    },
}

/// Phase plus an optional transient notice (error surfaced to the user).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ViewState {
    #[serde(flatten)]
    pub phase: ViewPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

fn state_to_view(state: &State) -> ViewPhase {
    match state {
        State::Idle => ViewPhase::Idle,
        State::RequestingMic { .. } => ViewPhase::RequestingMic,
        State::Recording { started_at, .. } => ViewPhase::Recording {
            elapsed_secs: started_at.elapsed().as_secs(),
        },
        State::ReadyToSubmit { source } => ViewPhase::ReadyToSubmit {
            playback_url: source.playback_url().to_string(),
            mime_type: source.mime_type().to_string(),
            size_bytes: source.len(),
        },
        State::Analyzing { .. } => ViewPhase::Analyzing,
        State::Results { result, source } => ViewPhase::Results {
            feedback: result.feedback().to_string(),
            series: result.series().clone(),
            playback_url: source.playback_url().to_string(),
        },
    }
}

/// Handle for driving the workflow: intent senders plus the live view.
#[derive(Clone)]
pub struct WorkflowHandle {
    tx: mpsc::Sender<Event>,
    view: watch::Receiver<ViewState>,
}

impl WorkflowHandle {
    pub async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.tx.send(event).await
    }

    pub async fn start_recording(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(Event::StartRecording).await
    }

    pub async fn stop_recording(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(Event::StopRecording).await
    }

    pub async fn choose_file(
        &self,
        file: Option<SelectedFile>,
    ) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(Event::ChooseFile { file }).await
    }

    pub async fn submit(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(Event::Submit).await
    }

    pub async fn reset(&self) -> Result<(), mpsc::error::SendError<Event>> {
        self.send(Event::Reset).await
    }

    /// Watch endpoint for the published view snapshots.
    pub fn view(&self) -> watch::Receiver<ViewState> {
        self.view.clone()
    }
}

/// Spawn the workflow loop on the current runtime and return its handle.
pub fn spawn_workflow(runner: Arc<dyn EffectRunner>) -> WorkflowHandle {
    let (tx, rx) = mpsc::channel::<Event>(32);
    let (view_tx, view_rx) = watch::channel(ViewState {
        phase: ViewPhase::Idle,
        notice: None,
    });

    let loop_tx = tx.clone();
    tokio::spawn(async move {
        run_state_loop(rx, loop_tx, runner, view_tx).await;
    });

    WorkflowHandle { tx, view: view_rx }
}

async fn run_state_loop(
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
    view_tx: watch::Sender<ViewState>,
) {
    let mut state = State::default();
    let mut notice: Option<String> = None;

    log::info!("Workflow loop started");

    while let Some(event) = rx.recv().await {
        log::debug!("Received event: {:?}", event);

        // Exit is handled at the edge, not in the reducer.
        if matches!(event, Event::Exit) {
            log::info!("Exit requested, shutting down workflow loop");
            break;
        }

        let old_discriminant = std::mem::discriminant(&state);
        let (next, effects) = reduce(&state, event);
        let new_discriminant = std::mem::discriminant(&next);

        if old_discriminant != new_discriminant {
            log::info!("State transition: {:?} -> {:?}", state, next);
            // A phase change supersedes whatever notice was showing.
            notice = None;
        }

        state = next;

        let mut publish = false;
        for eff in effects {
            match eff {
                Effect::Notify { error } => {
                    log::warn!("Notify: {}", error);
                    notice = Some(error.to_string());
                }
                Effect::EmitView => publish = true,
                other => effect_runner.spawn(other, tx.clone()),
            }
        }

        if publish {
            let snapshot = ViewState {
                phase: state_to_view(&state),
                notice: notice.clone(),
            };
            if view_tx.send(snapshot).is_err() {
                log::debug!("All view receivers dropped");
            }
        }
    }

    log::info!("Workflow loop ended");
}
