//! Effect execution for the workflow loop.
//!
//! The state machine stays pure; everything that touches a device or the
//! network lands here. `DeviceEffectRunner` drives the real microphone and
//! the HTTP analyzer. `SimulatedEffectRunner` scripts both, standing in for
//! the fixed-delay demo backend and for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::analysis::client::AnalyzerClient;
use crate::analysis::result::AnalysisResult;
use crate::audio::capture::{AudioCaptureSession, MicHandle, MicRecorder};
use crate::audio::source::CAPTURE_MIME_TYPE;
use crate::error::{AnalysisError, CaptureError};
use crate::state_machine::{Effect, Event};

/// Runs effects asynchronously; completion events come back on the channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

/// Real effect runner: CPAL microphone capture plus the HTTP analyzer.
pub struct DeviceEffectRunner {
    active: Arc<Mutex<HashMap<Uuid, MicHandle>>>,
    analyzer: Arc<AnalyzerClient>,
}

impl DeviceEffectRunner {
    pub fn new(analyzer: AnalyzerClient) -> Arc<Self> {
        Arc::new(Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            analyzer: Arc::new(analyzer),
        })
    }
}

impl EffectRunner for DeviceEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartCapture { id } => {
                let active = self.active.clone();
                // Device probing and stream setup block; keep them off the
                // async workers.
                tokio::task::spawn_blocking(move || {
                    let started = MicRecorder::new().and_then(|recorder| recorder.start());
                    match started {
                        Ok(handle) => {
                            log::info!("Capture started: {}", id);
                            active.lock().unwrap().insert(id, handle);
                            let _ = tx.blocking_send(Event::MicReady { id });
                        }
                        Err(error) => {
                            log::error!("Failed to start capture {}: {}", id, error);
                            let _ = tx.blocking_send(Event::MicFailed { id, error });
                        }
                    }
                });
            }

            Effect::StopCapture { id } => {
                let active = self.active.clone();
                tokio::task::spawn_blocking(move || {
                    let handle = active.lock().unwrap().remove(&id);
                    let Some(handle) = handle else {
                        // Duplicate stop (double intent or tick auto-stop
                        // racing a manual stop); the first one wins.
                        log::debug!("StopCapture: no active capture for {}", id);
                        return;
                    };

                    match handle.stop() {
                        Ok(source) => {
                            log::info!("Capture stopped: {} ({} bytes)", id, source.len());
                            let _ = tx.blocking_send(Event::CaptureFinished {
                                id,
                                source: Arc::new(source),
                            });
                        }
                        Err(error) => {
                            log::error!("Failed to stop capture {}: {}", id, error);
                            let _ = tx.blocking_send(Event::CaptureFailed { id, error });
                        }
                    }
                });
            }

            Effect::SubmitForAnalysis { id, source } => {
                let analyzer = self.analyzer.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    match analyzer.submit(&source).await {
                        Ok(result) => {
                            log::info!(
                                "Analysis {} succeeded in {:?} ({} series)",
                                id,
                                started.elapsed(),
                                result.series().len()
                            );
                            let _ = tx.send(Event::AnalysisSucceeded { id, result }).await;
                        }
                        Err(error) => {
                            log::error!("Analysis {} failed: {}", id, error);
                            let _ = tx.send(Event::AnalysisFailed { id, error }).await;
                        }
                    }
                });
            }

            Effect::StartRecordingTick { id } => {
                let active = self.active.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(Duration::from_secs(1));
                    interval.tick().await; // first tick fires immediately
                    loop {
                        interval.tick().await;
                        let live = active.lock().unwrap().contains_key(&id);
                        if !live {
                            log::debug!("Tick loop ending, capture {} no longer active", id);
                            break;
                        }
                        if tx.send(Event::RecordingTick { id }).await.is_err() {
                            break;
                        }
                    }
                });
            }

            Effect::Notify { .. } | Effect::EmitView => {
                unreachable!("Notify/EmitView are handled in run_state_loop")
            }
        }
    }
}

/// Script for the simulated microphone and analyzer.
#[derive(Debug, Clone)]
pub struct SimulationScript {
    /// Outcome of opening the microphone.
    pub mic: Result<(), CaptureError>,
    /// Chunks the capture delivers, in arrival order.
    pub chunks: Vec<Vec<u8>>,
    /// Outcome of the analyzer round trip.
    pub analysis: Result<AnalysisResult, AnalysisError>,
    /// Simulated server-side processing time.
    pub analyzer_delay: Duration,
}

impl Default for SimulationScript {
    fn default() -> Self {
        Self {
            mic: Ok(()),
            chunks: vec![b"demo-speech".to_vec()],
            analysis: Ok(sample_coach_result()),
            analyzer_delay: Duration::from_millis(10),
        }
    }
}

impl SimulationScript {
    /// The interactive demo script: same canned response, but with the
    /// two-second "processing" pause of the original demo backend.
    pub fn demo() -> Self {
        Self {
            analyzer_delay: Duration::from_secs(2),
            ..Self::default()
        }
    }
}

/// The canned coaching response the simulated analyzer answers with.
pub fn sample_coach_result() -> AnalysisResult {
    AnalysisResult::from_value(&json!({
        "feedback": "Excellent start! Your volume and clarity are great. Your pace is a little fast, \
                     around 170 WPM. Try to take a breath after key points.\n\nYour pitch is generally \
                     confident but wavers slightly in the middle, which could indicate a moment of \
                     uncertainty. Your overall volume is good and consistent, ensuring the audience \
                     can hear you clearly.",
        "wpm_data": [
            { "time": "0-10s", "wpm": 150 }, { "time": "10-20s", "wpm": 175 },
            { "time": "20-30s", "wpm": 168 }, { "time": "30-40s", "wpm": 155 }
        ],
        "pitch_data": [
            { "time": "0-10s", "confidence": 0.90 }, { "time": "10-20s", "confidence": 0.88 },
            { "time": "20-30s", "confidence": 0.75 }, { "time": "30-40s", "confidence": 0.92 }
        ],
        "volume_data": [
            { "time": "0-10s", "db": -12 }, { "time": "10-20s", "db": -11 },
            { "time": "20-30s", "db": -14 }, { "time": "30-40s", "db": -12 }
        ]
    }))
    .expect("canned analyzer response is well-formed")
}

/// Scripted effect runner: no device, no network.
pub struct SimulatedEffectRunner {
    script: SimulationScript,
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl SimulatedEffectRunner {
    pub fn new(script: SimulationScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            active: Arc::new(Mutex::new(HashSet::new())),
        })
    }
}

impl EffectRunner for SimulatedEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartCapture { id } => {
                let mic = self.script.mic.clone();
                let active = self.active.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    match mic {
                        Ok(()) => {
                            active.lock().unwrap().insert(id);
                            let _ = tx.send(Event::MicReady { id }).await;
                        }
                        Err(error) => {
                            let _ = tx.send(Event::MicFailed { id, error }).await;
                        }
                    }
                });
            }

            Effect::StopCapture { id } => {
                let chunks = self.script.chunks.clone();
                let active = self.active.clone();
                tokio::spawn(async move {
                    if !active.lock().unwrap().remove(&id) {
                        log::debug!("StopCapture: no active capture for {}", id);
                        return;
                    }

                    let mut session = AudioCaptureSession::new(CAPTURE_MIME_TYPE);
                    session.begin();
                    for chunk in chunks {
                        session.push_chunk(chunk);
                    }
                    match session.finish() {
                        Ok(source) => {
                            let _ = tx
                                .send(Event::CaptureFinished {
                                    id,
                                    source: Arc::new(source),
                                })
                                .await;
                        }
                        Err(error) => {
                            let _ = tx.send(Event::CaptureFailed { id, error }).await;
                        }
                    }
                });
            }

            Effect::SubmitForAnalysis { id, .. } => {
                let analysis = self.script.analysis.clone();
                let delay = self.script.analyzer_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    match analysis {
                        Ok(result) => {
                            let _ = tx.send(Event::AnalysisSucceeded { id, result }).await;
                        }
                        Err(error) => {
                            let _ = tx.send(Event::AnalysisFailed { id, error }).await;
                        }
                    }
                });
            }

            Effect::StartRecordingTick { id } => {
                let active = self.active.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(Duration::from_secs(1));
                    interval.tick().await;
                    loop {
                        interval.tick().await;
                        if !active.lock().unwrap().contains(&id) {
                            break;
                        }
                        if tx.send(Event::RecordingTick { id }).await.is_err() {
                            break;
                        }
                    }
                });
            }

            Effect::Notify { .. } | Effect::EmitView => {
                unreachable!("Notify/EmitView are handled in run_state_loop")
            }
        }
    }
}
