//! End-to-end workflow tests over the simulated effect runner.
//!
//! These drive the spawned loop through renderer intents and observe only the
//! published view snapshots, the way a real frontend would.

use std::io::Write;
use std::time::Duration;

use tokio::sync::watch;

use speakcoach::audio::source::is_playback_live;
use speakcoach::effects::{SimulatedEffectRunner, SimulationScript};
use speakcoach::error::AnalysisError;
use speakcoach::{spawn_workflow, ViewPhase, ViewState, WorkflowHandle};

/// Poll the view until `pred` matches or the deadline passes.
async fn wait_for<F>(view: &mut watch::Receiver<ViewState>, what: &str, pred: F) -> ViewState
where
    F: Fn(&ViewState) -> bool,
{
    let deadline = Duration::from_secs(5);
    let result = tokio::time::timeout(deadline, async {
        loop {
            {
                let current = view.borrow_and_update();
                if pred(&current) {
                    return current.clone();
                }
            }
            if view.changed().await.is_err() {
                panic!("view channel closed while waiting for {}", what);
            }
        }
    })
    .await;

    match result {
        Ok(snapshot) => snapshot,
        Err(_) => panic!(
            "timed out waiting for {}; last view: {:?}",
            what,
            view.borrow().clone()
        ),
    }
}

fn spawn_with(script: SimulationScript) -> (WorkflowHandle, watch::Receiver<ViewState>) {
    let handle = spawn_workflow(SimulatedEffectRunner::new(script));
    let view = handle.view();
    (handle, view)
}

#[tokio::test]
async fn record_submit_review_reset_round_trip() {
    let (handle, mut view) = spawn_with(SimulationScript::default());

    handle.start_recording().await.unwrap();
    wait_for(&mut view, "recording", |v| {
        matches!(v.phase, ViewPhase::Recording { .. })
    })
    .await;

    handle.stop_recording().await.unwrap();
    let ready = wait_for(&mut view, "ready to submit", |v| {
        matches!(v.phase, ViewPhase::ReadyToSubmit { .. })
    })
    .await;
    let playback_url = match &ready.phase {
        ViewPhase::ReadyToSubmit {
            playback_url,
            mime_type,
            size_bytes,
        } => {
            assert_eq!(mime_type, "audio/wav");
            assert_eq!(*size_bytes, b"demo-speech".len());
            playback_url.clone()
        }
        other => panic!("expected ReadyToSubmit, got {:?}", other),
    };
    assert!(is_playback_live(&playback_url));

    handle.submit().await.unwrap();
    let results = wait_for(&mut view, "results", |v| {
        matches!(v.phase, ViewPhase::Results { .. })
    })
    .await;
    match &results.phase {
        ViewPhase::Results {
            feedback,
            series,
            playback_url: results_url,
        } => {
            assert!(feedback.contains("170 WPM"));
            assert_eq!(series.len(), 3);
            assert!(series.contains_key("wpm_data"));
            assert!(series.contains_key("pitch_data"));
            assert!(series.contains_key("volume_data"));
            // The clip survives into review for replay.
            assert_eq!(results_url, &playback_url);
        }
        other => panic!("expected Results, got {:?}", other),
    }

    handle.reset().await.unwrap();
    wait_for(&mut view, "idle after reset", |v| {
        matches!(v.phase, ViewPhase::Idle)
    })
    .await;
    assert!(!is_playback_live(&playback_url));
}

#[tokio::test]
async fn analysis_failure_returns_to_ready_with_the_clip_intact() {
    let (handle, mut view) = spawn_with(SimulationScript {
        analysis: Err(AnalysisError::ServerError(
            "status 500: processing failed".to_string(),
        )),
        ..SimulationScript::default()
    });

    handle.start_recording().await.unwrap();
    wait_for(&mut view, "recording", |v| {
        matches!(v.phase, ViewPhase::Recording { .. })
    })
    .await;
    handle.stop_recording().await.unwrap();
    let ready = wait_for(&mut view, "ready to submit", |v| {
        matches!(v.phase, ViewPhase::ReadyToSubmit { .. })
    })
    .await;
    let original_url = match &ready.phase {
        ViewPhase::ReadyToSubmit { playback_url, .. } => playback_url.clone(),
        other => panic!("expected ReadyToSubmit, got {:?}", other),
    };

    handle.submit().await.unwrap();
    let fallback = wait_for(&mut view, "fallback after failure", |v| {
        matches!(v.phase, ViewPhase::ReadyToSubmit { .. }) && v.notice.is_some()
    })
    .await;

    match &fallback.phase {
        ViewPhase::ReadyToSubmit { playback_url, .. } => {
            // Same clip, ready for a retry without re-recording.
            assert_eq!(playback_url, &original_url);
            assert!(is_playback_live(playback_url));
        }
        other => panic!("expected ReadyToSubmit, got {:?}", other),
    }
    assert!(fallback.notice.unwrap().contains("processing failed"));
}

#[tokio::test]
async fn analyzer_timeout_returns_to_ready_for_a_retry() {
    let (handle, mut view) = spawn_with(SimulationScript {
        analysis: Err(AnalysisError::Timeout(Duration::from_secs(60))),
        ..SimulationScript::default()
    });

    handle.start_recording().await.unwrap();
    wait_for(&mut view, "recording", |v| {
        matches!(v.phase, ViewPhase::Recording { .. })
    })
    .await;
    handle.stop_recording().await.unwrap();
    let ready = wait_for(&mut view, "ready to submit", |v| {
        matches!(v.phase, ViewPhase::ReadyToSubmit { .. })
    })
    .await;
    let original_url = match &ready.phase {
        ViewPhase::ReadyToSubmit { playback_url, .. } => playback_url.clone(),
        other => panic!("expected ReadyToSubmit, got {:?}", other),
    };

    handle.submit().await.unwrap();
    let fallback = wait_for(&mut view, "fallback after timeout", |v| {
        matches!(v.phase, ViewPhase::ReadyToSubmit { .. }) && v.notice.is_some()
    })
    .await;

    match &fallback.phase {
        ViewPhase::ReadyToSubmit { playback_url, .. } => {
            assert_eq!(playback_url, &original_url);
            assert!(is_playback_live(playback_url));
        }
        other => panic!("expected ReadyToSubmit, got {:?}", other),
    }
    assert!(fallback.notice.unwrap().contains("timed out"));
}

#[tokio::test]
async fn mic_denial_lands_back_in_idle_with_a_notice() {
    let (handle, mut view) = spawn_with(SimulationScript {
        mic: Err(speakcoach::error::CaptureError::PermissionDenied(
            "access denied".to_string(),
        )),
        ..SimulationScript::default()
    });

    handle.start_recording().await.unwrap();
    let denied = wait_for(&mut view, "idle with notice", |v| {
        matches!(v.phase, ViewPhase::Idle) && v.notice.is_some()
    })
    .await;
    assert!(denied.notice.unwrap().contains("access denied"));
}

#[tokio::test]
async fn submit_with_nothing_selected_is_rejected_in_place() {
    let (handle, mut view) = spawn_with(SimulationScript::default());

    handle.submit().await.unwrap();
    let rejected = wait_for(&mut view, "rejection notice", |v| v.notice.is_some()).await;
    assert!(matches!(rejected.phase, ViewPhase::Idle));
    assert!(rejected.notice.unwrap().contains("Nothing to analyze"));
}

#[tokio::test]
async fn stop_without_an_active_recording_is_rejected_in_place() {
    let (handle, mut view) = spawn_with(SimulationScript::default());

    handle.stop_recording().await.unwrap();
    let rejected = wait_for(&mut view, "rejection notice", |v| v.notice.is_some()).await;
    assert!(matches!(rejected.phase, ViewPhase::Idle));
}

#[tokio::test]
async fn uploaded_file_goes_straight_to_ready_and_submits() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("keynote.mp3");
    let mut file = std::fs::File::create(&path).expect("create file");
    file.write_all(b"not-really-mpeg-frames").expect("write");

    let bytes = std::fs::read(&path).expect("read back");
    let (handle, mut view) = spawn_with(SimulationScript::default());

    handle
        .choose_file(Some(speakcoach::audio::source::SelectedFile {
            name: "keynote.mp3".to_string(),
            bytes,
        }))
        .await
        .unwrap();

    let ready = wait_for(&mut view, "ready to submit", |v| {
        matches!(v.phase, ViewPhase::ReadyToSubmit { .. })
    })
    .await;
    match &ready.phase {
        ViewPhase::ReadyToSubmit {
            mime_type,
            size_bytes,
            ..
        } => {
            assert_eq!(mime_type, "audio/mpeg");
            assert_eq!(*size_bytes, b"not-really-mpeg-frames".len());
        }
        other => panic!("expected ReadyToSubmit, got {:?}", other),
    }

    handle.submit().await.unwrap();
    wait_for(&mut view, "results", |v| {
        matches!(v.phase, ViewPhase::Results { .. })
    })
    .await;
}

#[tokio::test]
async fn new_recording_replaces_a_previously_selected_file() {
    let (handle, mut view) = spawn_with(SimulationScript::default());

    handle
        .choose_file(Some(speakcoach::audio::source::SelectedFile {
            name: "draft.wav".to_string(),
            bytes: vec![1, 2, 3],
        }))
        .await
        .unwrap();
    let ready = wait_for(&mut view, "ready with file", |v| {
        matches!(v.phase, ViewPhase::ReadyToSubmit { .. })
    })
    .await;
    let file_url = match &ready.phase {
        ViewPhase::ReadyToSubmit { playback_url, .. } => playback_url.clone(),
        other => panic!("expected ReadyToSubmit, got {:?}", other),
    };

    handle.start_recording().await.unwrap();
    wait_for(&mut view, "recording", |v| {
        matches!(v.phase, ViewPhase::Recording { .. })
    })
    .await;
    // The discarded file's playback handle is released once superseded.
    assert!(!is_playback_live(&file_url));

    handle.stop_recording().await.unwrap();
    let ready = wait_for(&mut view, "ready with recording", |v| {
        matches!(v.phase, ViewPhase::ReadyToSubmit { .. })
    })
    .await;
    match &ready.phase {
        ViewPhase::ReadyToSubmit {
            playback_url,
            size_bytes,
            ..
        } => {
            assert_ne!(playback_url, &file_url);
            assert_eq!(*size_bytes, b"demo-speech".len());
        }
        other => panic!("expected ReadyToSubmit, got {:?}", other),
    }
}
