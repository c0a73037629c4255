//! Audio capture and the canonical audio source representation.
//!
//! Capture uses CPAL for microphone input and hound for WAV encoding; file
//! uploads bypass both and keep their original container.

pub mod capture;
pub mod source;

pub use capture::{AudioCaptureSession, MicHandle, MicRecorder};
pub use source::{is_playback_live, AudioSource, SelectedFile, CAPTURE_MIME_TYPE};
