//! Canonical in-memory audio representation.
//!
//! An `AudioSource` is the single currency the workflow trades in: one binary
//! payload, its MIME type, and an opaque playback handle the renderer can
//! hand to an audio element. Handles live in a process-wide registry and are
//! released when the source is dropped or superseded.

use std::collections::HashSet;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use uuid::Uuid;

/// MIME type for microphone captures. File uploads keep their own container
/// type; format validation is the analyzer's job.
pub const CAPTURE_MIME_TYPE: &str = "audio/wav";

/// Playback URLs currently backed by a live `AudioSource`.
static LIVE_PLAYBACK_URLS: Lazy<Mutex<HashSet<String>>> =
    Lazy::new(|| Mutex::new(HashSet::new()));

/// Whether a playback URL still refers to a live source.
pub fn is_playback_live(url: &str) -> bool {
    LIVE_PLAYBACK_URLS
        .lock()
        .map(|urls| urls.contains(url))
        .unwrap_or(false)
}

/// Opaque handle the renderer uses to replay a source.
///
/// Registered on creation, deregistered on drop, mirroring object-URL
/// create/revoke semantics.
#[derive(Debug)]
pub struct PlaybackHandle {
    url: String,
}

impl PlaybackHandle {
    fn register() -> Self {
        let url = format!("memory://audio/{}", Uuid::new_v4());
        if let Ok(mut urls) = LIVE_PLAYBACK_URLS.lock() {
            urls.insert(url.clone());
        }
        Self { url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        if let Ok(mut urls) = LIVE_PLAYBACK_URLS.lock() {
            urls.remove(&self.url);
        }
        log::debug!("Released playback handle {}", self.url);
    }
}

/// A user-selected audio file, as handed over by the renderer's file picker.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// One audio clip: payload bytes, MIME tag, and its playback handle.
pub struct AudioSource {
    payload: Vec<u8>,
    mime_type: String,
    playback: PlaybackHandle,
}

impl AudioSource {
    pub fn new(payload: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            payload,
            mime_type: mime_type.into(),
            playback: PlaybackHandle::register(),
        }
    }

    /// Build a source from a selected file without re-encoding. The MIME type
    /// is inferred from the file extension; nothing else is validated here.
    pub fn from_file(file: SelectedFile) -> Self {
        let mime = mime_for_file_name(&file.name);
        log::info!(
            "Audio source from file '{}' ({} bytes, {})",
            file.name,
            file.bytes.len(),
            mime
        );
        Self::new(file.bytes, mime)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn playback_url(&self) -> &str {
        self.playback.url()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl std::fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSource")
            .field("bytes", &self.payload.len())
            .field("mime_type", &self.mime_type)
            .field("playback_url", &self.playback.url())
            .finish()
    }
}

/// MIME type inferred from a file name's extension.
pub fn mime_for_file_name(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "webm" => "audio/webm",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}
