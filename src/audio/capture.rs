//! Microphone capture lifecycle.
//!
//! `AudioCaptureSession` owns the buffering contract: chunks go in as they
//! arrive, `finish()` concatenates them into one payload tagged with the
//! session's MIME type. `MicRecorder` is the device layer behind it: a CPAL
//! input stream running on a dedicated audio thread (CPAL streams are not
//! `Send`), converted to i16 and encoded as a WAV take with hound when the
//! recording stops.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use hound::{WavSpec, WavWriter};

use crate::audio::source::{AudioSource, CAPTURE_MIME_TYPE};
use crate::error::CaptureError;

/// Buffers captured audio chunks and finalizes them into one `AudioSource`.
///
/// Chunks are opaque byte runs in arrival order; the finished payload is
/// exactly their concatenation. Zero chunks yield an empty-but-valid payload.
pub struct AudioCaptureSession {
    mime_type: &'static str,
    chunks: Vec<Vec<u8>>,
    started: bool,
}

impl AudioCaptureSession {
    pub fn new(mime_type: &'static str) -> Self {
        Self {
            mime_type,
            chunks: Vec::new(),
            started: false,
        }
    }

    /// Mark the session as capturing. Any previously buffered chunks are
    /// discarded.
    pub fn begin(&mut self) {
        self.chunks.clear();
        self.started = true;
    }

    pub fn push_chunk(&mut self, chunk: Vec<u8>) {
        self.chunks.push(chunk);
    }

    /// Concatenate buffered chunks into a finished source.
    ///
    /// Calling this without a prior `begin()` is a programming error.
    pub fn finish(&mut self) -> Result<AudioSource, CaptureError> {
        if !self.started {
            return Err(CaptureError::InvalidState("finish() without begin()"));
        }
        self.started = false;

        let total: usize = self.chunks.iter().map(Vec::len).sum();
        let mut payload = Vec::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            payload.extend_from_slice(&chunk);
        }

        log::debug!("Capture finished: {} bytes ({})", payload.len(), self.mime_type);
        Ok(AudioSource::new(payload, self.mime_type))
    }
}

struct StreamParams {
    channels: u16,
    sample_rate: u32,
}

/// Handle to an active microphone capture.
///
/// The audio thread owns the CPAL stream; dropping the handle without calling
/// `stop()` closes the stop channel, which also tears the stream down, so the
/// device is released on every exit path.
pub struct MicHandle {
    stop_tx: Sender<()>,
    done_rx: Receiver<Result<AudioSource, CaptureError>>,
}

impl MicHandle {
    /// Stop capturing, encode the take, and return the finished source.
    pub fn stop(self) -> Result<AudioSource, CaptureError> {
        // A send failure means the thread already shut down; done_rx still
        // carries its result (or its disconnect).
        let _ = self.stop_tx.send(());
        self.done_rx
            .recv()
            .map_err(|_| CaptureError::DeviceUnavailable("capture thread exited".to_string()))?
    }
}

/// Microphone recorder over the default CPAL input device.
pub struct MicRecorder;

impl MicRecorder {
    /// Probe the default input device so obvious failures surface before any
    /// recording starts. The stream itself is opened per capture.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no input device found".to_string()))?;

        let config = device.default_input_config().map_err(|e| {
            CaptureError::DeviceUnavailable(format!("no supported input configuration: {}", e))
        })?;

        log::info!(
            "Audio input device: {:?} ({} Hz, {} ch, {:?})",
            device.name(),
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );
        Ok(Self)
    }

    /// Open the microphone and start buffering. Blocks briefly until the
    /// device grants or refuses the stream, then hands ownership to the audio
    /// thread.
    pub fn start(&self) -> Result<MicHandle, CaptureError> {
        let (ready_tx, ready_rx) = channel::<Result<(), CaptureError>>();
        let (stop_tx, stop_rx) = channel::<()>();
        let (done_tx, done_rx) = channel::<Result<AudioSource, CaptureError>>();

        std::thread::Builder::new()
            .name("speakcoach-mic".to_string())
            .spawn(move || run_capture_thread(ready_tx, stop_rx, done_tx))
            .map_err(|e| CaptureError::DeviceUnavailable(format!("capture thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(MicHandle { stop_tx, done_rx }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::DeviceUnavailable(
                "capture thread exited before the stream opened".to_string(),
            )),
        }
    }
}

fn run_capture_thread(
    ready_tx: Sender<Result<(), CaptureError>>,
    stop_rx: Receiver<()>,
    done_tx: Sender<Result<AudioSource, CaptureError>>,
) {
    let samples: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
    let capturing = Arc::new(AtomicBool::new(true));
    let stream_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let opened = open_stream(samples.clone(), capturing.clone(), stream_error.clone());
    let (stream, params) = match opened {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::PermissionDenied(format!(
            "failed to start input stream: {}",
            e
        ))));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Blocks until stop() is called or the handle is dropped.
    let _ = stop_rx.recv();
    capturing.store(false, Ordering::SeqCst);
    drop(stream);

    let result = match stream_error.lock().ok().and_then(|e| e.clone()) {
        Some(err) => Err(CaptureError::DeviceUnavailable(err)),
        None => {
            let taken = samples
                .lock()
                .map(|s| s.clone())
                .unwrap_or_default();
            finalize_take(&taken, params)
        }
    };
    let _ = done_tx.send(result);
}

/// Encode the captured samples as a WAV blob and run it through the session.
fn finalize_take(samples: &[i16], params: StreamParams) -> Result<AudioSource, CaptureError> {
    let spec = WavSpec {
        channels: params.channels,
        sample_rate: params.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("WAV encoding: {}", e)))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| CaptureError::DeviceUnavailable(format!("WAV encoding: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("WAV encoding: {}", e)))?;
    }

    let mut session = AudioCaptureSession::new(CAPTURE_MIME_TYPE);
    session.begin();
    session.push_chunk(cursor.into_inner());
    session.finish()
}

fn open_stream(
    samples: Arc<Mutex<Vec<i16>>>,
    capturing: Arc<AtomicBool>,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<(cpal::Stream, StreamParams), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceUnavailable("no input device found".to_string()))?;

    let supported = device.default_input_config().map_err(|e| {
        CaptureError::DeviceUnavailable(format!("no supported input configuration: {}", e))
    })?;

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let params = StreamParams {
        channels: config.channels,
        sample_rate: config.sample_rate.0,
    };

    let err_fn = move |err: cpal::StreamError| {
        log::error!("Audio stream error: {}", err);
        if let Ok(mut slot) = stream_error.lock() {
            slot.get_or_insert_with(|| err.to_string());
        }
    };

    let stream = match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(&device, &config, samples, capturing, err_fn),
        SampleFormat::U16 => build_stream_typed::<u16>(&device, &config, samples, capturing, err_fn),
        SampleFormat::F32 => build_stream_typed::<f32>(&device, &config, samples, capturing, err_fn),
        other => Err(CaptureError::DeviceUnavailable(format!(
            "unsupported sample format {:?}",
            other
        ))),
    }?;

    Ok((stream, params))
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    samples: Arc<Mutex<Vec<i16>>>,
    capturing: Arc<AtomicBool>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::Sample<Float = f32> + cpal::SizedSample + Send + 'static,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !capturing.load(Ordering::SeqCst) {
                    return;
                }
                if let Ok(mut buffer) = samples.lock() {
                    buffer.extend(data.iter().map(|&s| sample_to_i16(s)));
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                CaptureError::DeviceUnavailable("input device disappeared".to_string())
            }
            other => CaptureError::PermissionDenied(format!("failed to open input stream: {}", other)),
        })
}

fn sample_to_i16<T: cpal::Sample<Float = f32>>(sample: T) -> i16 {
    let as_f32: f32 = sample.to_float_sample();
    (as_f32.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_payload_is_chunk_concatenation_in_arrival_order() {
        let mut session = AudioCaptureSession::new(CAPTURE_MIME_TYPE);
        session.begin();
        session.push_chunk(vec![1, 2, 3]);
        session.push_chunk(vec![4]);
        session.push_chunk(vec![5, 6]);

        let source = session.finish().expect("started session finishes");
        assert_eq!(source.payload(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(source.mime_type(), CAPTURE_MIME_TYPE);
    }

    #[test]
    fn zero_chunk_capture_yields_empty_but_valid_source() {
        let mut session = AudioCaptureSession::new(CAPTURE_MIME_TYPE);
        session.begin();

        let source = session.finish().expect("empty capture is valid");
        assert!(source.is_empty());
        assert_eq!(source.mime_type(), CAPTURE_MIME_TYPE);
    }

    #[test]
    fn finish_without_begin_is_invalid_state() {
        let mut session = AudioCaptureSession::new(CAPTURE_MIME_TYPE);
        let err = session.finish().expect_err("must not finish unstarted session");
        assert!(matches!(err, CaptureError::InvalidState(_)));
    }

    #[test]
    fn begin_discards_chunks_from_a_previous_take() {
        let mut session = AudioCaptureSession::new(CAPTURE_MIME_TYPE);
        session.begin();
        session.push_chunk(vec![9, 9]);
        let _ = session.finish().expect("first take");

        session.begin();
        session.push_chunk(vec![1]);
        let source = session.finish().expect("second take");
        assert_eq!(source.payload(), &[1]);
    }

    #[test]
    fn sample_conversion_clamps_to_i16_range() {
        assert_eq!(sample_to_i16(0.0f32), 0);
        assert_eq!(sample_to_i16(1.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-1.0f32), -i16::MAX);
        assert_eq!(sample_to_i16(2.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-2.0f32), -i16::MAX);
    }

    #[test]
    fn wav_take_is_parseable_and_preserves_samples() {
        let samples: Vec<i16> = vec![0, 100, -100, i16::MAX, i16::MIN];
        let source = finalize_take(
            &samples,
            StreamParams {
                channels: 1,
                sample_rate: 16_000,
            },
        )
        .expect("encode");

        let mut reader =
            hound::WavReader::new(Cursor::new(source.payload().to_vec())).expect("valid WAV");
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.expect("sample")).collect();
        assert_eq!(decoded, samples);
    }
}
