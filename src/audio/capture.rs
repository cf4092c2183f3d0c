//! Microphone capture using cpal
//!
//! The cpal stream lives on a dedicated capture thread, which keeps the
//! source `Send` on every platform. Callback buffers are downmixed to mono
//! and forwarded over a bounded channel; when the consumer falls behind,
//! chunks are dropped rather than blocking the audio callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::source::{downmix_to_mono, AudioSource};
use super::vad::MediaAccessError;

/// How long `open()` waits for the capture thread to report readiness
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Microphone input backed by the default (or a named) cpal device
pub struct MicrophoneCapture {
    device_name: Option<String>,
    stop_signal: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    sample_rate: Option<u32>,
}

impl MicrophoneCapture {
    /// Capture from the system default input device
    pub fn new() -> Self {
        Self::with_device(None)
    }

    /// Capture from the input device whose name matches, or the default
    pub fn with_device(device_name: Option<String>) -> Self {
        Self {
            device_name,
            stop_signal: Arc::new(AtomicBool::new(false)),
            thread: None,
            sample_rate: None,
        }
    }

    /// Device sample rate, known once the stream is open
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }
}

impl Default for MicrophoneCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(deprecated)] // cpal 0.17 deprecates name() but description() is not yet stable
fn find_device(name: Option<&str>) -> Result<cpal::Device, MediaAccessError> {
    let host = cpal::default_host();
    if let Some(wanted) = name {
        if let Ok(mut devices) = host.input_devices() {
            if let Some(device) = devices.find(|d| d.name().map(|n| n == wanted).unwrap_or(false)) {
                return Ok(device);
            }
        }
        tracing::warn!("Input device '{}' not found, falling back to default", wanted);
    }
    host.default_input_device().ok_or(MediaAccessError::NoDevice)
}

fn classify_build_error(err: cpal::BuildStreamError) -> MediaAccessError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => MediaAccessError::NoDevice,
        other => {
            let message = other.to_string();
            if message.to_lowercase().contains("permission") {
                MediaAccessError::PermissionDenied(message)
            } else {
                MediaAccessError::StreamFailed(message)
            }
        }
    }
}

fn open_stream(
    device_name: Option<&str>,
    frame_tx: crossbeam_channel::Sender<Vec<f32>>,
) -> Result<(cpal::Stream, u32), MediaAccessError> {
    let device = find_device(device_name)?;
    let supported = device
        .default_input_config()
        .map_err(|e| MediaAccessError::StreamFailed(e.to_string()))?;
    // cpal 0.17 returns u32 directly, not a tuple
    let sample_rate = supported.sample_rate();
    let channels = supported.channels() as usize;

    tracing::info!(
        "Opening microphone: {}Hz, {} channels, format={:?}",
        sample_rate,
        channels,
        supported.sample_format()
    );

    let stream = device
        .build_input_stream(
            &supported.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = downmix_to_mono(data, channels);
                if frame_tx.try_send(mono).is_err() {
                    tracing::trace!("Audio consumer behind, dropping chunk");
                }
            },
            |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(classify_build_error)?;
    stream
        .play()
        .map_err(|e| MediaAccessError::StreamFailed(e.to_string()))?;
    Ok((stream, sample_rate))
}

impl AudioSource for MicrophoneCapture {
    fn open(&mut self) -> Result<Receiver<Vec<f32>>, MediaAccessError> {
        if self.thread.is_some() {
            return Err(MediaAccessError::StreamFailed(
                "capture already running".to_string(),
            ));
        }

        self.stop_signal.store(false, Ordering::SeqCst);
        let (frame_tx, frame_rx) = bounded::<Vec<f32>>(64);
        let (ready_tx, ready_rx) = bounded::<Result<u32, MediaAccessError>>(1);
        let stop_signal = self.stop_signal.clone();
        let device_name = self.device_name.clone();

        let handle = std::thread::spawn(move || {
            let opened = open_stream(device_name.as_deref(), frame_tx);

            match opened {
                Ok((stream, sample_rate)) => {
                    let _ = ready_tx.send(Ok(sample_rate));
                    while !stop_signal.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_millis(20));
                    }
                    drop(stream);
                    tracing::debug!("Capture thread finished");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(sample_rate)) => {
                self.sample_rate = Some(sample_rate);
                self.thread = Some(handle);
                tracing::info!("Microphone capture started");
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                self.stop_signal.store(true, Ordering::SeqCst);
                Err(MediaAccessError::StreamFailed(
                    "timed out opening input stream".to_string(),
                ))
            }
        }
    }

    fn close(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("Capture thread panicked");
            }
            tracing::info!("Microphone capture stopped");
        }
        self.sample_rate = None;
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.close();
    }
}
