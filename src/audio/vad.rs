//! Voice Activity Detection (VAD) for speech boundary detection
//!
//! Turns a live audio stream into debounced speech start / speech end events.
//! Each analysis frame is reduced to a 0-100 volume by the spectral analyser,
//! pushed into a short history and averaged. Speech starts only after the
//! smoothed volume has stayed above `energy_threshold` for
//! `speech_start_delay_ms`, and ends only after it has stayed below
//! `silence_threshold` for `silence_duration_ms`. Segments shorter than
//! `min_speech_duration_ms` are dropped as noise without a `SpeechEnd`.
//!
//! The detector has no thread of its own: the host calls [`VoiceActivityDetector::poll`]
//! from its loop, which drains captured frames and evaluates the debounce
//! deadline against the injected clock.

use crossbeam_channel::{Receiver, TryRecvError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::analyser::{volume_from_energy, SpectralAnalyser};
use super::source::AudioSource;
use crate::clock::SharedClock;
use crate::events::{ListenerId, Listeners};

/// Configuration for Voice Activity Detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Smoothed volume (0-100) above which a frame counts as speech
    ///
    /// Default: 25
    pub energy_threshold: f32,

    /// Smoothed volume (0-100) below which a frame counts as silence
    ///
    /// Volumes between the two thresholds neither start speech nor
    /// accumulate silence. Default: 15
    pub silence_threshold: f32,

    /// Sustained silence that ends a speech segment, in milliseconds
    ///
    /// Default: 1500
    pub silence_duration_ms: u64,

    /// Sustained energy required before speech is declared, in milliseconds
    ///
    /// Default: 300
    pub speech_start_delay_ms: u64,

    /// Shortest speech segment reported through `SpeechEnd`, in milliseconds
    ///
    /// Default: 500
    pub min_speech_duration_ms: u64,

    /// Samples per analysis frame
    pub fft_size: usize,

    /// Spectral smoothing time constant (0.0-1.0)
    pub smoothing: f32,

    /// Number of frame volumes averaged into the smoothed volume
    pub history_size: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 25.0,
            silence_threshold: 15.0,
            silence_duration_ms: 1500,
            speech_start_delay_ms: 300,
            min_speech_duration_ms: 500,
            fft_size: 512,
            smoothing: 0.8,
            history_size: 10,
        }
    }
}

/// Event emitted by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VadEvent {
    /// Speech has started
    SpeechStart {
        /// Milliseconds since `start()`
        elapsed_ms: u64,
    },
    /// Speech has ended
    SpeechEnd {
        /// Milliseconds since `start()`
        elapsed_ms: u64,
        /// Spoken span of the segment, excluding the trailing silence
        duration_ms: u64,
    },
    /// Smoothed volume of the latest frame
    VolumeChange { volume: f32 },
    /// Silence is accumulating inside a speech segment
    SilenceDetected { silence_ms: u64 },
    /// A frame was processed while speech is ongoing
    Speaking { volume: f32 },
}

/// Failure to acquire microphone input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaAccessError {
    /// The user or the platform refused access to the microphone
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No input device is available
    #[error("No audio input device available")]
    NoDevice,

    /// The device exists but the input stream could not be built or started
    #[error("Audio input stream failed: {0}")]
    StreamFailed(String),

    /// The detector has been destroyed
    #[error("Voice activity detector has been destroyed")]
    Destroyed,
}

/// Read-only, cloneable view of the detector's speaking state
///
/// Handed to the interview controller so it can check for ongoing speech
/// without owning the detector.
#[derive(Debug, Clone, Default)]
pub struct SpeakingFlag(Arc<AtomicBool>);

impl SpeakingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_speaking(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, speaking: bool) {
        self.0.store(speaking, Ordering::SeqCst);
    }
}

/// Status information for VAD
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadStatus {
    pub initialized: bool,
    pub running: bool,
    pub is_speaking: bool,
    /// Smoothed volume (0-100)
    pub volume: f32,
    pub config: VadConfig,
}

/// Energy based voice activity detector
pub struct VoiceActivityDetector {
    config: VadConfig,
    clock: SharedClock,
    analyser: SpectralAnalyser,
    source: Option<Box<dyn AudioSource>>,
    frames: Option<Receiver<Vec<f32>>>,
    /// Captured samples not yet forming a whole analysis frame
    pending_samples: Vec<f32>,
    running: bool,
    destroyed: bool,
    started_at: Option<Instant>,
    speaking: SpeakingFlag,
    volume: f32,
    volume_history: VecDeque<f32>,
    speech_start_time: Option<Instant>,
    silence_start_time: Option<Instant>,
    /// When the speech-start debounce was armed
    speech_start_armed_at: Option<Instant>,
    listeners: Listeners<VadEvent>,
}

impl VoiceActivityDetector {
    /// Creates a detector; call `initialize` and `start` before feeding audio
    pub fn new(config: VadConfig, clock: SharedClock) -> Self {
        let analyser = SpectralAnalyser::new(config.fft_size, config.smoothing);
        let history_size = config.history_size.max(1);
        Self {
            config,
            clock,
            analyser,
            source: None,
            frames: None,
            pending_samples: Vec::new(),
            running: false,
            destroyed: false,
            started_at: None,
            speaking: SpeakingFlag::new(),
            volume: 0.0,
            volume_history: VecDeque::with_capacity(history_size),
            speech_start_time: None,
            silence_start_time: None,
            speech_start_armed_at: None,
            listeners: Listeners::new(),
        }
    }

    /// Acquires the audio source and prepares the analysis pipeline
    ///
    /// # Errors
    ///
    /// Returns the source's `MediaAccessError` if the microphone cannot be
    /// opened. The detector stays uninitialised and `start()` is a no-op.
    pub fn initialize(&mut self, mut source: Box<dyn AudioSource>) -> Result<(), MediaAccessError> {
        if self.destroyed {
            return Err(MediaAccessError::Destroyed);
        }
        if self.frames.is_some() {
            tracing::debug!("VAD already initialised");
            return Ok(());
        }

        match source.open() {
            Ok(frames) => {
                self.frames = Some(frames);
                self.source = Some(source);
                tracing::info!(
                    "VAD initialised (fft_size={}, smoothing={})",
                    self.analyser.frame_size(),
                    self.config.smoothing
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("VAD failed to acquire audio input: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.frames.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Begins frame analysis; no-op if already running or uninitialised
    pub fn start(&mut self) {
        if self.running || !self.is_initialized() {
            return;
        }
        self.reset_runtime();
        self.running = true;
        self.started_at = Some(self.clock.now());
        tracing::info!("VAD started");
    }

    /// Ends frame analysis and cancels any pending speech-start debounce
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.reset_runtime();
        tracing::info!("VAD stopped");
    }

    /// Releases the audio source and all listeners; safe to call repeatedly
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop();
        self.frames = None;
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        self.listeners.clear();
        self.destroyed = true;
        tracing::info!("VAD destroyed");
    }

    /// Registers an event listener
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&VadEvent) + Send + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.is_speaking()
    }

    /// Latest smoothed volume (0-100)
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Returns a handle that tracks `is_speaking()`
    pub fn speaking_handle(&self) -> SpeakingFlag {
        self.speaking.clone()
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Replaces the configuration; thresholds apply from the next frame
    pub fn set_config(&mut self, config: VadConfig) {
        if config.fft_size != self.config.fft_size || config.smoothing != self.config.smoothing {
            self.analyser = SpectralAnalyser::new(config.fft_size, config.smoothing);
            self.pending_samples.clear();
        }
        self.config = config;
    }

    pub fn status(&self) -> VadStatus {
        VadStatus {
            initialized: self.is_initialized(),
            running: self.running,
            is_speaking: self.is_speaking(),
            volume: self.volume,
            config: self.config.clone(),
        }
    }

    /// One host loop tick: drains captured audio and runs due timers
    pub fn poll(&mut self) {
        if !self.running {
            return;
        }

        let mut disconnected = false;
        let mut chunks = Vec::new();
        if let Some(frames) = &self.frames {
            loop {
                match frames.try_recv() {
                    Ok(chunk) => chunks.push(chunk),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }

        for chunk in chunks {
            self.process_samples(&chunk);
        }

        let now = self.clock.now();
        self.fire_speech_start_if_due(now);

        if disconnected {
            tracing::warn!("Audio source disconnected, stopping VAD");
            self.stop();
            self.frames = None;
            if let Some(mut source) = self.source.take() {
                source.close();
            }
        }
    }

    /// Feeds raw mono samples; every whole `fft_size` frame is analysed
    pub fn process_samples(&mut self, samples: &[f32]) {
        if !self.running {
            return;
        }
        self.pending_samples.extend_from_slice(samples);

        let frame_size = self.analyser.frame_size();
        while self.pending_samples.len() >= frame_size {
            let frame: Vec<f32> = self.pending_samples.drain(..frame_size).collect();
            let energy = self.analyser.average_energy(&frame);
            self.process_volume(volume_from_energy(energy));
        }
    }

    /// Feeds one frame's volume (0-100) directly, bypassing the analyser
    pub fn process_volume(&mut self, volume: f32) {
        if !self.running {
            return;
        }
        let now = self.clock.now();

        self.volume_history.push_back(volume);
        while self.volume_history.len() > self.config.history_size.max(1) {
            self.volume_history.pop_front();
        }
        let smoothed =
            self.volume_history.iter().sum::<f32>() / self.volume_history.len() as f32;
        self.volume = smoothed;
        self.listeners.emit(&VadEvent::VolumeChange { volume: smoothed });

        // A debounce that came due between frames fires before this frame is judged
        self.fire_speech_start_if_due(now);

        if smoothed > self.config.energy_threshold {
            self.silence_start_time = None;
            if self.is_speaking() {
                self.listeners.emit(&VadEvent::Speaking { volume: smoothed });
            } else if self.speech_start_armed_at.is_none() {
                tracing::trace!("VAD speech-start debounce armed (volume {:.1})", smoothed);
                self.speech_start_armed_at = Some(now);
            }
            return;
        }

        if self.speech_start_armed_at.take().is_some() {
            tracing::trace!("VAD speech-start debounce cancelled (volume {:.1})", smoothed);
        }

        if !self.is_speaking() {
            return;
        }

        if smoothed < self.config.silence_threshold {
            let silence_start = *self.silence_start_time.get_or_insert(now);
            let silence = now.saturating_duration_since(silence_start);
            self.listeners.emit(&VadEvent::SilenceDetected {
                silence_ms: silence.as_millis() as u64,
            });
            if silence > Duration::from_millis(self.config.silence_duration_ms) {
                self.end_speech(now, silence_start);
            }
        } else {
            self.listeners.emit(&VadEvent::Speaking { volume: smoothed });
        }
    }

    fn fire_speech_start_if_due(&mut self, now: Instant) {
        let Some(armed_at) = self.speech_start_armed_at else {
            return;
        };
        let due = armed_at + Duration::from_millis(self.config.speech_start_delay_ms);
        if now < due {
            return;
        }

        self.speech_start_armed_at = None;
        self.speech_start_time = Some(due);
        self.silence_start_time = None;
        self.speaking.set(true);

        let elapsed_ms = self.elapsed_ms(due);
        tracing::info!("VAD speech started at {}ms", elapsed_ms);
        self.listeners.emit(&VadEvent::SpeechStart { elapsed_ms });
    }

    fn end_speech(&mut self, now: Instant, silence_start: Instant) {
        let spoken = self
            .speech_start_time
            .map(|start| silence_start.saturating_duration_since(start))
            .unwrap_or_default();

        self.speaking.set(false);
        self.speech_start_time = None;
        self.silence_start_time = None;

        if spoken < Duration::from_millis(self.config.min_speech_duration_ms) {
            tracing::debug!("VAD discarded {}ms segment as noise", spoken.as_millis());
            return;
        }

        let elapsed_ms = self.elapsed_ms(now);
        let duration_ms = spoken.as_millis() as u64;
        tracing::info!("VAD speech ended at {}ms ({}ms spoken)", elapsed_ms, duration_ms);
        self.listeners.emit(&VadEvent::SpeechEnd {
            elapsed_ms,
            duration_ms,
        });
    }

    fn elapsed_ms(&self, at: Instant) -> u64 {
        self.started_at
            .map(|start| at.saturating_duration_since(start).as_millis() as u64)
            .unwrap_or(0)
    }

    fn reset_runtime(&mut self) {
        self.speaking.set(false);
        self.volume = 0.0;
        self.volume_history.clear();
        self.pending_samples.clear();
        self.speech_start_time = None;
        self.silence_start_time = None;
        self.speech_start_armed_at = None;
        self.analyser.reset();
    }
}

impl Drop for VoiceActivityDetector {
    fn drop(&mut self) {
        self.destroy();
    }
}
