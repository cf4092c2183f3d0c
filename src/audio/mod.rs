//! Audio subsystem for viva
//!
//! Spectral energy analysis, voice activity detection and input sources.
//! Microphone capture through cpal is available with the `microphone` feature.

pub mod analyser;
#[cfg(feature = "microphone")]
pub mod capture;
pub mod source;
pub mod vad;

pub use analyser::{volume_from_energy, SpectralAnalyser};
#[cfg(feature = "microphone")]
pub use capture::MicrophoneCapture;
pub use source::{downmix_to_mono, AudioSource, ChannelSource};
pub use vad::{
    MediaAccessError, SpeakingFlag, VadConfig, VadEvent, VadStatus, VoiceActivityDetector,
};
