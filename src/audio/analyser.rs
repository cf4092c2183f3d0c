//! Spectral energy analysis for voice activity detection
//!
//! Computes the average byte-scaled spectral energy of a frame the same way
//! a Web Audio `AnalyserNode` does: Blackman window, forward FFT, per-bin
//! magnitude smoothed over time, decibel conversion clamped into a fixed
//! window and scaled to 0-255.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Lower edge of the decibel window (maps to 0)
pub const MIN_DECIBELS: f32 = -100.0;

/// Upper edge of the decibel window (maps to 255)
pub const MAX_DECIBELS: f32 = -30.0;

/// Average byte energy that corresponds to a volume of 100
const VOLUME_NORMALIZATION: f32 = 128.0;

/// Map an average byte energy (0-255) to a 0-100 volume
pub fn volume_from_energy(energy: f32) -> f32 {
    (energy / VOLUME_NORMALIZATION * 100.0).clamp(0.0, 100.0)
}

/// FFT-based frame energy analyser
pub struct SpectralAnalyser {
    fft_size: usize,
    smoothing: f32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Per-bin magnitudes carried between frames
    smoothed: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl SpectralAnalyser {
    /// Create an analyser for frames of `fft_size` samples
    ///
    /// `smoothing` is the time constant between 0.0 (no smoothing) and 1.0.
    pub fn new(fft_size: usize, smoothing: f32) -> Self {
        let fft_size = fft_size.max(32);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let window = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / fft_size as f32;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect();

        Self {
            fft_size,
            smoothing: smoothing.clamp(0.0, 0.999),
            fft,
            window,
            smoothed: vec![0.0; fft_size / 2],
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    /// Number of samples consumed per analysis frame
    pub fn frame_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins averaged
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Clear the smoothing history
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
    }

    /// Analyse one frame and return its average byte energy (0-255)
    ///
    /// Shorter frames are zero padded; longer frames use their most recent
    /// `fft_size` samples.
    pub fn average_energy(&mut self, frame: &[f32]) -> f32 {
        let start = frame.len().saturating_sub(self.fft_size);
        let frame = &frame[start..];

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = frame.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let scale = 1.0 / self.fft_size as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        let mut total = 0.0f32;

        for (bin, previous) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.buffer[bin].norm() * scale;
            *previous = self.smoothing * *previous + (1.0 - self.smoothing) * magnitude;

            let byte = if *previous > 0.0 {
                let db = 20.0 * previous.log10();
                (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0)
            } else {
                0.0
            };
            total += byte;
        }

        total / self.smoothed.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic white noise in [-amplitude, amplitude]
    fn noise(len: usize, amplitude: f32, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let unit = (state >> 8) as f32 / (1u32 << 24) as f32;
                (unit * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    #[test]
    fn test_silence_has_zero_energy() {
        let mut analyser = SpectralAnalyser::new(512, 0.8);
        let energy = analyser.average_energy(&vec![0.0; 512]);
        assert_eq!(energy, 0.0);
        assert_eq!(volume_from_energy(energy), 0.0);
    }

    #[test]
    fn test_noise_produces_high_volume() {
        let mut analyser = SpectralAnalyser::new(512, 0.8);
        let mut energy = 0.0;
        for seed in 1..10 {
            energy = analyser.average_energy(&noise(512, 0.5, seed));
        }
        assert!(energy > 100.0, "energy was {}", energy);
        assert!(volume_from_energy(energy) > 50.0);
    }

    #[test]
    fn test_smoothing_decays_after_signal_stops() {
        let mut analyser = SpectralAnalyser::new(512, 0.8);
        for seed in 1..10 {
            analyser.average_energy(&noise(512, 0.5, seed));
        }
        let loud = analyser.average_energy(&noise(512, 0.5, 42));
        let first_quiet = analyser.average_energy(&vec![0.0; 512]);
        assert!(first_quiet > 0.0, "smoothing should carry energy over");
        assert!(first_quiet < loud);

        let mut last = first_quiet;
        for _ in 0..200 {
            last = analyser.average_energy(&vec![0.0; 512]);
        }
        assert!(last < 1.0);
    }

    #[test]
    fn test_short_frame_zero_padded() {
        let mut analyser = SpectralAnalyser::new(512, 0.0);
        let energy = analyser.average_energy(&noise(100, 0.5, 7));
        assert!(energy > 0.0);
    }

    #[test]
    fn test_volume_mapping_is_clamped() {
        assert_eq!(volume_from_energy(64.0), 50.0);
        assert_eq!(volume_from_energy(255.0), 100.0);
        assert_eq!(volume_from_energy(-1.0), 0.0);
    }

    #[test]
    fn test_frame_size_and_bins() {
        let analyser = SpectralAnalyser::new(512, 0.8);
        assert_eq!(analyser.frame_size(), 512);
        assert_eq!(analyser.bin_count(), 256);
    }
}
