//! Audio input sources for the detector

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::vad::MediaAccessError;

/// Producer of mono f32 sample chunks
pub trait AudioSource: Send {
    /// Acquires the input and returns the channel captured chunks arrive on
    fn open(&mut self) -> Result<Receiver<Vec<f32>>, MediaAccessError>;

    /// Releases the input; called once by the detector on destroy
    fn close(&mut self);
}

/// Source fed by the host through a channel
///
/// Used when audio comes from somewhere other than a local microphone
/// (a network stream, a decoded file, a test).
pub struct ChannelSource {
    receiver: Option<Receiver<Vec<f32>>>,
}

impl ChannelSource {
    /// Returns the sending half together with the source
    pub fn new() -> (Sender<Vec<f32>>, Self) {
        let (sender, receiver) = unbounded();
        (
            sender,
            Self {
                receiver: Some(receiver),
            },
        )
    }
}

impl AudioSource for ChannelSource {
    fn open(&mut self) -> Result<Receiver<Vec<f32>>, MediaAccessError> {
        self.receiver
            .clone()
            .ok_or_else(|| MediaAccessError::StreamFailed("channel source closed".to_string()))
    }

    fn close(&mut self) {
        self.receiver = None;
    }
}

/// Average interleaved frames down to a single channel
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_source_delivers_chunks() {
        let (tx, mut source) = ChannelSource::new();
        let rx = source.open().unwrap();
        tx.send(vec![0.1, 0.2]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), vec![0.1, 0.2]);
    }

    #[test]
    fn test_channel_source_cannot_reopen_after_close() {
        let (_tx, mut source) = ChannelSource::new();
        source.close();
        assert!(matches!(
            source.open(),
            Err(MediaAccessError::StreamFailed(_))
        ));
    }

    #[test]
    fn test_downmix_stereo() {
        let stereo = vec![0.5, -0.5, 0.2, 0.4];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.0).abs() < 1e-6);
        assert!((mono[1] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let mono = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&mono, 1), mono);
    }
}
