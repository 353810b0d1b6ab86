//! Audio buffer
//!
//! Non-interleaved 32-bit float audio, used as the hand-off type between
//! the streaming decorator and file I/O.

use crate::error::{ClipstreamError, Result};

/// Multi-channel audio held as one `Vec<f32>` per channel
///
/// # Example
/// ```
/// use clipstream::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::new(2, 44100, 44100);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 44100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer
    ///
    /// # Arguments
    /// * `n_channels` - Number of channels
    /// * `len` - Number of samples per channel
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(n_channels: usize, len: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; len]; n_channels],
            sample_rate,
        }
    }

    /// Wrap existing channel vectors, which must all have the same length
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        let len = samples.first().map_or(0, Vec::len);
        if samples.is_empty() || samples.iter().any(|c| c.len() != len) {
            return Err(ClipstreamError::InvalidParameter {
                param: "channels".to_string(),
                value: format!("{} channels of unequal or zero count", samples.len()),
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create a buffer from interleaved sample data
    ///
    /// # Errors
    /// `InvalidParameter` if the data length is not a multiple of
    /// `n_channels`
    pub fn from_interleaved(
        interleaved: &[f32],
        n_channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if n_channels == 0 || interleaved.len() % n_channels != 0 {
            return Err(ClipstreamError::InvalidParameter {
                param: "interleaved".to_string(),
                value: format!(
                    "{} samples do not divide into {} channels",
                    interleaved.len(),
                    n_channels
                ),
            });
        }
        Ok(Self {
            samples: deinterleave(interleaved, n_channels),
            sample_rate,
        })
    }

    /// Samples in interleaved order (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        interleave(&self.samples)
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// # Panics
    /// Panics if `index` is not a valid channel
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// # Panics
    /// Panics if `index` is not a valid channel
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Borrow every channel as a slice
    pub fn as_slices(&self) -> Vec<&[f32]> {
        self.samples.iter().map(Vec::as_slice).collect()
    }

    /// Borrow every channel as a mutable slice, the shape sequence reads take
    pub fn as_mut_slices(&mut self) -> Vec<&mut [f32]> {
        self.samples.iter_mut().map(Vec::as_mut_slice).collect()
    }

    /// Reverse every channel in place
    pub fn reverse(&mut self) {
        for channel in &mut self.samples {
            channel.reverse();
        }
    }

    /// Append `other`'s samples channel by channel
    pub fn append(&mut self, other: &AudioBuffer) -> Result<()> {
        if other.channels() != self.channels() || other.sample_rate != self.sample_rate {
            return Err(ClipstreamError::IncompatibleFormat {
                details: format!(
                    "cannot append {} ch @ {} Hz to {} ch @ {} Hz",
                    other.channels(),
                    other.sample_rate,
                    self.channels(),
                    self.sample_rate
                ),
            });
        }
        for (channel, tail) in self.samples.iter_mut().zip(&other.samples) {
            channel.extend_from_slice(tail);
        }
        Ok(())
    }

    /// Largest absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }
}

/// De-interleave samples from [L,R,L,R,...] to [[L,L,...], [R,R,...]]
pub fn deinterleave(samples: &[f32], n_channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / n_channels.max(1);
    let mut result = vec![Vec::with_capacity(frames); n_channels];
    for frame in samples.chunks_exact(n_channels.max(1)) {
        for (channel, &sample) in result.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }
    result
}

/// Interleave channels from [[L,L,...], [R,R,...]] to [L,R,L,R,...]
pub fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    let frames = channels.first().map_or(0, Vec::len);
    let mut result = Vec::with_capacity(frames * channels.len());
    for frame in 0..frames {
        for channel in channels {
            result.push(channel[frame]);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_is_silent() {
        let buffer = AudioBuffer::new(3, 10, 8000);
        assert_eq!(buffer.channels(), 3);
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.peak(), 0.0);
    }

    #[test]
    fn test_interleave_deinterleave_roundtrip() {
        let interleaved = vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        let buffer = AudioBuffer::from_interleaved(&interleaved, 2, 44100).unwrap();
        assert_eq!(buffer.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(buffer.channel(1), &[-1.0, -2.0, -3.0]);
        assert_eq!(buffer.to_interleaved(), interleaved);
    }

    #[test]
    fn test_from_interleaved_rejects_ragged() {
        assert!(AudioBuffer::from_interleaved(&[1.0, 2.0, 3.0], 2, 44100).is_err());
    }

    #[test]
    fn test_from_channels_rejects_unequal() {
        assert!(AudioBuffer::from_channels(vec![vec![0.0; 2], vec![0.0; 3]], 1).is_err());
        assert!(AudioBuffer::from_channels(Vec::new(), 1).is_err());
    }

    #[test]
    fn test_append_and_reverse() {
        let mut a = AudioBuffer::from_channels(vec![vec![1.0, 2.0]], 10).unwrap();
        let b = AudioBuffer::from_channels(vec![vec![3.0]], 10).unwrap();
        a.append(&b).unwrap();
        a.reverse();
        assert_eq!(a.channel(0), &[3.0, 2.0, 1.0]);
        assert!((a.duration_secs() - 0.3).abs() < 1e-12);

        let stereo = AudioBuffer::new(2, 1, 10);
        assert!(a.append(&stereo).is_err());
    }
}
