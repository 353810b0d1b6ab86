//! Playable sequence capability
//!
//! [`PlayableSequence`] is the fixed set of operations every readable
//! sample source offers: a plain [`Track`](crate::track::Track), the
//! streaming decorator wrapped around one, or a test double. [`ClipSource`]
//! adds the clip-level view the segment provider walks.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::segment::ClipSpan;
use crate::storage::SampleFormat;
use crate::track::ClipHandle;

/// Signed sample position on a track's timeline
pub type SampleCount = i64;

/// Convert a time in seconds to the nearest sample position
#[inline]
pub fn time_to_samples(t: f64, rate: u32) -> SampleCount {
    (t * rate as f64 + 0.5).floor() as SampleCount
}

/// Convert a sample position to seconds
#[inline]
pub fn samples_to_time(s: SampleCount, rate: u32) -> f64 {
    s as f64 / rate as f64
}

/// Direction of travel through a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackDirection {
    #[default]
    Forward,
    Backward,
}

impl PlaybackDirection {
    pub fn from_backwards(backwards: bool) -> Self {
        if backwards {
            PlaybackDirection::Backward
        } else {
            PlaybackDirection::Forward
        }
    }

    pub fn is_backward(self) -> bool {
        self == PlaybackDirection::Backward
    }

    /// +1 forward, -1 backward
    pub fn sign(self) -> SampleCount {
        match self {
            PlaybackDirection::Forward => 1,
            PlaybackDirection::Backward => -1,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            PlaybackDirection::Forward => PlaybackDirection::Backward,
            PlaybackDirection::Backward => PlaybackDirection::Forward,
        }
    }
}

/// A readable, multi-channel sample sequence
pub trait PlayableSequence {
    fn n_channels(&self) -> usize;

    /// Gain applied to `channel` after pan
    fn channel_gain(&self, channel: usize) -> f32;

    fn start_time(&self) -> f64;

    fn end_time(&self) -> f64;

    fn rate(&self) -> u32;

    /// Widest storage format among the sequence's clips
    fn widest_effective_format(&self) -> SampleFormat;

    fn has_trivial_envelope(&self) -> bool;

    /// Fill `buffer` with per-sample gains starting at `t0`
    ///
    /// Backward fills hold the gains of the samples before `t0`, latest first.
    fn envelope_values(&self, buffer: &mut [f64], t0: f64, backwards: bool);

    /// Read `len` samples into `buffers`, one buffer per channel starting
    /// at `channel`
    ///
    /// Forward reads cover `start..start + len`; backward reads cover
    /// `start - len..start`, latest first. Returns how many samples came
    /// from clips rather than from zero-filling.
    fn get(
        &mut self,
        channel: usize,
        buffers: &mut [&mut [f32]],
        start: SampleCount,
        len: usize,
        backwards: bool,
    ) -> Result<usize>;

    fn solo(&self) -> bool {
        false
    }

    fn mute(&self) -> bool {
        false
    }

    fn time_to_long_samples(&self, t: f64) -> SampleCount {
        time_to_samples(t, self.rate())
    }

    fn long_samples_to_time(&self, s: SampleCount) -> f64 {
        samples_to_time(s, self.rate())
    }
}

/// Clip-level view of a sequence, as consumed by the segment provider
pub trait ClipSource: PlayableSequence {
    /// Every non-empty clip as a span of track samples, in any order
    fn clip_spans(&self) -> Vec<ClipSpan>;

    /// Read `len` samples of the clip at clip-local `offset`
    ///
    /// Same direction rules as [`PlayableSequence::get`]. Storage faults
    /// are returned, never zero-filled.
    fn read_clip(
        &self,
        handle: ClipHandle,
        buffers: &mut [&mut [f32]],
        offset: SampleCount,
        len: usize,
        backwards: bool,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0.0, 44100, 0)]
    #[test_case(1.0, 44100, 44100)]
    #[test_case(0.49, 1, 0)]
    #[test_case(0.5, 1, 1)]
    #[test_case(-1.0, 8, -8)]
    fn test_time_to_samples_rounds_to_nearest(t: f64, rate: u32, expected: SampleCount) {
        assert_eq!(time_to_samples(t, rate), expected);
    }

    #[test]
    fn test_direction_helpers() {
        assert_eq!(PlaybackDirection::from_backwards(true), PlaybackDirection::Backward);
        assert_eq!(PlaybackDirection::Forward.sign(), 1);
        assert_eq!(PlaybackDirection::Backward.sign(), -1);
        assert_eq!(PlaybackDirection::Forward.reversed(), PlaybackDirection::Backward);
    }

    #[test]
    fn test_direction_serializes_snake_case() {
        let json = serde_json::to_string(&PlaybackDirection::Backward).unwrap();
        assert_eq!(json, "\"backward\"");
    }
}
