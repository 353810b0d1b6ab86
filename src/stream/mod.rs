//! Streaming pull decorator
//!
//! [`StretchingSequence`] wraps a [`ClipSource`] and answers fixed-size
//! pulls by walking the segment provider's output, optionally through a
//! [`TransformStage`]. It keeps an explicit cursor: a pull that continues
//! exactly where the last one stopped, in the same direction, reuses the
//! live segment walk; anything else is a seek and rebuilds it. Pulls that
//! run past the last clip are zero-filled.

pub mod transform;

use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::engine::AudioBuffer;
use crate::error::{ClipstreamError, Result};
use crate::segment::{Segment, SegmentProvider, SegmentSequence};
use crate::sequence::{ClipSource, PlayableSequence, PlaybackDirection, SampleCount};
use crate::storage::SampleFormat;

pub use transform::{TransformFactory, TransformStage, Varispeed, VarispeedFactory};

/// Where the next continuous pull must start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCursor {
    pub expected_start: SampleCount,
    pub direction: PlaybackDirection,
    /// Segments taken from the walk since the last rebuild
    pub segment_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "cursor", rename_all = "snake_case")]
pub enum StreamState {
    /// No pull has happened since construction or the last failure
    #[default]
    Uninitialized,
    /// The segment walk is live
    Tracking(StreamCursor),
    /// The walk ran out; continuous pulls return silence until a seek
    Exhausted(StreamCursor),
}

impl StreamState {
    pub fn cursor(&self) -> Option<StreamCursor> {
        match *self {
            StreamState::Uninitialized => None,
            StreamState::Tracking(cursor) | StreamState::Exhausted(cursor) => Some(cursor),
        }
    }

    fn continues(&self, start: SampleCount, direction: PlaybackDirection) -> bool {
        self.cursor()
            .is_some_and(|c| c.expected_start == start && c.direction == direction)
    }
}

/// Playable decorator over a clip source
pub struct StretchingSequence<'a, S: ClipSource + ?Sized> {
    sequence: &'a S,
    provider: SegmentProvider<'a, S>,
    transform: Option<Box<dyn TransformFactory + 'a>>,
    stage: Option<Box<dyn TransformStage>>,
    segments: Option<SegmentSequence<'a, S>>,
    active: Option<Segment<'a, S>>,
    /// Transform output not yet handed to the caller
    fifo: Vec<VecDeque<f32>>,
    chunk: usize,
    flushed: bool,
    state: StreamState,
}

impl<'a, S: ClipSource + ?Sized> StretchingSequence<'a, S> {
    pub fn new(sequence: &'a S) -> Self {
        Self {
            sequence,
            provider: SegmentProvider::new(sequence),
            transform: None,
            stage: None,
            segments: None,
            active: None,
            fifo: vec![VecDeque::new(); sequence.n_channels()],
            chunk: crate::config::DEFAULT_TRANSFORM_CHUNK,
            flushed: false,
            state: StreamState::Uninitialized,
        }
    }

    /// Route every pull through stages built by `factory`
    pub fn with_transform(sequence: &'a S, factory: Box<dyn TransformFactory + 'a>) -> Self {
        let mut stream = Self::new(sequence);
        stream.transform = Some(factory);
        stream
    }

    /// Take the transform chunk size from `config`
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.chunk = config.transform_chunk_samples.max(1);
        self
    }

    pub fn with_chunk_size(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// Continue from a previously captured state
    ///
    /// The segment walk is rebuilt at the cursor position; a transform
    /// stage starts empty.
    pub fn resume(&mut self, state: StreamState) -> Result<()> {
        match state {
            StreamState::Uninitialized => {
                self.invalidate();
                Ok(())
            }
            StreamState::Tracking(cursor) => {
                self.reset_cursor_at(cursor.expected_start, cursor.direction)
            }
            StreamState::Exhausted(cursor) => {
                self.reset_cursor_at(cursor.expected_start, cursor.direction)?;
                self.segments = None;
                self.flushed = true;
                self.state = StreamState::Exhausted(StreamCursor {
                    segment_index: 0,
                    ..cursor
                });
                Ok(())
            }
        }
    }

    /// Rebuild the segment walk at `start`
    pub fn reset_cursor_at(
        &mut self,
        start: SampleCount,
        direction: PlaybackDirection,
    ) -> Result<()> {
        self.segments = Some(self.provider.create_sequence(start, direction));
        self.active = None;
        for channel in &mut self.fifo {
            channel.clear();
        }
        self.flushed = false;
        self.stage = match &self.transform {
            Some(factory) => Some(factory.create(
                self.sequence.rate(),
                self.sequence.n_channels(),
                &self.provider.spans(),
            )?),
            None => None,
        };
        self.state = StreamState::Tracking(StreamCursor {
            expected_start: start,
            direction,
            segment_index: 0,
        });
        debug!("Stream cursor reset to {} ({:?})", start, direction);
        Ok(())
    }

    fn invalidate(&mut self) {
        self.segments = None;
        self.active = None;
        self.stage = None;
        for channel in &mut self.fifo {
            channel.clear();
        }
        self.state = StreamState::Uninitialized;
    }

    /// Fill `len` samples of every buffer from the current cursor
    ///
    /// An uninitialised stream starts at the source's start time, forward.
    /// Whatever the segments cannot supply is zero. The cursor advances by
    /// `len` either way.
    ///
    /// # Returns
    /// Samples produced by the segment walk before zero-filling
    ///
    /// # Panics
    /// Panics unless there is one buffer per source channel, each at least
    /// `len` long.
    pub fn get_next(&mut self, buffers: &mut [&mut [f32]], len: usize) -> Result<usize> {
        assert_eq!(
            buffers.len(),
            self.sequence.n_channels(),
            "one output buffer per channel"
        );
        assert!(buffers.iter().all(|b| b.len() >= len), "output buffer shorter than pull");

        if self.state == StreamState::Uninitialized {
            let start = self.sequence.time_to_long_samples(self.sequence.start_time());
            self.reset_cursor_at(start, PlaybackDirection::Forward)?;
        }

        let produced = match self.fill(buffers, len) {
            Ok(produced) => produced,
            Err(e) => {
                self.invalidate();
                return Err(e);
            }
        };
        for buffer in buffers.iter_mut() {
            buffer[produced..len].fill(0.0);
        }

        let Some(mut cursor) = self.state.cursor() else {
            return Ok(produced);
        };
        cursor.expected_start += len as SampleCount * cursor.direction.sign();
        self.state = if produced < len || matches!(self.state, StreamState::Exhausted(_)) {
            if let StreamState::Tracking(_) = self.state {
                debug!("Stream exhausted at {}", cursor.expected_start);
            }
            StreamState::Exhausted(cursor)
        } else {
            StreamState::Tracking(cursor)
        };
        Ok(produced)
    }

    fn fill(&mut self, buffers: &mut [&mut [f32]], len: usize) -> Result<usize> {
        if matches!(self.state, StreamState::Exhausted(_)) {
            return Ok(0);
        }
        if self.stage.is_none() {
            return self.read_segments(buffers, 0, len);
        }

        let mut filled = 0;
        while filled < len {
            let ready = self.fifo.first().map_or(0, VecDeque::len);
            if ready > 0 {
                let n = ready.min(len - filled);
                for (buffer, channel) in buffers.iter_mut().zip(&mut self.fifo) {
                    let dest = buffer[filled..filled + n].iter_mut();
                    for (dest, sample) in dest.zip(channel.drain(..n)) {
                        *dest = sample;
                    }
                }
                filled += n;
                continue;
            }
            if self.flushed {
                break;
            }
            self.feed_stage()?;
        }
        Ok(filled)
    }

    /// Push one chunk of segment samples through the stage, or flush it
    /// once the segments are exhausted
    fn feed_stage(&mut self) -> Result<()> {
        let n_channels = self.fifo.len();
        let mut input = vec![vec![0.0_f32; self.chunk]; n_channels];
        let got = {
            let mut views: Vec<&mut [f32]> = input.iter_mut().map(Vec::as_mut_slice).collect();
            self.read_segments(&mut views, 0, self.chunk)?
        };

        let mut output = vec![Vec::new(); n_channels];
        let Some(stage) = self.stage.as_mut() else {
            return Ok(());
        };
        if got == 0 {
            stage.flush(&mut output)?;
            self.flushed = true;
        } else {
            let slices: Vec<&[f32]> = input.iter().map(|c| &c[..got]).collect();
            stage.process(&slices, &mut output)?;
        }
        for (channel, samples) in self.fifo.iter_mut().zip(output) {
            channel.extend(samples);
        }
        Ok(())
    }

    /// Walk segments into `buffers[from..len]`
    fn read_segments(
        &mut self,
        buffers: &mut [&mut [f32]],
        from: usize,
        len: usize,
    ) -> Result<usize> {
        let mut filled = from;
        while filled < len {
            if self.active.as_ref().map_or(true, Segment::is_empty) {
                let Some(next) = self.segments.as_mut().and_then(Iterator::next) else {
                    self.active = None;
                    self.segments = None;
                    break;
                };
                if let StreamState::Tracking(cursor) = &mut self.state {
                    cursor.segment_index += 1;
                }
                self.active = Some(next);
            }
            let Some(segment) = self.active.as_mut() else {
                break;
            };
            let mut views: Vec<&mut [f32]> =
                buffers.iter_mut().map(|b| &mut b[filled..len]).collect();
            let n = segment.get_floats(&mut views, len - filled)?;
            if n == 0 {
                assert!(segment.is_empty(), "segment returned no samples before it was exhausted");
                self.active = None;
                continue;
            }
            filled += n;
        }
        Ok(filled - from)
    }

    /// Pull `len` samples at `start` into a new buffer
    pub fn pull(&mut self, start: SampleCount, len: usize, backwards: bool) -> Result<AudioBuffer> {
        let mut buffer = AudioBuffer::new(self.sequence.n_channels(), len, self.sequence.rate());
        let mut slices = buffer.as_mut_slices();
        self.get(0, &mut slices, start, len, backwards)?;
        Ok(buffer)
    }
}

impl<S: ClipSource + ?Sized> PlayableSequence for StretchingSequence<'_, S> {
    fn n_channels(&self) -> usize {
        self.sequence.n_channels()
    }

    fn channel_gain(&self, channel: usize) -> f32 {
        self.sequence.channel_gain(channel)
    }

    fn start_time(&self) -> f64 {
        self.sequence.start_time()
    }

    fn end_time(&self) -> f64 {
        self.sequence.end_time()
    }

    fn rate(&self) -> u32 {
        self.sequence.rate()
    }

    fn widest_effective_format(&self) -> SampleFormat {
        self.sequence.widest_effective_format()
    }

    fn has_trivial_envelope(&self) -> bool {
        self.sequence.has_trivial_envelope()
    }

    fn envelope_values(&self, buffer: &mut [f64], t0: f64, backwards: bool) {
        self.sequence.envelope_values(buffer, t0, backwards)
    }

    /// Read through the decorator; only channel 0 is addressable and the
    /// buffers cover every channel
    fn get(
        &mut self,
        channel: usize,
        buffers: &mut [&mut [f32]],
        start: SampleCount,
        len: usize,
        backwards: bool,
    ) -> Result<usize> {
        assert_eq!(channel, 0, "the streaming decorator reads from channel 0 only");
        let direction = PlaybackDirection::from_backwards(backwards);
        if !self.state.continues(start, direction) {
            self.reset_cursor_at(start, direction)?;
        }
        self.get_next(buffers, len)
    }

    fn solo(&self) -> bool {
        self.sequence.solo()
    }

    fn mute(&self) -> bool {
        self.sequence.mute()
    }
}

/// Render `[t0, t1)` forward in blocks of `block` samples
pub fn render_range<P: PlayableSequence + ?Sized>(
    sequence: &mut P,
    t0: f64,
    t1: f64,
    block: usize,
) -> Result<AudioBuffer> {
    render(sequence, t0, t1, block, PlaybackDirection::Forward)
}

/// Render `[t0, t1)` from `t1` back to `t0`, last sample first
pub fn render_range_reversed<P: PlayableSequence + ?Sized>(
    sequence: &mut P,
    t0: f64,
    t1: f64,
    block: usize,
) -> Result<AudioBuffer> {
    render(sequence, t0, t1, block, PlaybackDirection::Backward)
}

fn render<P: PlayableSequence + ?Sized>(
    sequence: &mut P,
    t0: f64,
    t1: f64,
    block: usize,
    direction: PlaybackDirection,
) -> Result<AudioBuffer> {
    if !t0.is_finite() || !t1.is_finite() || t1 < t0 {
        return Err(ClipstreamError::InvalidTimeRange { t0, t1 });
    }
    if block == 0 {
        return Err(ClipstreamError::InvalidParameter {
            param: "block".to_string(),
            value: block.to_string(),
        });
    }

    let s0 = sequence.time_to_long_samples(t0);
    let s1 = sequence.time_to_long_samples(t1);
    let total = (s1 - s0).max(0) as usize;
    let n_channels = sequence.n_channels();
    let mut out = AudioBuffer::new(n_channels, 0, sequence.rate());
    let mut scratch = AudioBuffer::new(n_channels, block, sequence.rate());

    let mut position = if direction.is_backward() { s1 } else { s0 };
    let mut done = 0;
    while done < total {
        let n = block.min(total - done);
        {
            let mut slices = scratch.as_mut_slices();
            sequence.get(0, &mut slices, position, n, direction.is_backward())?;
        }
        for (channel, data) in out.samples.iter_mut().zip(&scratch.samples) {
            channel.extend_from_slice(&data[..n]);
        }
        position += n as SampleCount * direction.sign();
        done += n;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::tests::VecSource;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    /// Holds back the last `delay` samples until flushed
    struct Delay {
        delay: usize,
        held: Vec<VecDeque<f32>>,
    }

    impl TransformStage for Delay {
        fn process(&mut self, input: &[&[f32]], output: &mut [Vec<f32>]) -> Result<()> {
            for ((held, data), out) in self.held.iter_mut().zip(input).zip(output.iter_mut()) {
                held.extend(data.iter().copied());
                while held.len() > self.delay {
                    out.extend(held.pop_front());
                }
            }
            Ok(())
        }

        fn flush(&mut self, output: &mut [Vec<f32>]) -> Result<()> {
            for (held, out) in self.held.iter_mut().zip(output.iter_mut()) {
                out.extend(held.drain(..));
            }
            Ok(())
        }

        fn reset(&mut self) {
            self.held.iter_mut().for_each(VecDeque::clear);
        }

        fn latency(&self) -> usize {
            self.delay
        }
    }

    struct DelayFactory(usize);

    impl TransformFactory for DelayFactory {
        fn create(
            &self,
            _rate: u32,
            n_channels: usize,
            _spans: &[crate::segment::ClipSpan],
        ) -> Result<Box<dyn TransformStage>> {
            Ok(Box::new(Delay {
                delay: self.0,
                held: vec![VecDeque::new(); n_channels],
            }))
        }
    }

    fn gapped() -> VecSource {
        VecSource::new(vec![(0, vec![1.0, 2.0]), (5, vec![6.0, 7.0])])
    }

    fn pull_vec<S: ClipSource + ?Sized>(
        stream: &mut StretchingSequence<'_, S>,
        start: SampleCount,
        len: usize,
        backwards: bool,
    ) -> Vec<f32> {
        stream.pull(start, len, backwards).unwrap().samples.remove(0)
    }

    #[test]
    fn test_gapped_pull_zero_fills() {
        let source = gapped();
        let mut stream = StretchingSequence::new(&source);
        assert_eq!(
            pull_vec(&mut stream, 0, 10, false),
            vec![1.0, 2.0, 0.0, 0.0, 0.0, 6.0, 7.0, 0.0, 0.0, 0.0]
        );
        assert!(matches!(stream.state(), StreamState::Exhausted(_)));
    }

    #[test]
    fn test_backward_pull_reverses() {
        let source = gapped();
        let mut stream = StretchingSequence::new(&source);
        let mut back = pull_vec(&mut stream, 10, 10, true);
        back.reverse();
        assert_eq!(back, vec![1.0, 2.0, 0.0, 0.0, 0.0, 6.0, 7.0, 0.0, 0.0, 0.0]);
    }

    #[test_case(1, 9)]
    #[test_case(3, 7)]
    #[test_case(5, 5)]
    #[test_case(6, 4)]
    fn test_split_pull_matches_single_pull(a: usize, b: usize) {
        let source = gapped();
        let mut whole = StretchingSequence::new(&source);
        let expected = pull_vec(&mut whole, 0, a + b, false);

        let mut split = StretchingSequence::new(&source);
        let mut got = pull_vec(&mut split, 0, a, false);
        got.extend(pull_vec(&mut split, a as SampleCount, b, false));
        assert_eq!(got, expected);
    }

    #[test]
    fn test_continuation_keeps_walk_and_seek_rebuilds() {
        let source = gapped();
        let mut stream = StretchingSequence::new(&source);
        pull_vec(&mut stream, 0, 3, false);
        let cursor = stream.state().cursor().unwrap();
        assert_eq!(cursor.expected_start, 3);
        assert_eq!(cursor.segment_index, 2);

        pull_vec(&mut stream, 3, 1, false);
        assert_eq!(stream.state().cursor().unwrap().segment_index, 2);

        assert_eq!(pull_vec(&mut stream, 1, 2, false), vec![2.0, 0.0]);
        assert_eq!(stream.state().cursor().unwrap().segment_index, 2);
    }

    #[test]
    fn test_exhausted_answers_silence_until_seek() {
        let source = gapped();
        let mut stream = StretchingSequence::new(&source);
        pull_vec(&mut stream, 5, 4, false);
        assert!(matches!(stream.state(), StreamState::Exhausted(_)));

        assert_eq!(pull_vec(&mut stream, 9, 3, false), vec![0.0; 3]);
        assert_eq!(stream.state().cursor().unwrap().expected_start, 12);

        assert_eq!(pull_vec(&mut stream, 6, 1, false), vec![7.0]);
        assert!(matches!(stream.state(), StreamState::Tracking(_)));
    }

    #[test]
    fn test_direction_flip_is_a_seek() {
        let source = gapped();
        let mut stream = StretchingSequence::new(&source);
        assert_eq!(pull_vec(&mut stream, 0, 2, false), vec![1.0, 2.0]);
        assert_eq!(pull_vec(&mut stream, 2, 2, true), vec![2.0, 1.0]);
        assert_eq!(stream.state().cursor().unwrap().expected_start, 0);
    }

    #[test]
    fn test_storage_fault_propagates_and_invalidates() {
        let mut source = gapped();
        source.broken = Some(1);
        let mut stream = StretchingSequence::new(&source);
        let err = stream.pull(0, 10, false).unwrap_err();
        assert!(err.is_out_of_range_like());
        assert_eq!(stream.state(), StreamState::Uninitialized);
    }

    #[test]
    #[should_panic(expected = "channel 0 only")]
    fn test_nonzero_channel_is_contract_violation() {
        let source = gapped();
        let mut stream = StretchingSequence::new(&source);
        let mut buf = vec![0.0_f32; 2];
        let _ = stream.get(1, &mut [buf.as_mut_slice()], 0, 2, false);
    }

    #[test]
    fn test_delay_stage_is_transparent() {
        let source = gapped();
        let mut plain = StretchingSequence::new(&source);
        let expected = pull_vec(&mut plain, 0, 12, false);

        let mut delayed = StretchingSequence::with_transform(&source, Box::new(DelayFactory(3)))
            .with_chunk_size(2);
        let mut got = Vec::new();
        for start in (0..12).step_by(4) {
            got.extend(pull_vec(&mut delayed, start, 4, false));
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn test_delay_stage_backward_mirrors_forward() {
        let source = gapped();
        let mut plain = StretchingSequence::new(&source);
        let mut forward = pull_vec(&mut plain, 0, 12, false);
        forward.reverse();

        let mut delayed = StretchingSequence::with_transform(&source, Box::new(DelayFactory(3)))
            .with_chunk_size(2);
        let mut got = Vec::new();
        for end in [12, 8, 4] {
            got.extend(pull_vec(&mut delayed, end, 4, true));
        }
        assert_eq!(got, forward);
        assert_eq!(got, vec![0.0, 0.0, 0.0, 0.0, 0.0, 7.0, 6.0, 0.0, 0.0, 0.0, 2.0, 1.0]);
    }

    #[test]
    fn test_direction_flip_resets_stage() {
        let source = gapped();
        let mut delayed = StretchingSequence::with_transform(&source, Box::new(DelayFactory(3)))
            .with_chunk_size(2);
        assert_eq!(pull_vec(&mut delayed, 0, 2, false), vec![1.0, 2.0]);
        assert_eq!(pull_vec(&mut delayed, 2, 2, true), vec![2.0, 1.0]);
        assert_eq!(
            pull_vec(&mut delayed, 0, 7, false),
            vec![1.0, 2.0, 0.0, 0.0, 0.0, 6.0, 7.0]
        );
    }

    #[test]
    fn test_varispeed_backward_reads_reversed_input() {
        let source = VecSource::new(vec![(0, (0..8).map(|i| i as f32).collect())]);
        let factory = VarispeedFactory::new(2.0).unwrap();
        let mut stream =
            StretchingSequence::with_transform(&source, Box::new(factory)).with_chunk_size(8);
        assert_eq!(pull_vec(&mut stream, 8, 6, true), vec![7.0, 5.0, 3.0, 1.0, 0.0, 0.0]);

        assert_eq!(pull_vec(&mut stream, 0, 4, false), vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_varispeed_through_stream() {
        let source = VecSource::new(vec![(0, (0..8).map(|i| i as f32).collect())]);
        let factory = VarispeedFactory::new(2.0).unwrap();
        let mut stream =
            StretchingSequence::with_transform(&source, Box::new(factory)).with_chunk_size(8);
        assert_eq!(pull_vec(&mut stream, 0, 6, false), vec![0.0, 2.0, 4.0, 6.0, 0.0, 0.0]);
        assert!(matches!(stream.state(), StreamState::Exhausted(_)));
    }

    #[test]
    fn test_resume_from_captured_state() {
        let source = gapped();
        let mut first = StretchingSequence::new(&source);
        pull_vec(&mut first, 0, 4, false);
        let state = first.state();
        let json = serde_json::to_string(&state).unwrap();
        let restored: StreamState = serde_json::from_str(&json).unwrap();

        let mut second = StretchingSequence::new(&source);
        second.resume(restored).unwrap();
        let mut buf = vec![0.0_f32; 3];
        second.get_next(&mut [buf.as_mut_slice()], 3).unwrap();
        assert_eq!(buf, vec![0.0, 6.0, 7.0]);
    }

    #[test]
    fn test_uninitialized_get_next_starts_at_source_start() {
        let source = VecSource::new(vec![(2, vec![5.0])]);
        let mut stream = StretchingSequence::new(&source);
        let mut buf = vec![9.0_f32; 2];
        assert_eq!(stream.get_next(&mut [buf.as_mut_slice()], 2).unwrap(), 1);
        assert_eq!(buf, vec![5.0, 0.0]);
    }

    #[test]
    fn test_render_range_blocks() {
        let source = gapped();
        let mut stream = StretchingSequence::new(&source);
        let out = render_range(&mut stream, 0.0, 7.0, 3).unwrap();
        assert_eq!(out.channel(0), &[1.0, 2.0, 0.0, 0.0, 0.0, 6.0, 7.0]);

        let back = render_range_reversed(&mut stream, 0.0, 7.0, 3).unwrap();
        assert_eq!(back.channel(0), &[7.0, 6.0, 0.0, 0.0, 0.0, 2.0, 1.0]);

        assert!(render_range(&mut stream, 2.0, 1.0, 3).is_err());
        assert!(render_range(&mut stream, 0.0, 1.0, 0).is_err());
    }
}
