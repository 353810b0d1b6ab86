//! Multi-clip tracks
//!
//! A [`Track`] owns its clips in a [`ClipArena`] and hands out
//! [`ClipHandle`]s. Storage order is slot order, not time order; anything
//! order-dependent goes through [`Track::sorted_clips`]. Edits live in
//! `edit`, live recording in `recording`.

mod arena;
mod edit;
mod factory;
mod recording;

use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clip::{Clip, Envelope};
use crate::config::MERGE_POINT_TOLERANCE;
use crate::error::{ClipstreamError, Result};
use crate::segment::ClipSpan;
use crate::sequence::{time_to_samples, ClipSource, PlayableSequence, SampleCount};
use crate::storage::{SampleBlockFactory, SampleFormat};

pub use arena::{ClipArena, ClipHandle};
pub use factory::TrackFactory;
pub use recording::{Recorder, RecordingBuffer};

/// Stable identity of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An ordered, non-overlapping collection of clips sharing one channel width
#[derive(Debug)]
pub struct Track {
    id: TrackId,
    name: String,
    clips: ClipArena<Clip>,
    n_channels: usize,
    rate: u32,
    format: SampleFormat,
    gain: f32,
    pan: f32,
    color: usize,
    solo: bool,
    mute: bool,
    merge_tolerance: f64,
    factory: Arc<dyn SampleBlockFactory>,
    recording: Arc<RecordingBuffer>,
}

impl Track {
    pub(crate) fn new(
        factory: Arc<dyn SampleBlockFactory>,
        n_channels: usize,
        rate: u32,
        format: SampleFormat,
    ) -> Self {
        let recording = Arc::new(RecordingBuffer::new(n_channels, factory.max_block_samples()));
        Self {
            id: TrackId::new(),
            name: "Audio".to_string(),
            clips: ClipArena::new(),
            n_channels,
            rate,
            format,
            gain: 1.0,
            pan: 0.0,
            color: 0,
            solo: false,
            mute: false,
            merge_tolerance: MERGE_POINT_TOLERANCE,
            factory,
            recording,
        }
    }

    /// A track with the same settings and block store but no clips
    pub fn empty_copy(&self) -> Track {
        let mut copy = Track::new(
            Arc::clone(&self.factory),
            self.n_channels,
            self.rate,
            self.format,
        );
        copy.name = self.name.clone();
        copy.gain = self.gain;
        copy.pan = self.pan;
        copy.color = self.color;
        copy.solo = self.solo;
        copy.mute = self.mute;
        copy.merge_tolerance = self.merge_tolerance;
        copy
    }

    // ========================================================================
    // Properties
    // ========================================================================

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: TrackId) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Format new clips are created with
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) -> Result<()> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(ClipstreamError::InvalidParameter {
                param: "gain".to_string(),
                value: gain.to_string(),
            });
        }
        self.gain = gain;
        Ok(())
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Set the pan position, clamped to `[-1, 1]`
    pub fn set_pan(&mut self, pan: f32) {
        self.pan = if pan.is_finite() { pan.clamp(-1.0, 1.0) } else { 0.0 };
    }

    pub fn color(&self) -> usize {
        self.color
    }

    pub fn set_color(&mut self, color: usize) {
        self.color = color;
    }

    pub fn set_solo(&mut self, solo: bool) {
        self.solo = solo;
    }

    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    pub fn merge_tolerance(&self) -> f64 {
        self.merge_tolerance
    }

    pub fn set_merge_tolerance(&mut self, tolerance: f64) {
        if tolerance.is_finite() && tolerance >= 0.0 {
            self.merge_tolerance = tolerance;
        }
    }

    pub fn block_factory(&self) -> &Arc<dyn SampleBlockFactory> {
        &self.factory
    }

    /// Gain of one output channel after applying pan
    ///
    /// Panning right attenuates the left channel and vice versa.
    pub fn channel_gain(&self, channel: usize) -> f32 {
        let mut gain = self.gain;
        match channel % 2 {
            0 if self.pan > 0.0 => gain *= 1.0 - self.pan,
            1 if self.pan < 0.0 => gain *= 1.0 + self.pan,
            _ => {}
        }
        gain
    }

    // ========================================================================
    // Clip queries
    // ========================================================================

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// Look up a live clip
    pub fn clip(&self, handle: ClipHandle) -> Result<&Clip> {
        self.clips
            .get(handle)
            .ok_or(ClipstreamError::StaleHandle { handle })
    }

    /// Mutable access to a clip's envelope
    pub fn clip_envelope_mut(&mut self, handle: ClipHandle) -> Result<&mut Envelope> {
        self.clips
            .get_mut(handle)
            .map(Clip::envelope_mut)
            .ok_or(ClipstreamError::StaleHandle { handle })
    }

    pub fn set_clip_name(&mut self, handle: ClipHandle, name: impl Into<String>) -> Result<()> {
        let clip = self
            .clips
            .get_mut(handle)
            .ok_or(ClipstreamError::StaleHandle { handle })?;
        clip.set_name(name);
        Ok(())
    }

    /// Clips in storage order
    pub fn clips(&self) -> impl Iterator<Item = (ClipHandle, &Clip)> {
        self.clips.iter()
    }

    /// Clips ordered by start time
    pub fn sorted_clips(&self) -> Vec<(ClipHandle, &Clip)> {
        sorted(&self.clips)
    }

    /// Earliest clip start, or zero for a track without clips
    pub fn start_time(&self) -> f64 {
        self.clips
            .iter()
            .map(|(_, c)| c.start_time())
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Latest clip end, or zero for a track without clips
    pub fn end_time(&self) -> f64 {
        self.clips
            .iter()
            .map(|(_, c)| c.end_time())
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    /// The clip with a sample at time `t`
    pub fn clip_at_time(&self, t: f64) -> Option<ClipHandle> {
        self.sorted_clips()
            .into_iter()
            .find(|(_, c)| c.contains_time(t))
            .map(|(h, _)| h)
    }

    pub fn find_clip_by_name(&self, name: &str) -> Option<ClipHandle> {
        self.clips
            .iter()
            .find(|(_, c)| c.name() == name)
            .map(|(h, _)| h)
    }

    /// First unused name of the form `<track>.<n>`
    pub fn new_clip_name(&self) -> String {
        unused_name(&self.clips, &self.name)
    }

    /// First unused name of the form `<original>.<n>`
    pub fn make_clip_copy_name(&self, original: &str) -> String {
        unused_name(&self.clips, original)
    }

    /// True when no clip has samples in `[t0, t1)`
    pub fn is_empty_range(&self, t0: f64, t1: f64) -> bool {
        !self
            .clips
            .iter()
            .any(|(_, c)| !c.is_empty() && c.start_time() < t1 && c.end_time() > t0)
    }

    /// Total number of samples held by all clips
    pub fn play_samples_count(&self) -> u64 {
        self.clips.iter().map(|(_, c)| c.num_samples()).sum()
    }

    // ========================================================================
    // Clip creation
    // ========================================================================

    /// Add an empty clip at `offset`
    pub fn create_clip(&mut self, offset: f64, name: Option<&str>) -> ClipHandle {
        let mut clip = Clip::new(
            Arc::clone(&self.factory),
            self.n_channels,
            self.rate,
            self.format,
            offset,
        );
        clip.set_name(name.map_or_else(|| self.new_clip_name(), str::to_string));
        self.clips.insert(clip)
    }

    /// The clip starting last, if any
    pub fn rightmost_clip(&self) -> Option<ClipHandle> {
        self.sorted_clips().last().map(|(h, _)| *h)
    }

    /// The clip starting last, creating an empty one at zero if there is none
    pub fn rightmost_or_new_clip(&mut self) -> ClipHandle {
        match self.rightmost_clip() {
            Some(handle) => handle,
            None => self.create_clip(0.0, None),
        }
    }

    // ========================================================================
    // Block sizing
    // ========================================================================

    /// Largest block any clip's store will allocate
    pub fn max_block_size(&self) -> usize {
        self.clips
            .iter()
            .map(|(_, c)| c.max_block_size())
            .max()
            .unwrap_or_else(|| self.factory.max_block_samples())
    }

    pub fn ideal_block_size(&self) -> usize {
        self.max_block_size()
    }

    /// Read size at track sample `s` that stays within one storage block
    pub fn best_block_size(&self, s: SampleCount) -> usize {
        self.clips
            .iter()
            .find(|(_, c)| s >= c.start_sample() && s < c.end_sample())
            .map(|(_, c)| c.best_block_size((s - c.start_sample()) as u64))
            .unwrap_or_else(|| self.max_block_size())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Random-access read of `len` samples
    ///
    /// Reads one buffer per channel from `channel` on. Samples outside all
    /// clips are zero. Backward reads return `start - 1` down to
    /// `start - len`. Returns the number of samples that came from clips.
    pub fn read(
        &self,
        channel: usize,
        buffers: &mut [&mut [f32]],
        start: SampleCount,
        len: usize,
        backwards: bool,
    ) -> Result<usize> {
        if channel + buffers.len() > self.n_channels {
            return Err(ClipstreamError::InvalidParameter {
                param: "channel".to_string(),
                value: format!(
                    "{}..{} of {}",
                    channel,
                    channel + buffers.len(),
                    self.n_channels
                ),
            });
        }

        let first = if backwards { start - len as SampleCount } else { start };
        let last = first + len as SampleCount;
        for buffer in buffers.iter_mut() {
            buffer[..len].fill(0.0);
        }

        let mut copied = 0;
        // Latest first so that an earlier clip wins where two overlap
        for (_, clip) in self.sorted_clips().into_iter().rev() {
            let lo = first.max(clip.start_sample());
            let hi = last.min(clip.end_sample());
            if hi <= lo {
                continue;
            }
            let local = (lo - clip.start_sample()) as u64;
            let (from, to) = if backwards {
                ((last - hi) as usize, (last - lo) as usize)
            } else {
                ((lo - first) as usize, (hi - first) as usize)
            };
            for (i, buffer) in buffers.iter_mut().enumerate() {
                let dest = &mut buffer[from..to];
                clip.get_samples(channel + i, local, dest)?;
                if backwards {
                    dest.reverse();
                }
            }
            copied += (hi - lo) as usize;
        }
        Ok(copied.min(len))
    }

    /// Per-sample envelope gain, 1.0 outside clips
    pub fn envelope_values(&self, buffer: &mut [f64], t0: f64, backwards: bool) {
        let rate = self.rate as f64;
        let clips = self.sorted_clips();
        for (i, out) in buffer.iter_mut().enumerate() {
            let t = if backwards {
                t0 - (i + 1) as f64 / rate
            } else {
                t0 + i as f64 / rate
            };
            *out = clips
                .iter()
                .find(|(_, c)| c.contains_time(t))
                .map_or(1.0, |(_, c)| c.envelope_value(t));
        }
    }

    pub fn has_trivial_envelope(&self) -> bool {
        self.clips.iter().all(|(_, c)| c.has_trivial_envelope())
    }

    /// Widest format among the clips, or the track format without clips
    pub fn widest_effective_format(&self) -> SampleFormat {
        self.clips
            .iter()
            .map(|(_, c)| c.format())
            .max()
            .unwrap_or(self.format)
    }

    /// Minimum and maximum sample of `channel` within `[t0, t1)`
    ///
    /// Gaps do not contribute; a range without clip samples yields `(0, 0)`.
    pub fn min_max(&self, channel: usize, t0: f64, t1: f64) -> Result<(f32, f32)> {
        let mut range: Option<(f32, f32)> = None;
        self.for_each_range(channel, t0, t1, |samples| {
            for &s in samples {
                range = Some(match range {
                    Some((lo, hi)) => (lo.min(s), hi.max(s)),
                    None => (s, s),
                });
            }
        })?;
        Ok(range.unwrap_or((0.0, 0.0)))
    }

    /// Root mean square of the clip samples of `channel` within `[t0, t1)`
    pub fn rms(&self, channel: usize, t0: f64, t1: f64) -> Result<f32> {
        let mut sum = 0.0_f64;
        let mut count = 0_u64;
        self.for_each_range(channel, t0, t1, |samples| {
            sum += samples.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>();
            count += samples.len() as u64;
        })?;
        if count == 0 {
            return Ok(0.0);
        }
        Ok((sum / count as f64).sqrt() as f32)
    }

    fn for_each_range(
        &self,
        channel: usize,
        t0: f64,
        t1: f64,
        mut visit: impl FnMut(&[f32]),
    ) -> Result<()> {
        if t0 > t1 || !t0.is_finite() || !t1.is_finite() {
            return Err(ClipstreamError::InvalidTimeRange { t0, t1 });
        }
        let s0 = time_to_samples(t0, self.rate);
        let s1 = time_to_samples(t1, self.rate);
        for (_, clip) in self.clips.iter() {
            let lo = s0.max(clip.start_sample());
            let hi = s1.min(clip.end_sample());
            if hi <= lo {
                continue;
            }
            let mut samples = vec![0.0; (hi - lo) as usize];
            clip.get_samples(channel, (lo - clip.start_sample()) as u64, &mut samples)?;
            visit(&samples);
        }
        Ok(())
    }

    // ========================================================================
    // Rate and format
    // ========================================================================

    /// Resample every clip to `rate`, rewriting storage
    pub fn resample(&mut self, rate: u32) -> Result<()> {
        let mut clips = self.clips.clone();
        for (_, clip) in clips.iter_mut() {
            clip.resample(rate)?;
        }
        self.clips = clips;
        self.rate = rate;
        debug!("Resampled track '{}' to {} Hz", self.name, rate);
        Ok(())
    }

    /// Change the rate without rewriting samples; clips change duration
    pub fn set_rate(&mut self, rate: u32) {
        if rate == 0 {
            return;
        }
        for (_, clip) in self.clips.iter_mut() {
            clip.set_rate(rate);
        }
        self.rate = rate;
    }

    /// Re-encode every clip in `format`
    pub fn convert_to_format(&mut self, format: SampleFormat) -> Result<()> {
        let mut clips = self.clips.clone();
        for (_, clip) in clips.iter_mut() {
            clip.convert_to_format(format)?;
        }
        self.clips = clips;
        self.format = format;
        Ok(())
    }
}

fn sorted(clips: &ClipArena<Clip>) -> Vec<(ClipHandle, &Clip)> {
    let mut sorted: Vec<(ClipHandle, &Clip)> = clips.iter().collect();
    sorted.sort_by(|a, b| a.1.start_time().total_cmp(&b.1.start_time()).then(a.0.cmp(&b.0)));
    sorted
}

fn unused_name(clips: &ClipArena<Clip>, base: &str) -> String {
    (1..)
        .map(|n| format!("{}.{}", base, n))
        .find(|candidate| !clips.iter().any(|(_, c)| c.name() == candidate))
        .unwrap_or_else(|| base.to_string())
}

impl PlayableSequence for Track {
    fn n_channels(&self) -> usize {
        self.n_channels
    }

    fn channel_gain(&self, channel: usize) -> f32 {
        Track::channel_gain(self, channel)
    }

    fn start_time(&self) -> f64 {
        Track::start_time(self)
    }

    fn end_time(&self) -> f64 {
        Track::end_time(self)
    }

    fn rate(&self) -> u32 {
        self.rate
    }

    fn widest_effective_format(&self) -> SampleFormat {
        Track::widest_effective_format(self)
    }

    fn has_trivial_envelope(&self) -> bool {
        Track::has_trivial_envelope(self)
    }

    fn envelope_values(&self, buffer: &mut [f64], t0: f64, backwards: bool) {
        Track::envelope_values(self, buffer, t0, backwards)
    }

    fn get(
        &mut self,
        channel: usize,
        buffers: &mut [&mut [f32]],
        start: SampleCount,
        len: usize,
        backwards: bool,
    ) -> Result<usize> {
        self.read(channel, buffers, start, len, backwards)
    }

    fn solo(&self) -> bool {
        self.solo
    }

    fn mute(&self) -> bool {
        self.mute
    }
}

impl ClipSource for Track {
    fn clip_spans(&self) -> Vec<ClipSpan> {
        self.clips
            .iter()
            .filter(|(_, c)| !c.is_empty())
            .map(|(handle, c)| ClipSpan {
                handle,
                start: c.start_sample(),
                len: c.num_samples(),
            })
            .collect()
    }

    fn read_clip(
        &self,
        handle: ClipHandle,
        buffers: &mut [&mut [f32]],
        offset: SampleCount,
        len: usize,
        backwards: bool,
    ) -> Result<()> {
        self.clip(handle)?.read(buffers, offset, len, backwards)
    }
}
