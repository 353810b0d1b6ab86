//! Clips
//!
//! A [`Clip`] is a contiguous, time-positioned run of samples with one
//! block [`Sequence`] per channel and its own gain [`Envelope`]. The clip
//! stores its start time and sample count; the end time is always derived
//! from the two so they cannot drift apart.

pub mod envelope;
pub mod sequence;

use std::sync::Arc;

use crate::engine::resample::resample_linear;
use crate::error::{ClipstreamError, Result};
use crate::sequence::{time_to_samples, PlaybackDirection, SampleCount};
use crate::storage::{SampleBlockFactory, SampleFormat};

pub use envelope::{EnvPoint, Envelope};
pub use sequence::{SeqBlock, Sequence};

/// How a clip read treats a range with no overlap with the clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Fail with `OutOfRange` when nothing in the range is covered
    #[default]
    Hard,
    /// Zero-fill whatever the clip does not cover
    Soft,
}

/// A contiguous run of samples placed on a track's timeline
#[derive(Debug, Clone)]
pub struct Clip {
    name: String,
    start: f64,
    rate: u32,
    channels: Vec<Sequence>,
    envelope: Envelope,
}

impl Clip {
    /// Create an empty clip
    ///
    /// # Panics
    /// Panics if `n_channels` or `rate` is zero
    pub fn new(
        factory: Arc<dyn SampleBlockFactory>,
        n_channels: usize,
        rate: u32,
        format: SampleFormat,
        start: f64,
    ) -> Self {
        assert!(n_channels > 0, "a clip needs at least one channel");
        assert!(rate > 0, "a clip needs a non-zero sample rate");
        let channels = (0..n_channels)
            .map(|_| Sequence::new(Arc::clone(&factory), format))
            .collect();
        Self {
            name: String::new(),
            start,
            rate,
            channels,
            envelope: Envelope::default(),
        }
    }

    /// Create a clip holding a copy of `samples`, one slice per channel
    pub fn from_samples(
        factory: Arc<dyn SampleBlockFactory>,
        format: SampleFormat,
        rate: u32,
        start: f64,
        samples: &[&[f32]],
    ) -> Result<Self> {
        if samples.is_empty() || rate == 0 {
            return Err(ClipstreamError::InvalidParameter {
                param: "channels".to_string(),
                value: format!("{} channels at {} Hz", samples.len(), rate),
            });
        }
        let mut clip = Clip::new(factory, samples.len(), rate, format, start);
        clip.append(samples)?;
        Ok(clip)
    }

    /// Assemble a clip from existing sequences
    ///
    /// All sequences must have the same length and format.
    pub fn from_parts(
        name: String,
        start: f64,
        rate: u32,
        channels: Vec<Sequence>,
        envelope: Envelope,
    ) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(ClipstreamError::InvalidParameter {
                param: "channels".to_string(),
                value: "0".to_string(),
            });
        };
        if rate == 0 {
            return Err(ClipstreamError::InvalidParameter {
                param: "rate".to_string(),
                value: rate.to_string(),
            });
        }
        let (len, format) = (first.num_samples(), first.format());
        if let Some(odd) = channels
            .iter()
            .find(|s| s.num_samples() != len || s.format() != format)
        {
            return Err(ClipstreamError::IncompatibleFormat {
                details: format!(
                    "channel holds {} {} samples, expected {} {} samples",
                    odd.num_samples(),
                    odd.format(),
                    len,
                    format
                ),
            });
        }
        Ok(Self {
            name,
            start,
            rate,
            channels,
            envelope,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Storage format shared by every channel
    pub fn format(&self) -> SampleFormat {
        self.channels[0].format()
    }

    /// Number of samples per channel
    pub fn num_samples(&self) -> u64 {
        self.channels[0].num_samples()
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    pub fn start_time(&self) -> f64 {
        self.start
    }

    /// Start time plus sample count at the clip's rate
    pub fn end_time(&self) -> f64 {
        self.start + self.duration()
    }

    pub fn duration(&self) -> f64 {
        self.num_samples() as f64 / self.rate as f64
    }

    /// Track sample position of the first sample
    pub fn start_sample(&self) -> SampleCount {
        time_to_samples(self.start, self.rate)
    }

    /// Track sample position one past the last sample
    pub fn end_sample(&self) -> SampleCount {
        self.start_sample() + self.num_samples() as SampleCount
    }

    /// Position of time `t` relative to the first sample, possibly negative
    pub fn local_index(&self, t: f64) -> SampleCount {
        time_to_samples(t, self.rate) - self.start_sample()
    }

    /// True if `t` falls on a sample of this clip
    pub fn contains_time(&self, t: f64) -> bool {
        let s = self.local_index(t);
        s >= 0 && (s as u64) < self.num_samples()
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    pub fn sequence(&self, channel: usize) -> Option<&Sequence> {
        self.channels.get(channel)
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.channels
    }

    pub fn best_block_size(&self, local: u64) -> usize {
        self.channels[0].best_block_size(local)
    }

    pub fn max_block_size(&self) -> usize {
        self.channels[0].max_block_size()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Hard read of one channel starting at clip-local sample `local`
    pub fn get_samples(&self, channel: usize, local: u64, dest: &mut [f32]) -> Result<()> {
        self.channel(channel)?.get(local, dest)
    }

    fn channel(&self, channel: usize) -> Result<&Sequence> {
        self.channels
            .get(channel)
            .ok_or_else(|| ClipstreamError::InvalidParameter {
                param: "channel".to_string(),
                value: format!("{} of {}", channel, self.channels.len()),
            })
    }

    /// Read `len` samples of every channel in `buffers` at clip-local `offset`
    ///
    /// Forward reads cover `offset..offset + len`. Backward reads cover
    /// `offset - len..offset` and are written latest sample first.
    pub fn read(
        &self,
        buffers: &mut [&mut [f32]],
        offset: SampleCount,
        len: usize,
        backwards: bool,
    ) -> Result<()> {
        if buffers.len() > self.channels.len() {
            return Err(ClipstreamError::InvalidParameter {
                param: "channels".to_string(),
                value: format!("{} requested, clip has {}", buffers.len(), self.channels.len()),
            });
        }
        let first = if backwards { offset - len as SampleCount } else { offset };
        let available = self.num_samples();
        if first < 0 || (first as u64) + len as u64 > available {
            return Err(ClipstreamError::OutOfRange {
                start: first,
                len,
                available,
            });
        }
        for (buffer, sequence) in buffers.iter_mut().zip(&self.channels) {
            let dest = &mut buffer[..len];
            sequence.get(first as u64, dest)?;
            if backwards {
                dest.reverse();
            }
        }
        Ok(())
    }

    /// Read `len` samples of one channel at track time `t`
    ///
    /// Backward reads return the samples before `t`, latest first. Parts of
    /// the range outside the clip are zero. A [`ReadMode::Hard`] read that
    /// does not touch the clip at all fails with `OutOfRange`.
    pub fn sample_range(
        &self,
        channel: usize,
        t: f64,
        len: usize,
        direction: PlaybackDirection,
        mode: ReadMode,
    ) -> Result<Vec<f32>> {
        let sequence = self.channel(channel)?;
        let mut out = vec![0.0; len];
        if len == 0 {
            return Ok(out);
        }

        let s = self.local_index(t);
        let first = match direction {
            PlaybackDirection::Forward => s,
            PlaybackDirection::Backward => s - len as SampleCount,
        };
        let last = first + len as SampleCount;
        let n = self.num_samples() as SampleCount;
        let lo = first.max(0);
        let hi = last.min(n);

        if hi <= lo {
            if mode == ReadMode::Hard {
                return Err(ClipstreamError::OutOfRange {
                    start: first,
                    len,
                    available: n as u64,
                });
            }
        } else {
            let from = (lo - first) as usize;
            let to = (hi - first) as usize;
            sequence.get(lo as u64, &mut out[from..to])?;
        }

        if direction.is_backward() {
            out.reverse();
        }
        Ok(out)
    }

    pub fn has_trivial_envelope(&self) -> bool {
        self.envelope.is_trivial()
    }

    /// Envelope gain at track time `t`
    pub fn envelope_value(&self, t: f64) -> f64 {
        if self.envelope.is_trivial() {
            return 1.0;
        }
        self.envelope.value_at(t - self.start)
    }

    // ========================================================================
    // Mutators
    // ========================================================================

    pub fn set_start(&mut self, t: f64) {
        self.start = t;
    }

    /// Move the clip along the timeline
    pub fn offset(&mut self, dt: f64) {
        self.start += dt;
    }

    /// Split at track time `t`, keeping `[start, t)` and returning `[t, end)`
    ///
    /// The halves partition the samples exactly. The returned clip starts
    /// where this clip now ends and carries this clip's name.
    pub fn split_at(&mut self, t: f64) -> Result<Clip> {
        let s = self.local_index(t);
        if s <= 0 || s as u64 >= self.num_samples() {
            return Err(ClipstreamError::InvalidTimeRange {
                t0: self.start,
                t1: t,
            });
        }

        let mut left = self.channels.clone();
        let mut right = Vec::with_capacity(left.len());
        for sequence in &mut left {
            right.push(sequence.split_off(s as u64)?);
        }
        let right_offset = s as f64 / self.rate as f64;
        let right_envelope = self.envelope.split_off(right_offset);

        self.channels = left;
        Ok(Clip {
            name: self.name.clone(),
            start: self.start + right_offset,
            rate: self.rate,
            channels: right,
            envelope: right_envelope,
        })
    }

    /// Append every sample of `other` after this clip's last sample
    ///
    /// The result takes the wider of the two sample formats.
    ///
    /// # Errors
    /// `IncompatibleFormat` if the rates or channel counts differ.
    pub fn append_clip(&mut self, other: &Clip) -> Result<()> {
        if other.rate != self.rate || other.n_channels() != self.n_channels() {
            return Err(ClipstreamError::IncompatibleFormat {
                details: format!(
                    "cannot append {} ch @ {} Hz to {} ch @ {} Hz",
                    other.n_channels(),
                    other.rate,
                    self.n_channels(),
                    self.rate
                ),
            });
        }

        let format = self.format().max(other.format());
        let mut channels = Vec::with_capacity(self.channels.len());
        for (sequence, tail) in self.channels.iter().zip(&other.channels) {
            let mut sequence = sequence.convert(format)?;
            sequence.append_sequence(tail)?;
            channels.push(sequence);
        }
        let mut envelope = self.envelope.clone();
        envelope.append(&other.envelope, self.duration());

        self.channels = channels;
        self.envelope = envelope;
        Ok(())
    }

    /// Append samples to every channel; all slices must have equal length
    pub fn append(&mut self, samples: &[&[f32]]) -> Result<()> {
        let len = samples.first().map_or(0, |s| s.len());
        if samples.len() != self.channels.len() || samples.iter().any(|s| s.len() != len) {
            return Err(ClipstreamError::InvalidParameter {
                param: "samples".to_string(),
                value: format!(
                    "{} ragged or mismatched channels for a {} channel clip",
                    samples.len(),
                    self.channels.len()
                ),
            });
        }
        let mut channels = self.channels.clone();
        for (sequence, data) in channels.iter_mut().zip(samples) {
            sequence.append(data)?;
        }
        self.channels = channels;
        Ok(())
    }

    /// Append `len` zero samples to every channel
    pub fn append_silence(&mut self, len: usize) -> Result<()> {
        let zeros = vec![0.0; len];
        let samples: Vec<&[f32]> = self.channels.iter().map(|_| zeros.as_slice()).collect();
        self.append(&samples)
    }

    /// Rewrite the samples at a new rate, keeping start time and duration
    pub fn resample(&mut self, rate: u32) -> Result<()> {
        if rate == 0 {
            return Err(ClipstreamError::InvalidParameter {
                param: "rate".to_string(),
                value: rate.to_string(),
            });
        }
        if rate == self.rate {
            return Ok(());
        }
        let ratio = rate as f64 / self.rate as f64;
        let mut channels = Vec::with_capacity(self.channels.len());
        for sequence in &self.channels {
            let samples = resample_linear(&sequence.read_all()?, ratio);
            channels.push(Sequence::with_samples(
                Arc::clone(sequence.factory()),
                sequence.format(),
                &samples,
            )?);
        }
        self.channels = channels;
        self.rate = rate;
        Ok(())
    }

    /// Reinterpret the stored samples at a new rate without rewriting them
    pub fn set_rate(&mut self, rate: u32) {
        if rate > 0 {
            self.rate = rate;
        }
    }

    /// Re-encode every channel in `format`
    pub fn convert_to_format(&mut self, format: SampleFormat) -> Result<()> {
        let channels = self
            .channels
            .iter()
            .map(|s| s.convert(format))
            .collect::<Result<Vec<_>>>()?;
        self.channels = channels;
        Ok(())
    }

    /// Drop every sample before track time `t`
    pub fn clear_left(&mut self, t: f64) -> Result<()> {
        let s = self.local_index(t);
        if s <= 0 {
            return Ok(());
        }
        let s = (s as u64).min(self.num_samples());

        let mut channels = self.channels.clone();
        for sequence in &mut channels {
            *sequence = sequence.split_off(s)?;
        }
        let cut = s as f64 / self.rate as f64;
        let envelope = self.envelope.split_off(cut);

        self.channels = channels;
        self.envelope = envelope;
        self.start += cut;
        Ok(())
    }

    /// Drop every sample at or after track time `t`
    pub fn clear_right(&mut self, t: f64) -> Result<()> {
        let s = self.local_index(t);
        if s >= self.num_samples() as SampleCount {
            return Ok(());
        }
        let s = s.max(0) as u64;

        let mut channels = self.channels.clone();
        for sequence in &mut channels {
            sequence.split_off(s)?;
        }
        self.envelope.split_off(s as f64 / self.rate as f64);
        self.channels = channels;
        Ok(())
    }
}
