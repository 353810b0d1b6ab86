//! Live recording into a track
//!
//! A [`Recorder`] can be handed to a capture thread while the track stays
//! with the editor. Captured samples collect in a shared pending buffer;
//! [`Track::flush`] moves them into the rightmost clip as one edit.

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};

use super::Track;
use crate::clip::Clip;
use crate::error::{ClipstreamError, Result};

/// Samples captured but not yet committed to a clip
///
/// `pending` is the append section and is only held for short copies.
/// `flush_section` spans a whole flush, from taking the pending samples to
/// committing or restoring them, and is shared with
/// [`Recorder::discard_pending`] so a discard never lands in the middle of
/// a flush.
#[derive(Debug)]
pub struct RecordingBuffer {
    n_channels: usize,
    flush_threshold: usize,
    pending: Mutex<Vec<Vec<f32>>>,
    flush_section: Mutex<()>,
}

impl RecordingBuffer {
    pub(crate) fn new(n_channels: usize, flush_threshold: usize) -> Self {
        Self {
            n_channels,
            flush_threshold: flush_threshold.max(1),
            pending: Mutex::new(vec![Vec::new(); n_channels]),
            flush_section: Mutex::new(()),
        }
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// Pending length at which a flush is advised
    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// Samples per channel waiting to be flushed
    pub fn pending_samples(&self) -> usize {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.first().map_or(0, Vec::len)
    }

    fn push(&self, samples: &[&[f32]]) -> Result<usize> {
        let len = samples.first().map_or(0, |s| s.len());
        if samples.len() != self.n_channels || samples.iter().any(|s| s.len() != len) {
            return Err(ClipstreamError::InvalidParameter {
                param: "samples".to_string(),
                value: format!(
                    "{} ragged or mismatched channels for a {} channel track",
                    samples.len(),
                    self.n_channels
                ),
            });
        }
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for (channel, data) in pending.iter_mut().zip(samples) {
            channel.extend_from_slice(data);
        }
        Ok(pending[0].len())
    }

    fn take(&self) -> Vec<Vec<f32>> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *pending, vec![Vec::new(); self.n_channels])
    }

    /// Put samples taken by a failed flush back in front of anything
    /// appended since
    fn restore(&self, taken: Vec<Vec<f32>>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for (channel, mut head) in pending.iter_mut().zip(taken) {
            head.append(channel);
            *channel = head;
        }
    }
}

/// Capture-side handle to a track's pending buffer
#[derive(Debug, Clone)]
pub struct Recorder {
    buffer: Arc<RecordingBuffer>,
}

impl Recorder {
    /// Queue captured samples, one slice per channel
    ///
    /// # Returns
    /// `true` once enough samples are pending that the owner should flush
    pub fn append(&self, samples: &[&[f32]]) -> Result<bool> {
        let pending = self.buffer.push(samples)?;
        Ok(pending >= self.buffer.flush_threshold)
    }

    pub fn pending_samples(&self) -> usize {
        self.buffer.pending_samples()
    }

    /// Drop every pending sample, waiting for an in-flight flush first
    ///
    /// # Returns
    /// Number of samples per channel dropped
    pub fn discard_pending(&self) -> usize {
        let _section = self
            .buffer
            .flush_section
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let dropped = self.buffer.take();
        dropped.first().map_or(0, Vec::len)
    }

    pub fn n_channels(&self) -> usize {
        self.buffer.n_channels
    }
}

impl Track {
    /// Handle for appending captured samples from another thread
    pub fn recorder(&self) -> Recorder {
        Recorder {
            buffer: Arc::clone(&self.recording),
        }
    }

    pub fn pending_samples(&self) -> usize {
        self.recording.pending_samples()
    }

    /// Commit pending samples to the end of the rightmost clip
    ///
    /// Creates a clip at time zero when the track has none. Readers never
    /// observe a partially flushed clip. On failure the samples stay pending.
    /// Runs inside the flush section, so a `Recorder` discarding on another
    /// thread waits until the flush has committed or restored its samples.
    ///
    /// # Returns
    /// Number of samples per channel committed
    pub fn flush(&mut self) -> Result<usize> {
        let buffer = Arc::clone(&self.recording);
        let _section = buffer
            .flush_section
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let taken = buffer.take();
        let len = taken.first().map_or(0, Vec::len);
        if len == 0 {
            return Ok(0);
        }

        match self.commit_recorded(&taken) {
            Ok(()) => {
                debug!("Flushed {} recorded samples into '{}'", len, self.name);
                Ok(len)
            }
            Err(e) => {
                warn!("Flush failed, keeping {} samples pending: {}", len, e);
                buffer.restore(taken);
                Err(e)
            }
        }
    }

    fn commit_recorded(&mut self, samples: &[Vec<f32>]) -> Result<()> {
        let slices: Vec<&[f32]> = samples.iter().map(Vec::as_slice).collect();
        match self.rightmost_clip() {
            Some(handle) => {
                let mut clip = self.clip(handle)?.clone();
                clip.append(&slices)?;
                self.clips.replace(handle, clip);
            }
            None => {
                let mut clip = Clip::new(
                    Arc::clone(&self.factory),
                    self.n_channels,
                    self.rate,
                    self.format,
                    0.0,
                );
                clip.set_name(self.new_clip_name());
                clip.append(&slices)?;
                self.clips.insert(clip);
            }
        }
        Ok(())
    }
}
