//! Segment provider
//!
//! Turns a clip set, a start position and a direction into a lazy sequence
//! of [`Segment`]s. Drained in order, the segments reproduce the stream
//! sample for sample: clip data where a clip covers the timeline, silence
//! in the gaps between clips. The sequence ends after the last clip in the
//! direction of travel.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sequence::{ClipSource, PlaybackDirection, SampleCount};
use crate::track::ClipHandle;

/// A clip's extent on the track's sample timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipSpan {
    pub handle: ClipHandle,
    /// Track sample position of the first sample
    pub start: SampleCount,
    /// Number of samples
    pub len: u64,
}

impl ClipSpan {
    /// Track sample position one past the last sample
    pub fn end(&self) -> SampleCount {
        self.start + self.len as SampleCount
    }
}

/// A span after overlap trimming; `local` is the clip index of `start`
#[derive(Debug, Clone, Copy)]
struct Span {
    handle: ClipHandle,
    start: SampleCount,
    local: SampleCount,
    len: u64,
}

impl Span {
    fn end(&self) -> SampleCount {
        self.start + self.len as SampleCount
    }
}

// ============================================================================
// Segments
// ============================================================================

/// Reads up to `remaining` samples from one clip
pub struct ClipSegment<'a, C: ?Sized> {
    source: &'a C,
    handle: ClipHandle,
    position: SampleCount,
    remaining: u64,
    direction: PlaybackDirection,
}

impl<C: ClipSource + ?Sized> ClipSegment<'_, C> {
    fn get_floats(&mut self, buffers: &mut [&mut [f32]], len: usize) -> Result<usize> {
        let n = (len as u64).min(self.remaining) as usize;
        if n == 0 {
            return Ok(0);
        }
        let mut views: Vec<&mut [f32]> = buffers.iter_mut().map(|b| &mut b[..n]).collect();
        self.source.read_clip(
            self.handle,
            &mut views,
            self.position,
            n,
            self.direction.is_backward(),
        )?;
        self.position += n as SampleCount * self.direction.sign();
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl<C: ?Sized> fmt::Debug for ClipSegment<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipSegment")
            .field("handle", &self.handle)
            .field("position", &self.position)
            .field("remaining", &self.remaining)
            .field("direction", &self.direction)
            .finish()
    }
}

/// Emits `remaining` zero samples
#[derive(Debug, Clone, Copy)]
pub struct SilenceSegment {
    remaining: u64,
}

impl SilenceSegment {
    pub fn new(len: u64) -> Self {
        Self { remaining: len }
    }

    fn get_floats(&mut self, buffers: &mut [&mut [f32]], len: usize) -> usize {
        let n = (len as u64).min(self.remaining) as usize;
        for buffer in buffers.iter_mut() {
            buffer[..n].fill(0.0);
        }
        self.remaining -= n as u64;
        n
    }
}

/// One contiguous readable span of the output stream
pub enum Segment<'a, C: ?Sized> {
    Clip(ClipSegment<'a, C>),
    Silence(SilenceSegment),
}

impl<C: ClipSource + ?Sized> Segment<'_, C> {
    /// Write up to `len` samples to the front of each buffer
    ///
    /// Returns zero only once the segment is exhausted.
    pub fn get_floats(&mut self, buffers: &mut [&mut [f32]], len: usize) -> Result<usize> {
        match self {
            Segment::Clip(segment) => segment.get_floats(buffers, len),
            Segment::Silence(segment) => Ok(segment.get_floats(buffers, len)),
        }
    }
}

impl<C: ?Sized> Segment<'_, C> {
    /// Samples left to read
    pub fn remaining(&self) -> u64 {
        match self {
            Segment::Clip(segment) => segment.remaining,
            Segment::Silence(segment) => segment.remaining,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn is_silence(&self) -> bool {
        matches!(self, Segment::Silence(_))
    }
}

impl<C: ?Sized> fmt::Debug for Segment<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Clip(segment) => fmt::Debug::fmt(segment, f),
            Segment::Silence(segment) => fmt::Debug::fmt(segment, f),
        }
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Builds segment sequences over one clip source
///
/// Spans are snapshotted and overlap-trimmed at construction: where two
/// clips overlap, the one starting earlier wins.
pub struct SegmentProvider<'a, C: ?Sized> {
    source: &'a C,
    spans: Arc<[Span]>,
}

impl<'a, C: ClipSource + ?Sized> SegmentProvider<'a, C> {
    pub fn new(source: &'a C) -> Self {
        let mut spans: Vec<ClipSpan> = source
            .clip_spans()
            .into_iter()
            .filter(|s| s.len > 0)
            .collect();
        spans.sort_by_key(|s| s.start);

        let mut trimmed = Vec::with_capacity(spans.len());
        let mut covered: Option<SampleCount> = None;
        for span in spans {
            let skip = covered.map_or(0, |end| (end - span.start).max(0)) as u64;
            if skip >= span.len {
                continue;
            }
            trimmed.push(Span {
                handle: span.handle,
                start: span.start + skip as SampleCount,
                local: skip as SampleCount,
                len: span.len - skip,
            });
            covered = Some(span.end());
        }

        Self {
            source,
            spans: trimmed.into(),
        }
    }

    /// Clip spans in time order, as the segments will see them
    pub fn spans(&self) -> Vec<ClipSpan> {
        self.spans
            .iter()
            .map(|s| ClipSpan {
                handle: s.handle,
                start: s.start,
                len: s.len,
            })
            .collect()
    }

    /// Lazily walk the stream from `start` in `direction`
    ///
    /// Backward sequences begin with the sample just before `start`.
    pub fn create_sequence(
        &self,
        start: SampleCount,
        direction: PlaybackDirection,
    ) -> SegmentSequence<'a, C> {
        let next = match direction {
            PlaybackDirection::Forward => self.spans.partition_point(|s| s.end() <= start),
            PlaybackDirection::Backward => self.spans.partition_point(|s| s.start < start),
        };
        SegmentSequence {
            source: self.source,
            spans: Arc::clone(&self.spans),
            direction,
            position: start,
            next,
        }
    }
}

/// Lazy iterator of segments
///
/// Forward, `next` indexes the next span to visit. Backward, it counts the
/// spans still to visit, so the next one is `next - 1`.
pub struct SegmentSequence<'a, C: ?Sized> {
    source: &'a C,
    spans: Arc<[Span]>,
    direction: PlaybackDirection,
    position: SampleCount,
    next: usize,
}

impl<C: ?Sized> SegmentSequence<'_, C> {
    pub fn direction(&self) -> PlaybackDirection {
        self.direction
    }
}

impl<'a, C: ClipSource + ?Sized> Iterator for SegmentSequence<'a, C> {
    type Item = Segment<'a, C>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.direction {
            PlaybackDirection::Forward => {
                let span = *self.spans.get(self.next)?;
                if self.position < span.start {
                    let gap = (span.start - self.position) as u64;
                    self.position = span.start;
                    return Some(Segment::Silence(SilenceSegment::new(gap)));
                }
                let offset = self.position - span.start;
                self.position = span.end();
                self.next += 1;
                Some(Segment::Clip(ClipSegment {
                    source: self.source,
                    handle: span.handle,
                    position: span.local + offset,
                    remaining: span.len - offset as u64,
                    direction: self.direction,
                }))
            }
            PlaybackDirection::Backward => {
                let span = *self.spans.get(self.next.checked_sub(1)?)?;
                if self.position > span.end() {
                    let gap = (self.position - span.end()) as u64;
                    self.position = span.end();
                    return Some(Segment::Silence(SilenceSegment::new(gap)));
                }
                let offset = self.position - span.start;
                self.position = span.start;
                self.next -= 1;
                Some(Segment::Clip(ClipSegment {
                    source: self.source,
                    handle: span.handle,
                    position: span.local + offset,
                    remaining: offset as u64,
                    direction: self.direction,
                }))
            }
        }
    }
}
