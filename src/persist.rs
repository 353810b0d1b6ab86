//! Tag-based persistence hooks
//!
//! A track describes itself to a [`TagWriter`] as nested tags carrying
//! typed attributes:
//!
//! ```text
//! track
//!   clip            (sorted by start time)
//!     sequence      (one per channel)
//!       block       (store identifier and length)
//!     envelope
//!       point
//! ```
//!
//! [`TrackReader`] consumes the same stream through [`TagHandler`] and
//! rebuilds the track against the block store the blocks live in.
//! [`TagRecorder`] captures a stream in memory so it can be inspected,
//! saved as JSON and replayed.

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clip::{Clip, Envelope, Sequence};
use crate::error::{ClipstreamError, Result};
use crate::sequence::PlayableSequence;
use crate::storage::{BlockId, SampleBlockFactory, SampleFormat};
use crate::track::{Track, TrackId};

const TRACK_TAG: &str = "track";
const CLIP_TAG: &str = "clip";
const SEQUENCE_TAG: &str = "sequence";
const BLOCK_TAG: &str = "block";
const ENVELOPE_TAG: &str = "envelope";
const POINT_TAG: &str = "point";

fn persistence(details: impl Into<String>) -> ClipstreamError {
    ClipstreamError::Persistence {
        details: details.into(),
    }
}

/// A typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AttrValue {
    fn kind(&self) -> &'static str {
        match self {
            AttrValue::Str(_) => "string",
            AttrValue::Int(_) => "integer",
            AttrValue::Float(_) => "float",
            AttrValue::Bool(_) => "boolean",
        }
    }

    fn mismatch(&self, expected: &str) -> ClipstreamError {
        persistence(format!("expected {} attribute, found {}", expected, self.kind()))
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            AttrValue::Str(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            AttrValue::Int(v) => Ok(*v),
            other => Err(other.mismatch("integer")),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            AttrValue::Float(v) => Ok(*v),
            other => Err(other.mismatch("float")),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            AttrValue::Bool(v) => Ok(*v),
            other => Err(other.mismatch("boolean")),
        }
    }

    fn as_u64(&self) -> Result<u64> {
        let value = self.as_int()?;
        u64::try_from(value).map_err(|_| persistence(format!("negative count {}", value)))
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

fn count_attr(value: impl TryInto<i64>) -> Result<AttrValue> {
    value
        .try_into()
        .map(AttrValue::Int)
        .map_err(|_| persistence("count does not fit a 64-bit attribute"))
}

/// Receives a tag stream from a writer
///
/// Attributes belong to the most recently started tag and must be written
/// before any child tag starts.
pub trait TagWriter {
    fn start_tag(&mut self, name: &str) -> Result<()>;

    fn write_attr(&mut self, name: &str, value: AttrValue) -> Result<()>;

    fn end_tag(&mut self, name: &str) -> Result<()>;
}

/// Consumes a tag stream; each start tag arrives with all of its attributes
pub trait TagHandler {
    fn handle_tag(&mut self, name: &str, attrs: &[(String, AttrValue)]) -> Result<()>;

    fn handle_end_tag(&mut self, name: &str) -> Result<()>;
}

/// One event of a recorded tag stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TagEvent {
    Start {
        name: String,
        attrs: Vec<(String, AttrValue)>,
    },
    End {
        name: String,
    },
}

/// In-memory tag stream with nesting checks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagRecorder {
    events: Vec<TagEvent>,
    open: Vec<String>,
}

impl TagRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a recorder from events, rejecting unbalanced nesting
    pub fn from_events(events: Vec<TagEvent>) -> Result<Self> {
        let mut recorder = Self::new();
        for event in events {
            match event {
                TagEvent::Start { name, attrs } => {
                    recorder.start_tag(&name)?;
                    for (key, value) in attrs {
                        recorder.write_attr(&key, value)?;
                    }
                }
                TagEvent::End { name } => recorder.end_tag(&name)?,
            }
        }
        if !recorder.is_complete() {
            return Err(persistence(format!(
                "tag stream ends with {} unclosed tag(s)",
                recorder.open.len()
            )));
        }
        Ok(recorder)
    }

    pub fn events(&self) -> &[TagEvent] {
        &self.events
    }

    /// True once at least one tag was written and every tag is closed
    pub fn is_complete(&self) -> bool {
        self.open.is_empty() && !self.events.is_empty()
    }

    /// Feed every event to `handler` in order
    pub fn replay<H: TagHandler + ?Sized>(&self, handler: &mut H) -> Result<()> {
        for event in &self.events {
            match event {
                TagEvent::Start { name, attrs } => handler.handle_tag(name, attrs)?,
                TagEvent::End { name } => handler.handle_end_tag(name)?,
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.events)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let events: Vec<TagEvent> = serde_json::from_str(json)?;
        Self::from_events(events)
    }
}

impl TagWriter for TagRecorder {
    fn start_tag(&mut self, name: &str) -> Result<()> {
        self.open.push(name.to_string());
        self.events.push(TagEvent::Start {
            name: name.to_string(),
            attrs: Vec::new(),
        });
        Ok(())
    }

    fn write_attr(&mut self, name: &str, value: AttrValue) -> Result<()> {
        match self.events.last_mut() {
            Some(TagEvent::Start { attrs, .. }) => {
                attrs.push((name.to_string(), value));
                Ok(())
            }
            _ => Err(persistence(format!(
                "attribute '{}' written outside a start tag",
                name
            ))),
        }
    }

    fn end_tag(&mut self, name: &str) -> Result<()> {
        match self.open.pop() {
            Some(open) if open == name => {
                self.events.push(TagEvent::End {
                    name: name.to_string(),
                });
                Ok(())
            }
            Some(open) => Err(persistence(format!(
                "end tag '{}' does not close '{}'",
                name, open
            ))),
            None => Err(persistence(format!("end tag '{}' with no open tag", name))),
        }
    }
}

// ============================================================================
// Writing
// ============================================================================

impl Track {
    /// Describe the track, its clips and their block references
    pub fn write_tags<W: TagWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.start_tag(TRACK_TAG)?;
        writer.write_attr("id", self.id().0.to_string().into())?;
        writer.write_attr("name", self.name().into())?;
        writer.write_attr("channels", count_attr(self.n_channels())?)?;
        writer.write_attr("rate", i64::from(self.rate()).into())?;
        writer.write_attr("format", self.format().as_str().into())?;
        writer.write_attr("gain", f64::from(self.gain()).into())?;
        writer.write_attr("pan", f64::from(self.pan()).into())?;
        writer.write_attr("color", count_attr(self.color())?)?;
        writer.write_attr("solo", self.solo().into())?;
        writer.write_attr("mute", self.mute().into())?;
        writer.write_attr("merge_tolerance", self.merge_tolerance().into())?;

        for (_, clip) in self.sorted_clips() {
            write_clip(writer, clip)?;
        }
        writer.end_tag(TRACK_TAG)
    }
}

fn write_clip<W: TagWriter + ?Sized>(writer: &mut W, clip: &Clip) -> Result<()> {
    writer.start_tag(CLIP_TAG)?;
    writer.write_attr("name", clip.name().into())?;
    writer.write_attr("offset", clip.start_time().into())?;
    writer.write_attr("rate", i64::from(clip.rate()).into())?;

    for (channel, sequence) in clip.sequences().iter().enumerate() {
        writer.start_tag(SEQUENCE_TAG)?;
        writer.write_attr("channel", count_attr(channel)?)?;
        writer.write_attr("format", sequence.format().as_str().into())?;
        writer.write_attr("samples", count_attr(sequence.num_samples())?)?;
        for block in sequence.blocks() {
            writer.start_tag(BLOCK_TAG)?;
            writer.write_attr("id", count_attr(block.id.0)?)?;
            writer.write_attr("len", count_attr(block.len)?)?;
            writer.end_tag(BLOCK_TAG)?;
        }
        writer.end_tag(SEQUENCE_TAG)?;
    }

    let envelope = clip.envelope();
    let (min, max) = envelope.range();
    writer.start_tag(ENVELOPE_TAG)?;
    writer.write_attr("min", min.into())?;
    writer.write_attr("max", max.into())?;
    writer.write_attr("default", envelope.default_value().into())?;
    for point in envelope.points() {
        writer.start_tag(POINT_TAG)?;
        writer.write_attr("t", point.t.into())?;
        writer.write_attr("value", point.value.into())?;
        writer.end_tag(POINT_TAG)?;
    }
    writer.end_tag(ENVELOPE_TAG)?;

    writer.end_tag(CLIP_TAG)
}

// ============================================================================
// Reading
// ============================================================================

fn required<'a>(tag: &str, attrs: &'a [(String, AttrValue)], name: &str) -> Result<&'a AttrValue> {
    optional(attrs, name).ok_or_else(|| persistence(format!("<{}> is missing '{}'", tag, name)))
}

fn optional<'a>(attrs: &'a [(String, AttrValue)], name: &str) -> Option<&'a AttrValue> {
    attrs.iter().find(|(key, _)| key == name).map(|(_, value)| value)
}

struct PendingClip {
    name: String,
    start: f64,
    rate: u32,
    channels: Vec<Sequence>,
    envelope: Envelope,
}

struct PendingSequence {
    format: SampleFormat,
    samples: u64,
    blocks: Vec<(BlockId, usize)>,
}

/// Rebuilds a [`Track`] from a tag stream
///
/// Blocks are looked up in `factory`, so the stream must come from a track
/// whose blocks live in the same store. Unknown tags are skipped.
#[derive(Default)]
pub struct TrackReader {
    factory: Option<Arc<dyn SampleBlockFactory>>,
    track: Option<Track>,
    clip: Option<PendingClip>,
    sequence: Option<PendingSequence>,
    envelope: Option<Envelope>,
    finished: bool,
}

impl TrackReader {
    pub fn new(factory: Arc<dyn SampleBlockFactory>) -> Self {
        Self {
            factory: Some(factory),
            ..Self::default()
        }
    }

    /// Replay a recorded stream and return the rebuilt track
    pub fn read(factory: Arc<dyn SampleBlockFactory>, recorder: &TagRecorder) -> Result<Track> {
        let mut reader = Self::new(factory);
        recorder.replay(&mut reader)?;
        reader.finish()
    }

    /// The rebuilt track
    ///
    /// # Errors
    /// `Persistence` unless exactly one complete track tag was handled
    pub fn finish(self) -> Result<Track> {
        if !self.finished || self.clip.is_some() || self.sequence.is_some() {
            return Err(persistence("tag stream ended before the track was closed"));
        }
        self.track
            .ok_or_else(|| persistence("tag stream holds no track"))
    }

    fn factory(&self) -> Result<Arc<dyn SampleBlockFactory>> {
        self.factory
            .clone()
            .ok_or_else(|| persistence("reader has no block store"))
    }

    fn start_track(&mut self, attrs: &[(String, AttrValue)]) -> Result<()> {
        if self.track.is_some() {
            return Err(persistence("more than one <track> in the stream"));
        }
        let id = required(TRACK_TAG, attrs, "id")?.as_str()?;
        let id = Uuid::parse_str(id).map_err(|e| persistence(format!("bad track id: {}", e)))?;
        let channels = required(TRACK_TAG, attrs, "channels")?.as_u64()?;
        let rate = required(TRACK_TAG, attrs, "rate")?.as_u64()?;
        let format = SampleFormat::parse(required(TRACK_TAG, attrs, "format")?.as_str()?)?;
        let (Ok(channels), Ok(rate)) = (usize::try_from(channels), u32::try_from(rate)) else {
            return Err(persistence("track channel count or rate out of range"));
        };
        if channels == 0 || rate == 0 {
            return Err(persistence("track needs at least one channel and a rate"));
        }

        let mut track = Track::new(self.factory()?, channels, rate, format);
        track.set_id(TrackId(id));
        if let Some(name) = optional(attrs, "name") {
            track.set_name(name.as_str()?);
        }
        if let Some(gain) = optional(attrs, "gain") {
            track.set_gain(gain.as_float()? as f32)?;
        }
        if let Some(pan) = optional(attrs, "pan") {
            track.set_pan(pan.as_float()? as f32);
        }
        if let Some(color) = optional(attrs, "color") {
            let color = usize::try_from(color.as_u64()?)
                .map_err(|_| persistence("track color out of range"))?;
            track.set_color(color);
        }
        if let Some(solo) = optional(attrs, "solo") {
            track.set_solo(solo.as_bool()?);
        }
        if let Some(mute) = optional(attrs, "mute") {
            track.set_mute(mute.as_bool()?);
        }
        if let Some(tolerance) = optional(attrs, "merge_tolerance") {
            track.set_merge_tolerance(tolerance.as_float()?);
        }
        self.track = Some(track);
        Ok(())
    }

    fn start_clip(&mut self, attrs: &[(String, AttrValue)]) -> Result<()> {
        if self.track.is_none() || self.finished || self.clip.is_some() {
            return Err(persistence("<clip> outside an open <track>"));
        }
        let rate = required(CLIP_TAG, attrs, "rate")?.as_u64()?;
        self.clip = Some(PendingClip {
            name: required(CLIP_TAG, attrs, "name")?.as_str()?.to_string(),
            start: required(CLIP_TAG, attrs, "offset")?.as_float()?,
            rate: u32::try_from(rate).map_err(|_| persistence("clip rate out of range"))?,
            channels: Vec::new(),
            envelope: Envelope::default(),
        });
        Ok(())
    }

    fn start_sequence(&mut self, attrs: &[(String, AttrValue)]) -> Result<()> {
        let Some(clip) = &self.clip else {
            return Err(persistence("<sequence> outside a <clip>"));
        };
        let channel = required(SEQUENCE_TAG, attrs, "channel")?.as_u64()?;
        if channel != clip.channels.len() as u64 {
            return Err(persistence(format!(
                "sequence for channel {} arrived in position {}",
                channel,
                clip.channels.len()
            )));
        }
        self.sequence = Some(PendingSequence {
            format: SampleFormat::parse(required(SEQUENCE_TAG, attrs, "format")?.as_str()?)?,
            samples: required(SEQUENCE_TAG, attrs, "samples")?.as_u64()?,
            blocks: Vec::new(),
        });
        Ok(())
    }

    fn add_block(&mut self, attrs: &[(String, AttrValue)]) -> Result<()> {
        let id = BlockId(required(BLOCK_TAG, attrs, "id")?.as_u64()?);
        let len = usize::try_from(required(BLOCK_TAG, attrs, "len")?.as_u64()?)
            .map_err(|_| persistence("block length out of range"))?;
        let Some(sequence) = &mut self.sequence else {
            return Err(persistence("<block> outside a <sequence>"));
        };
        sequence.blocks.push((id, len));
        Ok(())
    }

    fn finish_sequence(&mut self) -> Result<()> {
        let (Some(pending), Some(_)) = (self.sequence.take(), &self.clip) else {
            return Err(persistence("unbalanced </sequence>"));
        };
        let ids: Vec<BlockId> = pending.blocks.iter().map(|&(id, _)| id).collect();
        let sequence = Sequence::from_blocks(self.factory()?, pending.format, &ids)?;

        let stored = sequence.blocks().into_iter().map(|b| (b.id, b.len));
        if sequence.num_samples() != pending.samples || !stored.eq(pending.blocks.iter().copied()) {
            return Err(persistence(format!(
                "stored blocks hold {} samples, stream expects {}",
                sequence.num_samples(),
                pending.samples
            )));
        }
        if let Some(clip) = &mut self.clip {
            clip.channels.push(sequence);
        }
        Ok(())
    }

    fn finish_clip(&mut self) -> Result<()> {
        let (Some(pending), Some(track)) = (self.clip.take(), &mut self.track) else {
            return Err(persistence("unbalanced </clip>"));
        };
        let clip = Clip::from_parts(
            pending.name,
            pending.start,
            pending.rate,
            pending.channels,
            pending.envelope,
        )?;
        track.insert_clip(clip)?;
        Ok(())
    }
}

impl TagHandler for TrackReader {
    fn handle_tag(&mut self, name: &str, attrs: &[(String, AttrValue)]) -> Result<()> {
        match name {
            TRACK_TAG => self.start_track(attrs),
            CLIP_TAG => self.start_clip(attrs),
            SEQUENCE_TAG => self.start_sequence(attrs),
            BLOCK_TAG => self.add_block(attrs),
            ENVELOPE_TAG => {
                if self.clip.is_none() {
                    return Err(persistence("<envelope> outside a <clip>"));
                }
                self.envelope = Some(Envelope::new(
                    required(ENVELOPE_TAG, attrs, "min")?.as_float()?,
                    required(ENVELOPE_TAG, attrs, "max")?.as_float()?,
                    required(ENVELOPE_TAG, attrs, "default")?.as_float()?,
                ));
                Ok(())
            }
            POINT_TAG => {
                let t = required(POINT_TAG, attrs, "t")?.as_float()?;
                let value = required(POINT_TAG, attrs, "value")?.as_float()?;
                let Some(envelope) = &mut self.envelope else {
                    return Err(persistence("<point> outside an <envelope>"));
                };
                envelope.insert_point(t, value);
                Ok(())
            }
            other => {
                debug!("Skipping unknown tag <{}>", other);
                Ok(())
            }
        }
    }

    fn handle_end_tag(&mut self, name: &str) -> Result<()> {
        match name {
            TRACK_TAG => {
                if self.track.is_none() || self.clip.is_some() {
                    return Err(persistence("unbalanced </track>"));
                }
                self.finished = true;
                Ok(())
            }
            CLIP_TAG => self.finish_clip(),
            SEQUENCE_TAG => self.finish_sequence(),
            ENVELOPE_TAG => {
                let (Some(envelope), Some(clip)) = (self.envelope.take(), &mut self.clip) else {
                    return Err(persistence("unbalanced </envelope>"));
                };
                clip.envelope = envelope;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryBlockFactory;
    use pretty_assertions::assert_eq;

    fn store() -> Arc<InMemoryBlockFactory> {
        Arc::new(InMemoryBlockFactory::with_capacity(3))
    }

    fn stereo_track(store: &Arc<InMemoryBlockFactory>) -> Track {
        let factory: Arc<dyn SampleBlockFactory> = store.clone();
        let mut track = Track::new(Arc::clone(&factory), 2, 100, SampleFormat::Float32);
        track.set_name("Vocals");
        track.set_gain(0.8).unwrap();
        track.set_pan(-0.25);
        track.set_mute(true);

        let left: Vec<f32> = (0..7).map(|i| i as f32 * 0.1).collect();
        let right: Vec<f32> = (0..7).map(|i| -(i as f32) * 0.1).collect();
        let mut clip = Clip::from_samples(
            Arc::clone(&factory),
            SampleFormat::Float32,
            100,
            0.015,
            &[left.as_slice(), right.as_slice()],
        )
        .unwrap();
        clip.envelope_mut().insert_point(0.02, 0.5);
        track.insert_clip(clip).unwrap();

        let quiet = Clip::from_samples(
            factory,
            SampleFormat::Int16,
            100,
            1.0 / 3.0,
            &[&[0.5, -0.5], &[0.25, -0.25]],
        )
        .unwrap();
        track.insert_clip(quiet).unwrap();
        track
    }

    #[test]
    fn test_round_trip_preserves_track() {
        let store = store();
        let original = stereo_track(&store);

        let mut recorder = TagRecorder::new();
        original.write_tags(&mut recorder).unwrap();
        assert!(recorder.is_complete());

        let restored = TagRecorder::from_json(&recorder.to_json().unwrap()).unwrap();
        assert_eq!(restored, recorder);
        let rebuilt = TrackReader::read(store.clone(), &restored).unwrap();

        assert_eq!(rebuilt.id(), original.id());
        assert_eq!(rebuilt.name(), "Vocals");
        assert_eq!(rebuilt.gain().to_bits(), original.gain().to_bits());
        assert_eq!(rebuilt.pan().to_bits(), original.pan().to_bits());
        assert!(rebuilt.mute());
        assert_eq!(rebuilt.clip_count(), 2);

        for ((_, a), (_, b)) in original.sorted_clips().into_iter().zip(rebuilt.sorted_clips()) {
            assert_eq!(a.name(), b.name());
            assert_eq!(a.start_time().to_bits(), b.start_time().to_bits());
            assert_eq!(a.num_samples(), b.num_samples());
            assert_eq!(a.format(), b.format());
            assert_eq!(a.envelope(), b.envelope());
            for (sa, sb) in a.sequences().iter().zip(b.sequences()) {
                assert_eq!(sa.blocks(), sb.blocks());
                let (xa, xb) = (sa.read_all().unwrap(), sb.read_all().unwrap());
                assert_eq!(
                    xa.iter().map(|s| s.to_bits()).collect::<Vec<_>>(),
                    xb.iter().map(|s| s.to_bits()).collect::<Vec<_>>()
                );
            }
        }
    }

    #[test]
    fn test_stream_shape() {
        let store = store();
        let track = stereo_track(&store);
        let mut recorder = TagRecorder::new();
        track.write_tags(&mut recorder).unwrap();

        let starts: Vec<&str> = recorder
            .events()
            .iter()
            .filter_map(|e| match e {
                TagEvent::Start { name, .. } => Some(name.as_str()),
                TagEvent::End { .. } => None,
            })
            .filter(|name| *name != BLOCK_TAG)
            .collect();
        assert_eq!(
            starts,
            vec![
                "track", "clip", "sequence", "sequence", "envelope", "point", "clip", "sequence",
                "sequence", "envelope"
            ]
        );
    }

    #[test]
    fn test_missing_block_fails_the_read() {
        let store = store();
        let track = stereo_track(&store);
        let mut recorder = TagRecorder::new();
        track.write_tags(&mut recorder).unwrap();

        let (_, first) = track.sorted_clips()[0];
        let id = first.sequences()[1].blocks()[0].id;
        assert!(store.discard(id));

        let err = TrackReader::read(store.clone(), &recorder).unwrap_err();
        assert!(matches!(err, ClipstreamError::MissingBlock { id: missing } if missing == id));
    }

    #[test]
    fn test_recorder_rejects_bad_nesting() {
        let mut recorder = TagRecorder::new();
        recorder.start_tag("track").unwrap();
        recorder.start_tag("clip").unwrap();
        assert!(recorder.end_tag("track").is_err());

        let mut recorder = TagRecorder::new();
        recorder.start_tag("track").unwrap();
        recorder.start_tag("clip").unwrap();
        recorder.end_tag("clip").unwrap();
        assert!(recorder.write_attr("name", "late".into()).is_err());
        assert!(!recorder.is_complete());
    }

    #[test]
    fn test_unclosed_json_is_rejected() {
        let json = r#"[{"event": "start", "name": "track", "attrs": []}]"#;
        assert!(matches!(
            TagRecorder::from_json(json),
            Err(ClipstreamError::Persistence { .. })
        ));
    }

    #[test]
    fn test_attribute_type_mismatch() {
        assert_eq!(AttrValue::from(3_i64).as_int().unwrap(), 3);
        assert!(AttrValue::from(3_i64).as_str().is_err());
        assert!(AttrValue::from("x").as_bool().is_err());
    }

    #[test]
    fn test_reader_skips_unknown_tags_and_needs_a_track() {
        let mut reader = TrackReader::new(store());
        reader.handle_tag("selection", &[]).unwrap();
        reader.handle_end_tag("selection").unwrap();
        assert!(reader.finish().is_err());
    }
}
