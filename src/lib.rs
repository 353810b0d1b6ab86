//! Clipstream - Multi-clip audio tracks with a streaming read pipeline
//!
//! A track holds an ordered, non-overlapping set of clips. Reads address the
//! track's timeline in samples, forward or backward, and gaps between clips
//! read as silence.
//!
//! # Architecture
//!
//! The read path has three layers:
//! - Track: clips over block storage, random-access sample reads
//! - Segment provider: walks the timeline as clip and silence runs
//! - Streaming decorator: incremental pulls with a saved cursor, zero-fill
//!   at the edges and an optional transform stage

pub mod cli;
pub mod clip;
pub mod config;
pub mod engine;
pub mod error;
pub mod persist;
pub mod segment;
pub mod sequence;
pub mod storage;
pub mod stream;
pub mod track;

pub use config::EngineConfig;
pub use error::{ClipstreamError, Result};
pub use sequence::{ClipSource, PlayableSequence, PlaybackDirection, SampleCount};
pub use stream::StretchingSequence;
pub use track::{Track, TrackFactory};
