//! Error handling for clipstream
//!
//! All fallible operations return [`ClipstreamError`]. Storage faults
//! (missing or corrupt blocks) travel through every read layer unchanged;
//! only the streaming decorator zero-fills, and only at stream edges.

use thiserror::Error;

use crate::storage::BlockId;
use crate::track::ClipHandle;

/// Result type alias for clipstream operations
pub type Result<T> = std::result::Result<T, ClipstreamError>;

/// Main error type for clipstream operations
#[derive(Error, Debug)]
pub enum ClipstreamError {
    // Read errors
    #[error("Read of {len} samples at {start} is outside the available range 0..{available}")]
    OutOfRange {
        start: i64,
        len: usize,
        available: u64,
    },

    // Storage errors
    #[error("Sample block {id} is missing from block storage")]
    MissingBlock { id: BlockId },

    #[error("Sample block {id} failed its integrity check")]
    CorruptBlock { id: BlockId },

    // Edit errors
    #[error("Clip [{start:.6}, {end:.6}) overlaps existing clip [{other_start:.6}, {other_end:.6})")]
    Overlap {
        start: f64,
        end: f64,
        other_start: f64,
        other_end: f64,
    },

    #[error("Incompatible format: {details}")]
    IncompatibleFormat { details: String },

    #[error("Clips are not adjacent: gap of {gap:.6}s exceeds tolerance")]
    NotAdjacent { gap: f64 },

    #[error("Clip handle {handle:?} is no longer valid")]
    StaleHandle { handle: ClipHandle },

    #[error("No clip found at {time:.6}s")]
    NoClipAtTime { time: f64 },

    #[error("Invalid time range: {t0:.6}..{t1:.6}")]
    InvalidTimeRange { t0: f64, t1: f64 },

    // Configuration errors
    #[error("Invalid parameter: {param} = {value}")]
    InvalidParameter { param: String, value: String },

    // Persistence errors
    #[error("Persistence error: {details}")]
    Persistence { details: String },

    // Audio I/O errors
    #[error("Failed to read audio file: {path}")]
    AudioReadError {
        path: String,
        #[source]
        source: hound::Error,
    },

    #[error("Failed to write audio file: {path}")]
    AudioWriteError {
        path: String,
        #[source]
        source: hound::Error,
    },

    // Generic I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClipstreamError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::MissingBlock { .. } => "MISSING_BLOCK",
            Self::CorruptBlock { .. } => "CORRUPT_BLOCK",
            Self::Overlap { .. } => "OVERLAP",
            Self::IncompatibleFormat { .. } => "INCOMPATIBLE_FORMAT",
            Self::NotAdjacent { .. } => "NOT_ADJACENT",
            Self::StaleHandle { .. } => "STALE_HANDLE",
            Self::NoClipAtTime { .. } => "NO_CLIP_AT_TIME",
            Self::InvalidTimeRange { .. } => "INVALID_TIME_RANGE",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::AudioReadError { .. } => "AUDIO_READ_ERROR",
            Self::AudioWriteError { .. } => "AUDIO_WRITE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// True for read failures that mean "no data there", including storage faults
    pub fn is_out_of_range_like(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. } | Self::MissingBlock { .. } | Self::CorruptBlock { .. }
        )
    }

    /// Check if the caller can reasonably retry with different input
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. }
                | Self::Overlap { .. }
                | Self::NotAdjacent { .. }
                | Self::NoClipAtTime { .. }
                | Self::InvalidTimeRange { .. }
                | Self::InvalidParameter { .. }
        )
    }

    /// Returns a suggested recovery action for this error
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::OutOfRange { .. } => "Read within the clip bounds or use a soft read",
            Self::MissingBlock { .. } | Self::CorruptBlock { .. } => {
                "The sample storage is damaged; restore the project from a backup"
            }
            Self::Overlap { .. } => "Shift the clip to a free region and retry",
            Self::IncompatibleFormat { .. } => "Resample or convert the clip to the track format first",
            Self::NotAdjacent { .. } => "Use join to merge clips separated by a gap",
            Self::StaleHandle { .. } => "Look the clip up again; it was removed or merged",
            Self::InvalidParameter { .. } => "Adjust the parameter to be within valid range",
            _ => "Check the error details and try again",
        }
    }
}
