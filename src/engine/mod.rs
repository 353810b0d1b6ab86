//! Audio engine support
//!
//! - Audio buffer type handed between the stream and file I/O
//! - WAV import and export
//! - Sample rate conversion

pub mod buffer;
pub mod io;
pub mod resample;

pub use buffer::AudioBuffer;
pub use io::{export_wav, import_wav, import_wav_at, ExportFormat};
pub use resample::{resample_channels, resample_linear};
