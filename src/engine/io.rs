//! WAV file I/O
//!
//! Imports decode any integer or float WAV into 32-bit float channels;
//! exports write 16 or 24-bit integer or 32-bit float PCM.

use std::path::Path;

use hound::{SampleFormat as WavSampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;

use crate::engine::buffer::{interleave, AudioBuffer};
use crate::engine::resample::resample_channels;
use crate::error::{ClipstreamError, Result};

/// Export bit depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// 16, 24 (integer) or 32 (float)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat { bit_depth: 24 }
    }
}

impl ExportFormat {
    /// # Errors
    /// `InvalidParameter` for any depth other than 16, 24 or 32
    pub fn new(bit_depth: u16) -> Result<Self> {
        match bit_depth {
            16 | 24 | 32 => Ok(ExportFormat { bit_depth }),
            _ => Err(ClipstreamError::InvalidParameter {
                param: "bit_depth".to_string(),
                value: bit_depth.to_string(),
            }),
        }
    }

    pub fn cd_quality() -> Self {
        ExportFormat { bit_depth: 16 }
    }

    pub fn float() -> Self {
        ExportFormat { bit_depth: 32 }
    }
}

/// Read a WAV file at its own sample rate
///
/// # Errors
/// `AudioReadError` if the file cannot be opened or decoded;
/// `InvalidParameter` for bit depths hound reads but we do not scale
pub fn import_wav(path: &Path) -> Result<AudioBuffer> {
    let read_error = |source| ClipstreamError::AudioReadError {
        path: path.display().to_string(),
        source,
    };

    let reader = WavReader::open(path).map_err(read_error)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)
        .map_err(|e| match e {
            ReadFailure::Decode(source) => read_error(source),
            ReadFailure::Unsupported(bits) => ClipstreamError::InvalidParameter {
                param: "bits_per_sample".to_string(),
                value: bits.to_string(),
            },
        })?;

    debug!(
        "Imported {}: {} ch, {} Hz, {} bit",
        path.display(),
        channels,
        spec.sample_rate,
        spec.bits_per_sample
    );
    AudioBuffer::from_interleaved(&samples, channels, spec.sample_rate)
}

/// Read a WAV file and resample it to `rate`
pub fn import_wav_at(path: &Path, rate: u32) -> Result<AudioBuffer> {
    let buffer = import_wav(path)?;
    if buffer.sample_rate == rate {
        return Ok(buffer);
    }
    let samples = resample_channels(&buffer.samples, buffer.sample_rate, rate);
    Ok(AudioBuffer {
        samples,
        sample_rate: rate,
    })
}

/// Write `buffer` as a WAV file at the buffer's sample rate
///
/// # Errors
/// `AudioWriteError` if the file cannot be created or written
pub fn export_wav(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    let write_error = |source| ClipstreamError::AudioWriteError {
        path: path.display().to_string(),
        source,
    };

    let spec = WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: format.bit_depth,
        sample_format: if format.bit_depth == 32 {
            WavSampleFormat::Float
        } else {
            WavSampleFormat::Int
        },
    };

    let mut writer = WavWriter::create(path, spec).map_err(write_error)?;
    let interleaved = interleave(&buffer.samples);
    match format.bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(write_error)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled).map_err(write_error)?;
            }
        }
        32 => {
            for sample in interleaved {
                writer.write_sample(sample).map_err(write_error)?;
            }
        }
        other => {
            return Err(ClipstreamError::InvalidParameter {
                param: "bit_depth".to_string(),
                value: other.to_string(),
            });
        }
    }
    writer.finalize().map_err(write_error)?;

    debug!(
        "Exported {} samples x {} ch to {}",
        buffer.len(),
        buffer.channels(),
        path.display()
    );
    Ok(())
}

enum ReadFailure {
    Decode(hound::Error),
    Unsupported(u16),
}

fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: WavSampleFormat,
) -> std::result::Result<Vec<f32>, ReadFailure> {
    let scale = match (sample_format, bits_per_sample) {
        (WavSampleFormat::Float, _) => {
            return reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(ReadFailure::Decode);
        }
        (WavSampleFormat::Int, 8) => 128.0,
        (WavSampleFormat::Int, 16) => 32768.0,
        (WavSampleFormat::Int, 24) => 8388608.0,
        (WavSampleFormat::Int, 32) => 2147483648.0,
        (WavSampleFormat::Int, other) => return Err(ReadFailure::Unsupported(other)),
    };
    reader
        .samples::<i32>()
        .map(|s| s.map(|v| (v as f64 / scale) as f32))
        .collect::<std::result::Result<Vec<f32>, _>>()
        .map_err(ReadFailure::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use test_case::test_case;

    fn tone(n_channels: usize, len: usize, rate: u32) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(n_channels, len, rate);
        for (ch, channel) in buffer.samples.iter_mut().enumerate() {
            let freq = 440.0 * (ch + 1) as f32;
            for (i, sample) in channel.iter_mut().enumerate() {
                *sample = 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin();
            }
        }
        buffer
    }

    #[test_case(16, 1e-3)]
    #[test_case(24, 1e-5)]
    #[test_case(32, 1e-7)]
    fn test_round_trip(bit_depth: u16, tolerance: f32) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let original = tone(2, 2000, 44100);

        export_wav(&original, &path, ExportFormat::new(bit_depth).unwrap()).unwrap();
        let imported = import_wav(&path).unwrap();

        assert_eq!(imported.sample_rate, 44100);
        assert_eq!(imported.channels(), 2);
        assert_eq!(imported.len(), original.len());
        let pairs = original.samples.iter().flatten().zip(imported.samples.iter().flatten());
        for (orig, imp) in pairs {
            assert!((orig - imp).abs() < tolerance, "{} vs {}", orig, imp);
        }
    }

    #[test]
    fn test_import_at_other_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        export_wav(&tone(1, 4800, 48000), &path, ExportFormat::float()).unwrap();

        let imported = import_wav_at(&path, 24000).unwrap();
        assert_eq!(imported.sample_rate, 24000);
        assert_eq!(imported.len(), 2400);
    }

    #[test]
    fn test_import_missing_file() {
        let err = import_wav(Path::new("/nonexistent/path/audio.wav")).unwrap_err();
        match err {
            ClipstreamError::AudioReadError { path, .. } => assert!(path.contains("nonexistent")),
            other => panic!("expected AudioReadError, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_export_depth() {
        assert!(ExportFormat::new(12).is_err());
        assert_eq!(ExportFormat::default().bit_depth, 24);
    }
}
