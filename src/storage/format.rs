//! Sample formats and the raw byte codec used by block storage
//!
//! Blocks hold little-endian PCM. Floats are stored bit-exact; integer
//! formats are scaled by their full-scale value and clamped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClipstreamError, Result};

/// Full-scale value for 16-bit integer samples
const INT16_SCALE: f32 = 32768.0;

/// Full-scale value for 24-bit integer samples
const INT24_SCALE: f32 = 8_388_608.0;

/// Storage format of one sample, ordered from narrowest to widest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// 16-bit signed integer
    Int16,
    /// 24-bit signed integer, packed in three bytes
    Int24,
    /// 32-bit IEEE float
    #[default]
    Float32,
}

impl SampleFormat {
    /// Number of bytes one sample occupies in storage
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Int24 => 3,
            SampleFormat::Float32 => 4,
        }
    }

    /// Stable name used in persisted attributes
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Int16 => "int16",
            SampleFormat::Int24 => "int24",
            SampleFormat::Float32 => "float32",
        }
    }

    /// Parse a persisted format name
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "int16" => Ok(SampleFormat::Int16),
            "int24" => Ok(SampleFormat::Int24),
            "float32" => Ok(SampleFormat::Float32),
            other => Err(ClipstreamError::InvalidParameter {
                param: "format".to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Format matching a WAV bit depth, if one exists
    pub fn from_bit_depth(bits: u16) -> Option<Self> {
        match bits {
            16 => Some(SampleFormat::Int16),
            24 => Some(SampleFormat::Int24),
            32 => Some(SampleFormat::Float32),
            _ => None,
        }
    }

    /// Encode floats into raw little-endian bytes of this format
    pub fn encode(self, samples: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(samples.len() * self.bytes_per_sample());
        match self {
            SampleFormat::Int16 => {
                for &s in samples {
                    let v = (s * INT16_SCALE).round().clamp(-32768.0, 32767.0) as i16;
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
            }
            SampleFormat::Int24 => {
                for &s in samples {
                    let v = (s * INT24_SCALE).round().clamp(-8_388_608.0, 8_388_607.0) as i32;
                    bytes.extend_from_slice(&v.to_le_bytes()[..3]);
                }
            }
            SampleFormat::Float32 => {
                for &s in samples {
                    bytes.extend_from_slice(&s.to_le_bytes());
                }
            }
        }
        bytes
    }

    /// Decode `dest.len()` samples starting at sample `offset` of `bytes`
    ///
    /// # Panics
    /// Panics if `bytes` holds fewer than `offset + dest.len()` samples
    pub fn decode(self, bytes: &[u8], offset: usize, dest: &mut [f32]) {
        let width = self.bytes_per_sample();
        let raw = &bytes[offset * width..(offset + dest.len()) * width];
        match self {
            SampleFormat::Int16 => {
                for (out, chunk) in dest.iter_mut().zip(raw.chunks_exact(2)) {
                    *out = i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / INT16_SCALE;
                }
            }
            SampleFormat::Int24 => {
                for (out, chunk) in dest.iter_mut().zip(raw.chunks_exact(3)) {
                    // Sign-extend by placing the three bytes high and shifting back
                    let v = i32::from_le_bytes([0, chunk[0], chunk[1], chunk[2]]) >> 8;
                    *out = v as f32 / INT24_SCALE;
                }
            }
            SampleFormat::Float32 => {
                for (out, chunk) in dest.iter_mut().zip(raw.chunks_exact(4)) {
                    *out = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
