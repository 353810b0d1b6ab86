//! Engine configuration
//!
//! Settings shared by every track a [`TrackFactory`](crate::track::TrackFactory)
//! creates and by the streaming decorator. Persisted as pretty-printed JSON;
//! missing fields take their defaults.

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ClipstreamError, Result};
use crate::storage::{SampleFormat, DEFAULT_MAX_BLOCK_SAMPLES};

/// Largest gap or overlap, in seconds, at which two clips still count as
/// touching
pub const MERGE_POINT_TOLERANCE: f64 = 0.01;

/// Default project sample rate
pub const DEFAULT_PROJECT_RATE: u32 = 44100;

/// Default chunk the decorator feeds a transform stage
pub const DEFAULT_TRANSFORM_CHUNK: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate new tracks are created at
    pub project_rate: u32,
    /// Storage format of newly created clips
    pub default_format: SampleFormat,
    /// Capacity of one storage block, in samples
    pub max_block_samples: usize,
    /// Merge tolerance in seconds
    pub merge_tolerance: f64,
    /// Samples per channel handed to a transform stage per call
    pub transform_chunk_samples: usize,
    /// Recompute block checksums on every retrieval
    pub verify_block_checksums: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_rate: DEFAULT_PROJECT_RATE,
            default_format: SampleFormat::Float32,
            max_block_samples: DEFAULT_MAX_BLOCK_SAMPLES,
            merge_tolerance: MERGE_POINT_TOLERANCE,
            transform_chunk_samples: DEFAULT_TRANSFORM_CHUNK,
            verify_block_checksums: false,
        }
    }
}

impl EngineConfig {
    /// Read and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        info!(
            "Loaded config from {}: {} Hz, {} blocks of {} samples",
            path.display(),
            config.project_rate,
            config.default_format,
            config.max_block_samples
        );
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_rate == 0 {
            return Err(invalid("project_rate", self.project_rate));
        }
        if self.max_block_samples == 0 {
            return Err(invalid("max_block_samples", self.max_block_samples));
        }
        if self.transform_chunk_samples == 0 {
            return Err(invalid("transform_chunk_samples", self.transform_chunk_samples));
        }
        if !self.merge_tolerance.is_finite() || self.merge_tolerance < 0.0 {
            return Err(invalid("merge_tolerance", self.merge_tolerance));
        }
        Ok(())
    }
}

fn invalid(param: &str, value: impl ToString) -> ClipstreamError {
    ClipstreamError::InvalidParameter {
        param: param.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.project_rate, 44100);
        assert_eq!(config.merge_tolerance, MERGE_POINT_TOLERANCE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "project_rate": 8000 }"#).unwrap();
        assert_eq!(config.project_rate, 8000);
        assert_eq!(config.max_block_samples, DEFAULT_MAX_BLOCK_SAMPLES);
        assert_eq!(config.default_format, SampleFormat::Float32);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(EngineConfig::from_json_str(r#"{ "project_rate": 0 }"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{ "merge_tolerance": -1.0 }"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{ "max_block_samples": 0 }"#).is_err());
        assert!(EngineConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let config = EngineConfig {
            project_rate: 48000,
            default_format: SampleFormat::Int24,
            verify_block_checksums: true,
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }
}
