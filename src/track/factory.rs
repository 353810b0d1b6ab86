//! Track construction bound to one block store and project rate

use std::sync::Arc;

use log::debug;

use super::Track;
use crate::config::{EngineConfig, MERGE_POINT_TOLERANCE};
use crate::error::{ClipstreamError, Result};
use crate::storage::{InMemoryBlockFactory, SampleBlockFactory, SampleFormat};

/// Creates tracks that share a block store
#[derive(Debug, Clone)]
pub struct TrackFactory {
    block_factory: Arc<dyn SampleBlockFactory>,
    rate: u32,
    default_format: SampleFormat,
    merge_tolerance: f64,
}

impl TrackFactory {
    pub fn new(block_factory: Arc<dyn SampleBlockFactory>, rate: u32) -> Self {
        Self {
            block_factory,
            rate,
            default_format: SampleFormat::Float32,
            merge_tolerance: MERGE_POINT_TOLERANCE,
        }
    }

    /// Build a factory over a fresh in-memory store configured by `config`
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = InMemoryBlockFactory::with_capacity(config.max_block_samples)
            .verifying(config.verify_block_checksums);
        Ok(Self {
            block_factory: Arc::new(store),
            rate: config.project_rate,
            default_format: config.default_format,
            merge_tolerance: config.merge_tolerance,
        })
    }

    pub fn with_default_format(mut self, format: SampleFormat) -> Self {
        self.default_format = format;
        self
    }

    pub fn with_merge_tolerance(mut self, tolerance: f64) -> Self {
        self.merge_tolerance = tolerance;
        self
    }

    pub fn block_factory(&self) -> &Arc<dyn SampleBlockFactory> {
        &self.block_factory
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn default_format(&self) -> SampleFormat {
        self.default_format
    }

    /// New empty track at the project rate and default format
    pub fn create(&self, n_channels: usize) -> Result<Track> {
        self.create_with(n_channels, self.default_format, self.rate)
    }

    pub fn create_with(&self, n_channels: usize, format: SampleFormat, rate: u32) -> Result<Track> {
        if n_channels == 0 {
            return Err(ClipstreamError::InvalidParameter {
                param: "n_channels".to_string(),
                value: n_channels.to_string(),
            });
        }
        if rate == 0 {
            return Err(ClipstreamError::InvalidParameter {
                param: "rate".to_string(),
                value: rate.to_string(),
            });
        }
        let mut track = Track::new(Arc::clone(&self.block_factory), n_channels, rate, format);
        track.set_merge_tolerance(self.merge_tolerance);
        debug!("Created {} channel track at {} Hz ({})", n_channels, rate, format);
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_uses_project_settings() {
        let config = EngineConfig {
            project_rate: 8000,
            default_format: SampleFormat::Int16,
            merge_tolerance: 0.5,
            ..EngineConfig::default()
        };
        let factory = TrackFactory::from_config(&config).unwrap();
        let track = factory.create(2).unwrap();
        assert_eq!(track.rate(), 8000);
        assert_eq!(track.n_channels(), 2);
        assert_eq!(track.format(), SampleFormat::Int16);
        assert_eq!(track.merge_tolerance(), 0.5);
    }

    #[test]
    fn test_tracks_share_block_store() {
        let factory = TrackFactory::new(Arc::new(InMemoryBlockFactory::new()), 44100);
        let a = factory.create(1).unwrap();
        let b = factory.create(1).unwrap();
        assert!(Arc::ptr_eq(a.block_factory(), b.block_factory()));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_rejects_zero_channels_and_rate() {
        let factory = TrackFactory::new(Arc::new(InMemoryBlockFactory::new()), 44100);
        assert!(factory.create(0).is_err());
        assert!(factory.create_with(1, SampleFormat::Float32, 0).is_err());
    }
}
