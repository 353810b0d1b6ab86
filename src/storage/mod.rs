//! Sample block storage interface
//!
//! Block storage is an external collaborator: clips only ever hold opaque
//! [`BlockId`]s and ask a [`SampleBlockFactory`] to allocate or retrieve
//! fixed-capacity blocks. [`InMemoryBlockFactory`] is the built-in store.

mod format;
mod memory;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use format::SampleFormat;
pub use memory::{InMemoryBlockFactory, DEFAULT_MAX_BLOCK_SAMPLES};

/// Opaque identifier of a block inside a block store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An immutable run of samples held by block storage
pub trait SampleBlock: Send + Sync + fmt::Debug {
    /// Identifier under which the store can retrieve this block again
    fn id(&self) -> BlockId;

    /// Storage format of the samples
    fn format(&self) -> SampleFormat;

    /// Number of samples in the block
    fn sample_count(&self) -> usize;

    /// Copy `dest.len()` samples starting at `offset` as floats
    fn get_floats(&self, offset: usize, dest: &mut [f32]) -> Result<()>;
}

/// Allocates and retrieves sample blocks
///
/// Supplied to a track at creation time and shared by every clip of it.
/// A block remains retrievable while any handle returned by `create` or
/// `retrieve` is alive; the store may free it once the last one drops.
pub trait SampleBlockFactory: Send + Sync + fmt::Debug {
    /// Allocate a block from raw little-endian bytes in `format`
    fn create(&self, data: &[u8], format: SampleFormat) -> Result<Arc<dyn SampleBlock>>;

    /// Look a block up by identifier
    fn retrieve(&self, id: BlockId) -> Result<Arc<dyn SampleBlock>>;

    /// Largest number of samples a single block may hold
    fn max_block_samples(&self) -> usize;

    /// Encode floats into `format` and allocate a block for them
    fn create_from_floats(
        &self,
        samples: &[f32],
        format: SampleFormat,
    ) -> Result<Arc<dyn SampleBlock>> {
        self.create(&format.encode(samples), format)
    }
}
