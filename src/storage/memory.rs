//! In-memory block store
//!
//! The store indexes blocks weakly: a block stays retrievable while some
//! sequence holds it and leaves the store when the last holder drops it.
//! Each block carries a SHA-256 digest of its bytes so corruption is
//! detected rather than played back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::warn;
use sha2::{Digest, Sha256};

use super::{BlockId, SampleBlock, SampleBlockFactory, SampleFormat};
use crate::error::{ClipstreamError, Result};

/// Default block capacity in samples
pub const DEFAULT_MAX_BLOCK_SAMPLES: usize = 65536;

type BlockMap = HashMap<BlockId, StoredBlock>;

#[derive(Debug)]
struct StoredBlock {
    block: Weak<MemoryBlock>,
    /// Damaged copy served in place of the block, set by `tamper`
    corrupted: Option<Arc<MemoryBlock>>,
}

fn lock_map(map: &Mutex<BlockMap>) -> MutexGuard<'_, BlockMap> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct MemoryBlock {
    id: BlockId,
    format: SampleFormat,
    bytes: Vec<u8>,
    checksum: [u8; 32],
    /// Map to unregister from on drop; empty for tampered copies
    store: Weak<Mutex<BlockMap>>,
}

impl Drop for MemoryBlock {
    fn drop(&mut self) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        let removed = lock_map(&store).remove(&self.id);
        drop(removed);
    }
}

impl MemoryBlock {
    fn digest(bytes: &[u8]) -> [u8; 32] {
        Sha256::digest(bytes).into()
    }

    fn verify(&self) -> bool {
        Self::digest(&self.bytes) == self.checksum
    }
}

impl SampleBlock for MemoryBlock {
    fn id(&self) -> BlockId {
        self.id
    }

    fn format(&self) -> SampleFormat {
        self.format
    }

    fn sample_count(&self) -> usize {
        self.bytes.len() / self.format.bytes_per_sample()
    }

    fn get_floats(&self, offset: usize, dest: &mut [f32]) -> Result<()> {
        let count = self.sample_count();
        if offset + dest.len() > count {
            return Err(ClipstreamError::OutOfRange {
                start: offset as i64,
                len: dest.len(),
                available: count as u64,
            });
        }
        self.format.decode(&self.bytes, offset, dest);
        Ok(())
    }
}

/// Thread-safe block store keeping every live block in memory
#[derive(Debug)]
pub struct InMemoryBlockFactory {
    blocks: Arc<Mutex<BlockMap>>,
    next_id: AtomicU64,
    max_block_samples: usize,
    verify_checksums: bool,
}

impl InMemoryBlockFactory {
    /// Create a store with the default block capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_BLOCK_SAMPLES)
    }

    /// Create a store whose blocks hold at most `max_block_samples` samples
    pub fn with_capacity(max_block_samples: usize) -> Self {
        Self {
            blocks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            max_block_samples: max_block_samples.max(1),
            verify_checksums: false,
        }
    }

    /// Verify each block's checksum whenever it is retrieved
    pub fn verifying(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Number of blocks currently held by at least one sequence
    pub fn block_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop a block from the store, as if its backing storage were lost
    ///
    /// Returns true if the block existed.
    pub fn discard(&self, id: BlockId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Overwrite a block's bytes without updating its checksum
    ///
    /// Models on-disk corruption; only meaningful with checksum
    /// verification enabled.
    pub fn tamper(&self, id: BlockId, byte_index: usize) -> bool {
        // `block` outlives the map guard below, so its drop never runs under the lock
        let Some(block) = self.lock().get(&id).and_then(|s| s.block.upgrade()) else {
            return false;
        };
        let mut bytes = block.bytes.clone();
        if let Some(byte) = bytes.get_mut(byte_index) {
            *byte ^= 0xFF;
        }
        let tampered = Arc::new(MemoryBlock {
            id,
            format: block.format,
            bytes,
            checksum: block.checksum,
            store: Weak::new(),
        });
        let mut blocks = self.lock();
        let Some(entry) = blocks.get_mut(&id) else {
            return false;
        };
        entry.corrupted = Some(tampered);
        true
    }

    fn lock(&self) -> MutexGuard<'_, BlockMap> {
        lock_map(&self.blocks)
    }
}

impl Default for InMemoryBlockFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBlockFactory for InMemoryBlockFactory {
    fn create(&self, data: &[u8], format: SampleFormat) -> Result<Arc<dyn SampleBlock>> {
        let width = format.bytes_per_sample();
        if data.len() % width != 0 {
            return Err(ClipstreamError::IncompatibleFormat {
                details: format!(
                    "{} bytes is not a whole number of {} samples",
                    data.len(),
                    format
                ),
            });
        }
        let count = data.len() / width;
        if count > self.max_block_samples {
            return Err(ClipstreamError::InvalidParameter {
                param: "block_samples".to_string(),
                value: format!("{} (capacity {})", count, self.max_block_samples),
            });
        }

        let id = BlockId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let block = Arc::new(MemoryBlock {
            id,
            format,
            bytes: data.to_vec(),
            checksum: MemoryBlock::digest(data),
            store: Arc::downgrade(&self.blocks),
        });
        let entry = StoredBlock {
            block: Arc::downgrade(&block),
            corrupted: None,
        };
        self.lock().insert(id, entry);
        Ok(block)
    }

    fn retrieve(&self, id: BlockId) -> Result<Arc<dyn SampleBlock>> {
        let block = self
            .lock()
            .get(&id)
            .and_then(|s| s.corrupted.clone().or_else(|| s.block.upgrade()));
        let Some(block) = block else {
            warn!("Sample block {} requested but not present in store", id);
            return Err(ClipstreamError::MissingBlock { id });
        };
        if self.verify_checksums && !block.verify() {
            warn!("Sample block {} failed checksum verification", id);
            return Err(ClipstreamError::CorruptBlock { id });
        }
        Ok(block)
    }

    fn max_block_samples(&self) -> usize {
        self.max_block_samples
    }
}
