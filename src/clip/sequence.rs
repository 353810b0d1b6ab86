//! Per-channel sample storage as an ordered run of blocks
//!
//! A [`Sequence`] holds a handle to each of its blocks, which keeps them
//! stored, but never caches sample data. Every read goes back to the block
//! factory, so a block that disappears from storage surfaces as an error on
//! the next read instead of being masked.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ClipstreamError, Result};
use crate::storage::{BlockId, SampleBlock, SampleBlockFactory, SampleFormat};

/// Reference to one stored block and its position within a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqBlock {
    /// Index of the block's first sample within the sequence
    pub start: u64,
    /// Identifier of the block in the store
    pub id: BlockId,
    /// Number of samples in the block
    pub len: usize,
}

impl SeqBlock {
    fn end(&self) -> u64 {
        self.start + self.len as u64
    }
}

#[derive(Debug, Clone)]
struct HeldBlock {
    pos: SeqBlock,
    handle: Arc<dyn SampleBlock>,
}

/// Ordered blocks holding one channel of a clip
///
/// Clones share blocks; a block is released when no sequence holds it.
#[derive(Debug, Clone)]
pub struct Sequence {
    factory: Arc<dyn SampleBlockFactory>,
    format: SampleFormat,
    blocks: Vec<HeldBlock>,
    num_samples: u64,
}

impl Sequence {
    /// Create an empty sequence storing samples in `format`
    pub fn new(factory: Arc<dyn SampleBlockFactory>, format: SampleFormat) -> Self {
        Self {
            factory,
            format,
            blocks: Vec::new(),
            num_samples: 0,
        }
    }

    /// Create a sequence holding a copy of `samples`
    pub fn with_samples(
        factory: Arc<dyn SampleBlockFactory>,
        format: SampleFormat,
        samples: &[f32],
    ) -> Result<Self> {
        let mut sequence = Self::new(factory, format);
        sequence.append(samples)?;
        Ok(sequence)
    }

    /// Rebuild a sequence from block identifiers already present in storage
    ///
    /// Each block is looked up once so that lengths come from storage and a
    /// missing block fails here rather than at playback.
    pub fn from_blocks(
        factory: Arc<dyn SampleBlockFactory>,
        format: SampleFormat,
        ids: &[BlockId],
    ) -> Result<Self> {
        let mut sequence = Self::new(factory, format);
        for &id in ids {
            let block = sequence.factory.retrieve(id)?;
            if block.format() != format {
                return Err(ClipstreamError::IncompatibleFormat {
                    details: format!(
                        "block {} is stored as {}, sequence expects {}",
                        id,
                        block.format(),
                        format
                    ),
                });
            }
            sequence.push_block(block);
        }
        Ok(sequence)
    }

    fn push_block(&mut self, handle: Arc<dyn SampleBlock>) {
        let len = handle.sample_count();
        if len == 0 {
            return;
        }
        let pos = SeqBlock {
            start: self.num_samples,
            id: handle.id(),
            len,
        };
        self.blocks.push(HeldBlock { pos, handle });
        self.num_samples += len as u64;
    }

    /// Total number of samples
    pub fn num_samples(&self) -> u64 {
        self.num_samples
    }

    /// Storage format of every block in the sequence
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Block references in sample order
    pub fn blocks(&self) -> Vec<SeqBlock> {
        self.blocks.iter().map(|b| b.pos).collect()
    }

    /// The store the blocks live in
    pub fn factory(&self) -> &Arc<dyn SampleBlockFactory> {
        &self.factory
    }

    /// Largest block the store will allocate
    pub fn max_block_size(&self) -> usize {
        self.factory.max_block_samples()
    }

    /// Number of samples from `start` to the end of the block containing it
    ///
    /// Reads aligned to this size never straddle a block boundary. Past the
    /// end of the sequence the maximum block size is returned.
    pub fn best_block_size(&self, start: u64) -> usize {
        if start >= self.num_samples {
            return self.max_block_size();
        }
        let block = &self.blocks[self.find_block(start)].pos;
        (block.end() - start) as usize
    }

    /// Index of the block containing sample `pos`, or `blocks.len()` past the end
    fn find_block(&self, pos: u64) -> usize {
        self.blocks.partition_point(|b| b.pos.end() <= pos)
    }

    /// Copy `dest.len()` samples starting at `start`
    ///
    /// # Errors
    /// `OutOfRange` if the range extends past the end; storage faults from
    /// the block factory are returned unchanged.
    pub fn get(&self, start: u64, dest: &mut [f32]) -> Result<()> {
        let len = dest.len();
        if start + len as u64 > self.num_samples {
            return Err(ClipstreamError::OutOfRange {
                start: start as i64,
                len,
                available: self.num_samples,
            });
        }

        let mut index = self.find_block(start);
        let mut pos = start;
        let mut written = 0;
        while written < len {
            let seq_block = self.blocks[index].pos;
            let block = self.factory.retrieve(seq_block.id)?;
            let offset = (pos - seq_block.start) as usize;
            let count = (seq_block.len - offset).min(len - written);
            block.get_floats(offset, &mut dest[written..written + count])?;
            written += count;
            pos += count as u64;
            index += 1;
        }
        Ok(())
    }

    /// Read every sample of the sequence
    pub fn read_all(&self) -> Result<Vec<f32>> {
        let mut samples = vec![0.0; self.num_samples as usize];
        self.get(0, &mut samples)?;
        Ok(samples)
    }

    /// Append samples, topping up a partially filled last block first
    ///
    /// A topped-up block is rewritten and the old one released.
    pub fn append(&mut self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let max = self.max_block_size();
        let mut grown = self.clone();
        let mut rest = samples;

        if let Some(last) = grown.blocks.last().map(|b| b.pos) {
            if last.len < max {
                let take = (max - last.len).min(rest.len());
                let mut merged = vec![0.0; last.len + take];
                self.factory
                    .retrieve(last.id)?
                    .get_floats(0, &mut merged[..last.len])?;
                merged[last.len..].copy_from_slice(&rest[..take]);

                let block = self.factory.create_from_floats(&merged, self.format)?;
                grown.blocks.pop();
                grown.num_samples = last.start;
                grown.push_block(block);
                rest = &rest[take..];
            }
        }

        for chunk in rest.chunks(max) {
            let block = self.factory.create_from_floats(chunk, self.format)?;
            grown.push_block(block);
        }

        *self = grown;
        Ok(())
    }

    /// Split at sample `at`, keeping `[0, at)` and returning `[at, len)`
    ///
    /// Only the block straddling `at` is rewritten; all others are shared.
    pub fn split_off(&mut self, at: u64) -> Result<Sequence> {
        if at > self.num_samples {
            return Err(ClipstreamError::OutOfRange {
                start: at as i64,
                len: 0,
                available: self.num_samples,
            });
        }

        let index = self.find_block(at);
        let mut left: Vec<HeldBlock> = self.blocks[..index].to_vec();
        let mut right = Sequence::new(Arc::clone(&self.factory), self.format);
        let mut tail = index;

        if let Some(straddling) = self.blocks.get(index).map(|b| b.pos) {
            let offset = (at - straddling.start) as usize;
            if offset > 0 {
                let mut samples = vec![0.0; straddling.len];
                self.factory
                    .retrieve(straddling.id)?
                    .get_floats(0, &mut samples)?;
                let head = self
                    .factory
                    .create_from_floats(&samples[..offset], self.format)?;
                let rest = self
                    .factory
                    .create_from_floats(&samples[offset..], self.format)?;
                left.push(HeldBlock {
                    pos: SeqBlock {
                        start: straddling.start,
                        id: head.id(),
                        len: offset,
                    },
                    handle: head,
                });
                right.push_block(rest);
                tail += 1;
            }
        }

        for block in &self.blocks[tail..] {
            right.push_block(Arc::clone(&block.handle));
        }

        self.blocks = left;
        self.num_samples = at;
        Ok(right)
    }

    /// Append all samples of `other`
    ///
    /// Blocks are shared when both sequences use the same store and format;
    /// otherwise samples are re-encoded into this sequence's format.
    pub fn append_sequence(&mut self, other: &Sequence) -> Result<()> {
        if other.num_samples == 0 {
            return Ok(());
        }
        if other.format == self.format && same_store(&self.factory, &other.factory) {
            for block in &other.blocks {
                self.push_block(Arc::clone(&block.handle));
            }
            return Ok(());
        }
        let samples = other.read_all()?;
        self.append(&samples)
    }

    /// Copy of this sequence stored in `format`
    pub fn convert(&self, format: SampleFormat) -> Result<Sequence> {
        if format == self.format {
            return Ok(self.clone());
        }
        let samples = self.read_all()?;
        Sequence::with_samples(Arc::clone(&self.factory), format, &samples)
    }
}

fn same_store(a: &Arc<dyn SampleBlockFactory>, b: &Arc<dyn SampleBlockFactory>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const u8,
        Arc::as_ptr(b) as *const u8,
    )
}
