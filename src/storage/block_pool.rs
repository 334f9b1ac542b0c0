use bitvec::vec::BitVec;
use log::debug;
use spin::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::bitmap::claim_first_free;
use crate::error::{FsError, Resource, Result};
use crate::latency::Latency;
use crate::layout::block::BlockIndex;

/// A fixed array of fixed-size blocks behind a single reader/writer lock.
///
/// The lock guards both the free bitmap and block contents: allocating or freeing takes the
/// write lock, reading or writing contents takes either form. Callers that also hold an inode
/// lock must acquire it before this one.
pub struct BlockPool {
    blocks: RwLock<Blocks>,
}

/// The contents of a [`BlockPool`], reachable through one of its lock guards.
pub struct Blocks {
    block_size: usize,
    data: Vec<Box<[u8]>>,
    /// Tracks the allocation status of blocks.
    /// A value of `true` represents "occupied".
    bitmap: BitVec,
    latency: Latency,
}

impl BlockPool {
    pub fn new(num_blocks: usize, block_size: usize, latency: Latency) -> Self {
        let data = (0..num_blocks)
            .map(|_| vec![0; block_size].into_boxed_slice())
            .collect();

        let mut bitmap = BitVec::new();
        bitmap.resize(num_blocks, false);

        BlockPool {
            blocks: RwLock::new(Blocks {
                block_size,
                data,
                bitmap,
                latency,
            }),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Blocks> {
        self.blocks.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Blocks> {
        self.blocks.write()
    }

    /// Allocates one block under the write lock.
    pub fn allocate(&self) -> Result<BlockIndex> {
        self.write().allocate()
    }

    /// Frees one block under the write lock.
    pub fn free(&self, index: BlockIndex) -> Result<()> {
        self.write().free(index)
    }

    /// Marks every block free.
    pub fn reset(&mut self) {
        let blocks = self.blocks.get_mut();
        blocks.bitmap.fill(false);
        blocks.data.iter_mut().for_each(|block| block.fill(0));
    }
}

impl Blocks {
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_free(&self) -> usize {
        self.bitmap.count_zeros()
    }

    /// Whether `index` is in range and currently allocated.
    pub fn contains(&self, index: BlockIndex) -> bool {
        self.slot(index).is_some_and(|slot| self.bitmap[slot])
    }

    /// The allocated block indices, lowest first.
    pub fn allocated(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        self.bitmap.iter_ones().map(|slot| slot as BlockIndex)
    }

    /// Claims the lowest free block.
    pub fn allocate(&mut self) -> Result<BlockIndex> {
        let index = claim_first_free(&mut self.bitmap, self.block_size, &self.latency)
            .ok_or(FsError::Exhausted(Resource::Blocks))?;

        debug!("allocated block {index}");
        Ok(index as BlockIndex)
    }

    pub fn free(&mut self, index: BlockIndex) -> Result<()> {
        let slot = self.slot(index).ok_or(FsError::InvalidBlock)?;

        self.latency.touch();
        self.bitmap.set(slot, false);

        Ok(())
    }

    /// The bytes of block `index`. Offsets within the block are the caller's to check.
    pub fn get(&self, index: BlockIndex) -> Result<&[u8]> {
        let slot = self.slot(index).ok_or(FsError::InvalidBlock)?;

        self.latency.touch();
        Ok(&self.data[slot])
    }

    pub fn get_mut(&mut self, index: BlockIndex) -> Result<&mut [u8]> {
        let slot = self.slot(index).ok_or(FsError::InvalidBlock)?;

        self.latency.touch();
        Ok(&mut self.data[slot])
    }

    fn slot(&self, index: BlockIndex) -> Option<usize> {
        let slot = index as usize;
        (slot < self.data.len()).then_some(slot)
    }
}
