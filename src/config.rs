use crate::error::{FsError, Result};
use crate::latency::Latency;
use crate::layout::{
    block::{BlockIndex, BLOCK_INDEX_SIZE, NO_BLOCK},
    directory_entry::DIRECTORY_ENTRY_SIZE,
};

/// Capacities of a [`crate::MemFs`] instance. Fixed for the lifetime of the instance.
#[derive(Clone, Debug)]
pub struct FsConfig {
    /// The number of inodes, including the root directory.
    pub num_inodes: usize,
    /// The number of data blocks in the pool.
    pub num_blocks: usize,
    /// The size of a block in bytes.
    pub block_size: usize,
    /// The number of files that can be open at once.
    pub max_open_files: usize,
    /// The number of direct block slots in every inode.
    pub num_direct: usize,
    /// Simulated latency of storage accesses.
    pub latency: Latency,
}

impl Default for FsConfig {
    fn default() -> Self {
        FsConfig {
            num_inodes: 50,
            num_blocks: 1024,
            block_size: 1024,
            max_open_files: 20,
            num_direct: 10,
            latency: Latency::none(),
        }
    }
}

impl FsConfig {
    /// The number of block indices that fit in the indirect block.
    pub fn indirect_capacity(&self) -> usize {
        self.block_size / BLOCK_INDEX_SIZE
    }

    /// The number of entries the directory's block holds.
    pub fn max_dir_entries(&self) -> usize {
        self.block_size / DIRECTORY_ENTRY_SIZE
    }

    /// The number of data blocks a single file can address.
    pub fn max_file_blocks(&self) -> usize {
        self.num_direct + self.indirect_capacity()
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_blocks() * self.block_size
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(FsError::InvalidConfig(reason.to_string()));

        if self.num_inodes == 0 {
            return invalid("at least one inode is needed for the root directory");
        }

        if i32::try_from(self.num_inodes).is_err() {
            return invalid("inode numbers must fit in a directory entry");
        }

        if self.num_blocks == 0 {
            return invalid("at least one block is needed for the root directory");
        }

        if BlockIndex::try_from(self.num_blocks).map_or(true, |n| n >= NO_BLOCK) {
            return invalid("block indices must fit in 32 bits");
        }

        if self.block_size < DIRECTORY_ENTRY_SIZE {
            return invalid("a block must hold at least one directory entry");
        }

        if self.block_size % BLOCK_INDEX_SIZE != 0 {
            return invalid("the block size must be a multiple of the block index size");
        }

        if self.max_open_files == 0 {
            return invalid("at least one open file is needed");
        }

        if self.num_direct == 0 {
            return invalid("inodes need at least one direct block");
        }

        Ok(())
    }
}
