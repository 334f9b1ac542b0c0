//! Entries of the directory inode, stored in its single reserved block.

use log::debug;

use crate::error::{FsError, Result};
use crate::inode_table::InodeTable;
use crate::layout::{
    block::{BlockIndex, NO_BLOCK},
    directory_entry::{
        DirectoryEntry, DirectoryEntryName, DIRECTORY_ENTRY_SIZE, FREE_DIRECTORY_ENTRY,
    },
    inode::{InodeKind, InodeNumber},
};
use crate::storage::BlockPool;

/// Fills a directory block with free entries.
pub fn format(block: &mut [u8]) -> Result<()> {
    for slot in block.chunks_exact_mut(DIRECTORY_ENTRY_SIZE) {
        FREE_DIRECTORY_ENTRY.encode_into(slot)?;
    }

    Ok(())
}

/// Decodes every slot of a directory block, free ones included.
pub fn decode_entries(block: &[u8]) -> Result<Vec<DirectoryEntry>> {
    block
        .chunks_exact(DIRECTORY_ENTRY_SIZE)
        .map(DirectoryEntry::decode)
        .collect()
}

/// Name lookups and updates on a directory inode. Content access goes through the block pool's
/// lock.
pub struct DirectoryStore<'a> {
    inodes: &'a InodeTable,
    pool: &'a BlockPool,
}

impl<'a> DirectoryStore<'a> {
    pub fn new(inodes: &'a InodeTable, pool: &'a BlockPool) -> Self {
        DirectoryStore { inodes, pool }
    }

    /// Writes `(name, sub_inumber)` into the first free slot of directory `inumber`.
    pub fn insert(&self, inumber: InodeNumber, sub_inumber: InodeNumber, name: &str) -> Result<()> {
        self.inodes.get(sub_inumber)?;
        let entry = DirectoryEntry::new(sub_inumber, name)?;
        let block_index = self.entries_block(inumber)?;

        let mut blocks = self.pool.write();
        let block = blocks
            .get_mut(block_index)
            .map_err(|_| FsError::IoFault(block_index))?;

        for (slot_index, slot) in block.chunks_exact_mut(DIRECTORY_ENTRY_SIZE).enumerate() {
            if DirectoryEntry::decode(slot)?.is_free() {
                entry.encode_into(slot)?;

                debug!("[inode #{inumber}] entry {slot_index} -> {sub_inumber} ({name})");
                return Ok(());
            }
        }

        Err(FsError::Full)
    }

    /// The inode of the first entry named `name`, in slot order.
    pub fn lookup(&self, inumber: InodeNumber, name: &str) -> Result<Option<InodeNumber>> {
        let Ok(wanted) = DirectoryEntryName::try_from(name) else {
            return Ok(None);
        };

        let block_index = self.entries_block(inumber)?;
        let blocks = self.pool.read();
        let block = blocks
            .get(block_index)
            .map_err(|_| FsError::IoFault(block_index))?;

        for slot in block.chunks_exact(DIRECTORY_ENTRY_SIZE) {
            let entry = DirectoryEntry::decode(slot)?;

            if !entry.is_free() && entry.name == wanted {
                return Ok(entry.inumber());
            }
        }

        Ok(None)
    }

    /// Frees the first entry named `name` and returns the inode it referenced.
    pub fn remove(&self, inumber: InodeNumber, name: &str) -> Result<InodeNumber> {
        let wanted = DirectoryEntryName::try_from(name)?;
        let block_index = self.entries_block(inumber)?;

        let mut blocks = self.pool.write();
        let block = blocks
            .get_mut(block_index)
            .map_err(|_| FsError::IoFault(block_index))?;

        for slot in block.chunks_exact_mut(DIRECTORY_ENTRY_SIZE) {
            let entry = DirectoryEntry::decode(slot)?;

            if !entry.is_free() && entry.name == wanted {
                FREE_DIRECTORY_ENTRY.encode_into(slot)?;
                return entry.inumber().ok_or(FsError::InvalidInumber);
            }
        }

        Err(FsError::NotFound)
    }

    /// The used entries of directory `inumber`, in slot order.
    pub fn entries(&self, inumber: InodeNumber) -> Result<Vec<DirectoryEntry>> {
        let block_index = self.entries_block(inumber)?;
        let blocks = self.pool.read();
        let block = blocks
            .get(block_index)
            .map_err(|_| FsError::IoFault(block_index))?;

        Ok(decode_entries(block)?
            .into_iter()
            .filter(|entry| !entry.is_free())
            .collect())
    }

    fn entries_block(&self, inumber: InodeNumber) -> Result<BlockIndex> {
        let inode = self.inodes.get(inumber)?.read();

        if inode.kind != InodeKind::Directory {
            return Err(FsError::InvalidInumber);
        }

        let first = inode.direct_blocks().next();
        first.ok_or(FsError::IoFault(NO_BLOCK))
    }
}
