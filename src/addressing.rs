//! Direct/indirect block addressing.
//!
//! A file's blocks are its direct slots in order, up to the first unused slot, followed by the
//! entries of its indirect block once every direct slot is in use. Read, write, truncate and
//! delete all walk this same order.

use log::warn;

use crate::error::{FsError, Result};
use crate::layout::{
    block::{BlockIndex, IndirectBlock, IndirectBlockMut},
    inode::Inode,
};
use crate::storage::Blocks;

/// The data blocks of `inode`, in file order.
pub fn block_list(inode: &Inode, blocks: &Blocks) -> Result<Vec<BlockIndex>> {
    let mut list: Vec<BlockIndex> = inode.direct_blocks().collect();

    if list.len() == inode.direct.len() && inode.has_indirect() {
        let indirect = blocks
            .get(inode.indirect)
            .map_err(|_| FsError::IoFault(inode.indirect))?;

        list.extend(IndirectBlock::new(indirect).iter());
    }

    Ok(list)
}

/// Extends `inode` to at least `target` data blocks, but never past `max_blocks`, and returns its
/// full block list.
///
/// Direct slots are filled first, then the indirect block is allocated and filled. New blocks
/// are zeroed. If the pool runs out, every block reserved by this call is freed again and the
/// inode is left untouched.
pub fn grow(
    inode: &mut Inode,
    blocks: &mut Blocks,
    target: usize,
    max_blocks: usize,
) -> Result<Vec<BlockIndex>> {
    let mut list = block_list(inode, blocks)?;

    let num_direct = inode.direct.len();
    let target = target.min(max_blocks);
    if list.len() >= target {
        return Ok(list);
    }

    let needs_indirect = target > num_direct && !inode.has_indirect();
    let wanted = target - list.len() + usize::from(needs_indirect);

    let mut reserved = Vec::with_capacity(wanted);
    while reserved.len() < wanted {
        match blocks.allocate() {
            Ok(index) => reserved.push(index),
            Err(err) => {
                warn!(
                    "out of blocks after reserving {} of {wanted}, rolling back",
                    reserved.len()
                );

                for index in reserved {
                    blocks.free(index)?;
                }

                return Err(err);
            }
        }
    }

    for &index in &reserved {
        blocks.get_mut(index)?.fill(0);
    }

    let mut fresh = reserved.into_iter();
    if needs_indirect {
        if let Some(index) = fresh.next() {
            IndirectBlockMut::new(blocks.get_mut(index)?).clear();
            inode.indirect = index;
        }
    }

    for index in fresh {
        let slot = list.len();

        if slot < num_direct {
            inode.direct[slot] = index;
        } else {
            let indirect = inode.indirect;
            let block = blocks
                .get_mut(indirect)
                .map_err(|_| FsError::IoFault(indirect))?;

            IndirectBlockMut::new(block).set(slot - num_direct, index);
        }

        list.push(index);
    }

    Ok(list)
}

/// Frees every data block of `inode` and its indirect block, then empties the inode.
/// Returns the number of blocks freed.
///
/// The whole list is resolved and checked before anything is freed, so an addressing fault
/// leaves both the inode and the pool as they were.
pub fn release_all(inode: &mut Inode, blocks: &mut Blocks) -> Result<usize> {
    let mut list = block_list(inode, blocks)?;
    if inode.has_indirect() {
        list.push(inode.indirect);
    }

    if let Some(&bad) = list.iter().find(|&&index| !blocks.contains(index)) {
        return Err(FsError::IoFault(bad));
    }

    for &index in &list {
        blocks.free(index)?;
    }

    inode.clear_blocks();

    Ok(list.len())
}
