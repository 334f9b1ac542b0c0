use bitvec::vec::BitVec;
use log::{debug, info};
use spin::{Mutex, RwLock};

use crate::addressing;
use crate::bitmap::claim_first_free;
use crate::directory;
use crate::error::{FsError, Resource, Result};
use crate::latency::Latency;
use crate::layout::{
    block::BlockIndex,
    inode::{Inode, InodeKind, InodeNumber},
};
use crate::storage::{BlockPool, Blocks};

/// A fixed array of inodes, each behind its own reader/writer lock.
pub struct InodeTable {
    /// Tracks the allocation status of inodes.
    /// A value of `true` represents "occupied".
    bitmap: Mutex<BitVec>,
    inodes: Vec<RwLock<Inode>>,
    num_direct: usize,
    /// How many bitmap entries are scanned per simulated storage access.
    scan_page: usize,
    latency: Latency,
}

impl InodeTable {
    pub fn new(num_inodes: usize, num_direct: usize, scan_page: usize, latency: Latency) -> Self {
        let mut bitmap = BitVec::new();
        bitmap.resize(num_inodes, false);

        InodeTable {
            bitmap: Mutex::new(bitmap),
            inodes: (0..num_inodes)
                .map(|_| RwLock::new(Inode::new(InodeKind::File, num_direct)))
                .collect(),
            num_direct,
            scan_page,
            latency,
        }
    }

    /// Marks every inode free.
    pub fn reset(&mut self) {
        self.bitmap.get_mut().fill(false);
        for inode in &mut self.inodes {
            *inode.get_mut() = Inode::new(InodeKind::File, self.num_direct);
        }
    }

    /// Takes the lowest free inode and initializes it as an empty `kind`.
    ///
    /// A directory also gets one block of free entries and a size of one block. If that block
    /// cannot be allocated the inode is released again.
    pub fn create(&self, kind: InodeKind, pool: &BlockPool) -> Result<InodeNumber> {
        let inumber = claim_first_free(&mut self.bitmap.lock(), self.scan_page, &self.latency)
            .ok_or(FsError::Exhausted(Resource::Inodes))?;

        self.latency.touch();
        let mut inode = self.inodes[inumber].write();
        *inode = Inode::new(kind, self.num_direct);

        if kind == InodeKind::Directory {
            let mut blocks = pool.write();

            match allocate_directory_block(&mut blocks) {
                Ok(block) => {
                    inode.direct[0] = block;
                    inode.size = blocks.block_size();
                }
                Err(err) => {
                    self.bitmap.lock().set(inumber, false);
                    return Err(err);
                }
            }
        }

        debug!("[inode #{inumber}] created {kind:?}");
        Ok(inumber)
    }

    /// Releases every block of the inode and marks it free.
    ///
    /// The block list is checked before anything is freed: on an addressing fault the inode
    /// stays in use and keeps all of its blocks.
    pub fn delete(&self, inumber: InodeNumber, pool: &BlockPool) -> Result<()> {
        self.latency.touch();
        let mut inode = self.get(inumber)?.write();

        if !self.is_taken(inumber) {
            return Err(FsError::InvalidInumber);
        }

        let freed = addressing::release_all(&mut inode, &mut pool.write())?;
        self.bitmap.lock().set(inumber, false);

        info!("[inode #{inumber}] deleted, {freed} blocks released");
        Ok(())
    }

    /// The inode behind `inumber`. Bounds-checked only; callers take the inode's lock.
    pub fn get(&self, inumber: InodeNumber) -> Result<&RwLock<Inode>> {
        self.latency.touch();
        self.inodes.get(inumber).ok_or(FsError::InvalidInumber)
    }

    pub fn is_taken(&self, inumber: InodeNumber) -> bool {
        self.bitmap
            .lock()
            .get(inumber)
            .is_some_and(|taken| *taken)
    }

    /// The inodes in use, lowest first.
    pub fn taken(&self) -> Vec<InodeNumber> {
        self.bitmap.lock().iter_ones().collect()
    }

    pub fn num_free(&self) -> usize {
        self.bitmap.lock().count_zeros()
    }
}

/// Allocates a block and fills it with free directory entries.
fn allocate_directory_block(blocks: &mut Blocks) -> Result<BlockIndex> {
    let block = blocks.allocate()?;

    if let Err(err) = blocks.get_mut(block).and_then(directory::format) {
        blocks.free(block)?;
        return Err(err);
    }

    Ok(block)
}

#[cfg(test)]
mod tests {
    use crate::layout::{block::NO_BLOCK, inode::ROOT_INODE};

    use super::*;

    fn tables(num_inodes: usize, num_blocks: usize) -> (InodeTable, BlockPool) {
        (
            InodeTable::new(num_inodes, 3, 64, Latency::none()),
            BlockPool::new(num_blocks, 64, Latency::none()),
        )
    }

    #[test]
    fn test_create_is_first_fit() {
        let (inodes, pool) = tables(3, 4);

        assert_eq!(inodes.create(InodeKind::Directory, &pool).unwrap(), ROOT_INODE);
        assert_eq!(inodes.create(InodeKind::File, &pool).unwrap(), 1);
        assert_eq!(inodes.create(InodeKind::File, &pool).unwrap(), 2);
        assert!(matches!(
            inodes.create(InodeKind::File, &pool),
            Err(FsError::Exhausted(Resource::Inodes))
        ));

        inodes.delete(1, &pool).unwrap();
        assert_eq!(inodes.create(InodeKind::File, &pool).unwrap(), 1);
    }

    #[test]
    fn test_directory_gets_one_block() {
        let (inodes, pool) = tables(2, 4);

        let inumber = inodes.create(InodeKind::Directory, &pool).unwrap();
        let inode = inodes.get(inumber).unwrap().read();

        assert_eq!(inode.kind, InodeKind::Directory);
        assert_eq!(inode.size, 64);
        assert_eq!(inode.direct_blocks().collect::<Vec<_>>(), vec![0]);
        assert_eq!(pool.read().num_free(), 3);
    }

    #[test]
    fn test_file_starts_empty() {
        let (inodes, pool) = tables(2, 4);

        let inumber = inodes.create(InodeKind::File, &pool).unwrap();
        let inode = inodes.get(inumber).unwrap().read();

        assert_eq!(inode.size, 0);
        assert_eq!(inode.direct, vec![NO_BLOCK; 3]);
        assert_eq!(pool.read().num_free(), 4);
    }

    #[test]
    fn test_directory_without_blocks_rolls_back() {
        let (inodes, pool) = tables(2, 1);
        pool.allocate().unwrap();

        assert!(matches!(
            inodes.create(InodeKind::Directory, &pool),
            Err(FsError::Exhausted(Resource::Blocks))
        ));
        assert_eq!(inodes.num_free(), 2);
    }

    #[test]
    fn test_delete_releases_blocks() {
        let (inodes, pool) = tables(2, 8);
        let inumber = inodes.create(InodeKind::File, &pool).unwrap();
        {
            let mut inode = inodes.get(inumber).unwrap().write();
            addressing::grow(&mut inode, &mut pool.write(), 5, 3 + 16).unwrap();
            inode.size = 5 * 64;
        }
        assert_eq!(pool.read().num_free(), 2);

        inodes.delete(inumber, &pool).unwrap();

        assert_eq!(pool.read().num_free(), 8);
        assert!(!inodes.is_taken(inumber));
    }

    #[test]
    fn test_delete_invalid_inumber() {
        let (inodes, pool) = tables(2, 2);

        assert!(matches!(inodes.delete(5, &pool), Err(FsError::InvalidInumber)));
        assert!(matches!(inodes.delete(1, &pool), Err(FsError::InvalidInumber)));
        assert!(matches!(inodes.get(2), Err(FsError::InvalidInumber)));
    }

    #[test]
    fn test_taken_never_exceeds_capacity() {
        let (inodes, pool) = tables(4, 4);

        for round in 0..3 {
            while inodes.create(InodeKind::File, &pool).is_ok() {}
            assert_eq!(inodes.taken().len(), 4);

            for inumber in (round % 2..4).step_by(2) {
                inodes.delete(inumber, &pool).unwrap();
            }
            assert!(inodes.taken().len() < 4);
        }
    }
}
