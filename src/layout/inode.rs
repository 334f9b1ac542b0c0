use super::block::{BlockIndex, NO_BLOCK};

// inode numbers are stored as `i32`s in directory entries, but we use `usize`s to avoid
// littering the code with casts.
pub type InodeNumber = usize;

/// The inode of the single directory. Created once at initialization, never deleted.
pub const ROOT_INODE: InodeNumber = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InodeKind {
    /// This inode describes a regular data file.
    File,
    /// This inode describes the directory.
    Directory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inode {
    /// file type
    pub kind: InodeKind,
    /// file size in bytes
    pub size: usize,
    /// block indices for the first `direct.len()` blocks, [`NO_BLOCK`]-terminated
    pub direct: Vec<BlockIndex>,
    /// block holding the indices of the following blocks, or [`NO_BLOCK`]
    pub indirect: BlockIndex,
}

impl Inode {
    pub fn new(kind: InodeKind, num_direct: usize) -> Self {
        Inode {
            kind,
            size: 0,
            direct: vec![NO_BLOCK; num_direct],
            indirect: NO_BLOCK,
        }
    }

    /// The direct block indices in use, in file order.
    pub fn direct_blocks(&self) -> impl Iterator<Item = BlockIndex> + '_ {
        self.direct.iter().copied().take_while(|&b| b != NO_BLOCK)
    }

    pub fn has_indirect(&self) -> bool {
        self.indirect != NO_BLOCK
    }

    /// Forgets every block and sets the size to zero. Does not release anything.
    pub fn clear_blocks(&mut self) {
        self.size = 0;
        self.direct.fill(NO_BLOCK);
        self.indirect = NO_BLOCK;
    }
}
