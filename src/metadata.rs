use crate::layout::inode::{InodeKind, InodeNumber};

/// The attributes of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub inumber: InodeNumber,
    pub kind: InodeKind,
    /// Size in bytes.
    pub size: usize,
    /// Blocks held, including the indirect block.
    pub blocks: usize,
}

/// A used entry of the directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub inumber: InodeNumber,
}

/// Occupancy of the fixed tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    pub free_inodes: usize,
    pub free_blocks: usize,
    pub open_files: usize,
}
