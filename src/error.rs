use std::fmt;

use thiserror::Error;

use crate::layout::block::BlockIndex;

/// A table whose capacity was exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Inodes,
    Blocks,
    OpenFiles,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Inodes => "inodes",
            Resource::Blocks => "data blocks",
            Resource::OpenFiles => "open file entries",
        };

        write!(f, "{name}")
    }
}

#[derive(Error, Debug)]
pub enum FsError {
    #[error("path must start with \"/\" and name a file")]
    InvalidPath,
    #[error("invalid file name")]
    InvalidName,
    #[error("found no file at path")]
    NotFound,
    #[error("no more free {0}")]
    Exhausted(Resource),
    #[error("file handle is not open")]
    InvalidHandle,
    #[error("inode number is out of range or not in use")]
    InvalidInumber,
    #[error("block index is out of range")]
    InvalidBlock,
    #[error("directory has no free entry")]
    Full,
    #[error("block {0} could not be resolved")]
    IoFault(BlockIndex),
    #[error("file is still open")]
    Busy,
    #[error("filesystem is inconsistent: {0}")]
    Inconsistent(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("directory entry encoding")]
    Encoding(#[from] bincode::Error),
    #[error("host filesystem")]
    HostIo(#[from] std::io::Error),
}

pub type Result<T, E = FsError> = std::result::Result<T, E>;
