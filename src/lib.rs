mod addressing;
mod bitmap;
pub mod config;
mod directory;
pub mod error;
mod inode_table;
pub mod latency;
pub mod layout;
pub mod memfs;
pub mod metadata;
pub mod open_file;
pub mod storage;

pub use config::FsConfig;
pub use error::{FsError, Resource, Result};
pub use latency::Latency;
pub use layout::inode::{InodeKind, InodeNumber, ROOT_INODE};
pub use memfs::MemFs;
pub use metadata::{DirEntry, FileStat, Usage};
pub use open_file::{FileHandle, OpenFlag};
