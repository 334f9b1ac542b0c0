use std::{
    fmt::{self, Debug},
    mem::size_of,
};

use serde::{Deserialize, Serialize};

use super::inode::InodeNumber;
use crate::error::{FsError, Result};

/// The number of bytes occupied by a directory entry.
pub const DIRECTORY_ENTRY_SIZE: usize = 32;
const_assert!(size_of::<DirectoryEntry>() == DIRECTORY_ENTRY_SIZE);

/// The maximum stored length of a file name. Longer names are truncated.
pub const MAX_NAME_LEN: usize = 28;
const_assert!(size_of::<DirectoryEntryName>() == MAX_NAME_LEN);

/// The inode number stored in an unused entry.
const FREE_INUM: i32 = -1;

/// An unused directory entry.
pub const FREE_DIRECTORY_ENTRY: DirectoryEntry = DirectoryEntry {
    inum: FREE_INUM,
    name: DirectoryEntryName([0; MAX_NAME_LEN]),
};

/// A directory entry, as laid out in the directory's block.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct DirectoryEntry {
    /// The inode number, or -1 for an unused entry.
    pub inum: i32,
    /// The name of the entry.
    pub name: DirectoryEntryName,
}

impl DirectoryEntry {
    /// Constructs a new [`DirectoryEntry`] instance.
    pub fn new(inumber: InodeNumber, name: &str) -> Result<DirectoryEntry> {
        let inum = i32::try_from(inumber).map_err(|_| FsError::InvalidInumber)?;

        Ok(DirectoryEntry {
            inum,
            name: name.try_into()?,
        })
    }

    pub fn is_free(&self) -> bool {
        self.inum == FREE_INUM
    }

    pub fn inumber(&self) -> Option<InodeNumber> {
        InodeNumber::try_from(self.inum).ok()
    }

    /// Decodes the entry stored at the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<DirectoryEntry> {
        Ok(bincode::deserialize(&bytes[..DIRECTORY_ENTRY_SIZE])?)
    }

    /// Encodes the entry into the first [`DIRECTORY_ENTRY_SIZE`] bytes of `bytes`.
    pub fn encode_into(&self, bytes: &mut [u8]) -> Result<()> {
        bincode::serialize_into(&mut bytes[..DIRECTORY_ENTRY_SIZE], self)?;
        Ok(())
    }
}

/// A name, as used in [`DirectoryEntry`]. Nul-padded, not nul-terminated.
#[derive(Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(C)]
pub struct DirectoryEntryName([u8; MAX_NAME_LEN]);

impl DirectoryEntryName {
    /// The stored bytes, without padding.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        &self.0[..len]
    }
}

impl Debug for DirectoryEntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DirectoryEntryName")
            .field(&self.to_string())
            .finish()
    }
}

impl TryFrom<&str> for DirectoryEntryName {
    type Error = FsError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes = value.as_bytes();
        if bytes.is_empty() || bytes.contains(&0) {
            return Err(FsError::InvalidName);
        }

        // never cut a character in half
        let mut len = bytes.len().min(MAX_NAME_LEN);
        while !value.is_char_boundary(len) {
            len -= 1;
        }

        let mut converted = [0; MAX_NAME_LEN];
        converted[..len].copy_from_slice(&bytes[..len]);

        Ok(DirectoryEntryName(converted))
    }
}

impl fmt::Display for DirectoryEntryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}
