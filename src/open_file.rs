use bitvec::vec::BitVec;
use enumflags2::{bitflags, BitFlags};
use log::debug;
use spin::{Mutex, MutexGuard};

use crate::error::{FsError, Resource, Result};
use crate::layout::inode::InodeNumber;

/// An index into the open file table.
pub type FileHandle = usize;

#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// Create the file if it does not exist.
    CREATE = 0b001,
    /// Release the file's contents before handing it out.
    TRUNC = 0b010,
    /// Start the cursor at the end of the file's last block.
    APPEND = 0b100,
}

impl OpenFlag {
    // enumflags2 rejects zero-valued flags
    /// Opens an existing file without modifying it.
    pub fn read_only() -> BitFlags<OpenFlag> {
        BitFlags::empty()
    }
}

/// The state behind an open file handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenFile {
    pub inumber: InodeNumber,
    /// Offset within the block currently being read or appended to.
    pub cursor: usize,
}

/// A fixed array of open file entries.
///
/// The bitmap lock only guards handle allocation and release. Each entry has its own lock,
/// taken before the lock of the inode it references.
pub struct OpenFileTable {
    /// Tracks the allocation status of entries.
    /// A value of `true` represents "occupied".
    bitmap: Mutex<BitVec>,
    entries: Vec<Mutex<OpenFile>>,
}

impl OpenFileTable {
    pub fn new(max_open_files: usize) -> Self {
        let mut bitmap = BitVec::new();
        bitmap.resize(max_open_files, false);

        OpenFileTable {
            bitmap: Mutex::new(bitmap),
            entries: (0..max_open_files)
                .map(|_| {
                    Mutex::new(OpenFile {
                        inumber: 0,
                        cursor: 0,
                    })
                })
                .collect(),
        }
    }

    /// Releases every handle.
    pub fn reset(&mut self) {
        self.bitmap.get_mut().fill(false);
    }

    /// Installs `(inumber, cursor)` in the lowest free entry.
    pub fn acquire(&self, inumber: InodeNumber, cursor: usize) -> Result<FileHandle> {
        let mut bitmap = self.bitmap.lock();
        let handle = bitmap
            .first_zero()
            .ok_or(FsError::Exhausted(Resource::OpenFiles))?;

        *self.entries[handle].lock() = OpenFile { inumber, cursor };
        bitmap.set(handle, true);

        debug!("[inode #{inumber}] opened as handle {handle} (cursor = {cursor})");
        Ok(handle)
    }

    pub fn release(&self, handle: FileHandle) -> Result<()> {
        let mut bitmap = self.bitmap.lock();

        if !bitmap.get(handle).is_some_and(|taken| *taken) {
            return Err(FsError::InvalidHandle);
        }

        bitmap.set(handle, false);
        Ok(())
    }

    /// The entry behind an open handle, locked.
    pub fn get(&self, handle: FileHandle) -> Result<MutexGuard<'_, OpenFile>> {
        if !self.is_taken(handle) {
            return Err(FsError::InvalidHandle);
        }

        Ok(self.entries[handle].lock())
    }

    /// Whether any open handle references `inumber`.
    pub fn is_open(&self, inumber: InodeNumber) -> bool {
        let bitmap = self.bitmap.lock();

        bitmap
            .iter_ones()
            .any(|handle| self.entries[handle].lock().inumber == inumber)
    }

    pub fn num_open(&self) -> usize {
        self.bitmap.lock().count_ones()
    }

    fn is_taken(&self, handle: FileHandle) -> bool {
        self.bitmap
            .lock()
            .get(handle)
            .is_some_and(|taken| *taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_is_first_fit() {
        let table = OpenFileTable::new(3);

        assert_eq!(table.acquire(4, 0).unwrap(), 0);
        assert_eq!(table.acquire(4, 10).unwrap(), 1);
        assert_eq!(table.acquire(7, 0).unwrap(), 2);
        assert!(matches!(
            table.acquire(7, 0),
            Err(FsError::Exhausted(Resource::OpenFiles))
        ));

        table.release(1).unwrap();
        assert_eq!(table.acquire(9, 3).unwrap(), 1);
        assert_eq!(*table.get(1).unwrap(), OpenFile { inumber: 9, cursor: 3 });
    }

    #[test]
    fn test_closed_handle_is_invalid() {
        let table = OpenFileTable::new(2);
        let handle = table.acquire(1, 0).unwrap();

        table.release(handle).unwrap();

        assert!(matches!(table.release(handle), Err(FsError::InvalidHandle)));
        assert!(matches!(table.get(handle), Err(FsError::InvalidHandle)));
        assert!(matches!(table.get(99), Err(FsError::InvalidHandle)));
        assert!(matches!(table.release(99), Err(FsError::InvalidHandle)));
    }

    #[test]
    fn test_cursor_updates_stick() {
        let table = OpenFileTable::new(1);
        let handle = table.acquire(2, 0).unwrap();

        table.get(handle).unwrap().cursor = 17;

        assert_eq!(table.get(handle).unwrap().cursor, 17);
    }

    #[test]
    fn test_is_open() {
        let table = OpenFileTable::new(4);
        let first = table.acquire(2, 0).unwrap();
        table.acquire(2, 0).unwrap();
        table.acquire(5, 0).unwrap();

        assert!(table.is_open(2));
        assert!(!table.is_open(3));

        table.release(first).unwrap();
        assert!(table.is_open(2));
        assert_eq!(table.num_open(), 2);
    }

    #[test]
    fn test_flags_combine() {
        let flags = OpenFlag::CREATE | OpenFlag::APPEND;

        assert!(flags.contains(OpenFlag::CREATE));
        assert!(!flags.contains(OpenFlag::TRUNC));
        assert!(OpenFlag::read_only().is_empty());
    }
}
