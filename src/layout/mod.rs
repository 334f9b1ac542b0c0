/// Perform a const assertion.
macro_rules! const_assert {
    ($($tt:tt)*) => {
        const _: () = assert!($($tt)*);
    }
}

/// Block indices and the indirect block view.
pub mod block;
/// Directory entries and entry names.
pub mod directory_entry;
/// Inodes.
pub mod inode;
