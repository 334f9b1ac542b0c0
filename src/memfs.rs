use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use enumflags2::BitFlags;
use log::{debug, info, warn};
use spin::RwLock;

use crate::{
    addressing,
    config::FsConfig,
    directory::{self, DirectoryStore},
    error::{FsError, Result},
    inode_table::InodeTable,
    layout::{
        block::{BlockIndex, NO_BLOCK},
        inode::{Inode, InodeKind, InodeNumber, ROOT_INODE},
    },
    metadata::{DirEntry, FileStat, Usage},
    open_file::{FileHandle, OpenFile, OpenFileTable, OpenFlag},
    storage::{BlockPool, Blocks},
};

macro_rules! inconsistent {
    ($($arg:tt)*) => {
        return Err(FsError::Inconsistent(format!($($arg)*)))
    };
}

/// An in-memory filesystem with a single flat directory.
///
/// # Locking
///
/// Locks are always taken in this order: the namespace lock, an open file entry, an inode, the
/// block pool. The bitmap locks of the inode and open file tables are never held while
/// acquiring any other lock.
pub struct MemFs {
    config: FsConfig,
    pool: BlockPool,
    inodes: InodeTable,
    open_files: OpenFileTable,
    /// Serializes name resolution against entry creation and removal.
    namespace: RwLock<()>,
}

impl MemFs {
    /// Builds the tables described by `config` and creates the root directory.
    pub fn new(config: FsConfig) -> Result<Self> {
        config.validate()?;

        let mut memfs = MemFs {
            pool: BlockPool::new(config.num_blocks, config.block_size, config.latency.clone()),
            inodes: InodeTable::new(
                config.num_inodes,
                config.num_direct,
                config.block_size,
                config.latency.clone(),
            ),
            open_files: OpenFileTable::new(config.max_open_files),
            namespace: RwLock::new(()),
            config,
        };

        memfs.initialize()?;

        Ok(memfs)
    }

    /// Empties every table and creates the root directory again.
    pub fn initialize(&mut self) -> Result<()> {
        self.pool.reset();
        self.inodes.reset();
        self.open_files.reset();

        let root = self.inodes.create(InodeKind::Directory, &self.pool)?;
        if root != ROOT_INODE {
            inconsistent!("root directory created as inode {root}");
        }

        info!(
            "{} inodes, {} blocks of {} bytes",
            self.config.num_inodes, self.config.num_blocks, self.config.block_size
        );
        info!(
            "{} direct blocks per inode, {} bytes per file at most",
            self.config.num_direct,
            self.config.max_file_size()
        );

        Ok(())
    }

    /// Releases the filesystem. Everything it held is lost.
    pub fn destroy(self) {
        info!("destroying filesystem ({} files open)", self.open_files.num_open());
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// Resolves `/name` to an inode number.
    pub fn lookup(&self, path: &str) -> Result<Option<InodeNumber>> {
        let name = file_name(path)?;

        let _namespace = self.namespace.read();
        self.directory().lookup(ROOT_INODE, name)
    }

    /// Opens `/name` and returns a handle to it.
    ///
    /// An existing file is emptied first with [`OpenFlag::TRUNC`]. With [`OpenFlag::APPEND`] the
    /// cursor starts at the end of the file's last block, otherwise at zero. A missing file is
    /// created only with [`OpenFlag::CREATE`].
    pub fn open(&self, path: &str, flags: impl Into<BitFlags<OpenFlag>>) -> Result<FileHandle> {
        let flags = flags.into();
        let name = file_name(path)?;

        // creating must hold the name exclusively from lookup to insert
        if flags.contains(OpenFlag::CREATE) {
            let _namespace = self.namespace.write();
            self.open_entry(name, flags)
        } else {
            let _namespace = self.namespace.read();
            self.open_entry(name, flags)
        }
    }

    pub fn close(&self, handle: FileHandle) -> Result<()> {
        self.open_files.release(handle)
    }

    /// Writes `data` at the handle's cursor within the file's tail block and returns the number
    /// of bytes written.
    ///
    /// The cursor then becomes the number of bytes written modulo the block size, so a second
    /// write through the same handle lands inside the tail block again. Writes past the maximum
    /// file size are clamped to the room that is left.
    pub fn write(&self, handle: FileHandle, data: &[u8]) -> Result<usize> {
        let mut file = self.open_files.get(handle)?;
        let inumber = file.inumber;
        let block_size = self.config.block_size;

        let mut inode = self.inodes.get(inumber)?.write();
        let mut blocks = self.pool.write();

        let start = (inode.size / block_size) * block_size + file.cursor;
        let len = data
            .len()
            .min(self.config.max_file_size().saturating_sub(start));
        if len == 0 {
            return Ok(0);
        }
        let end = start + len;

        let block_list = addressing::grow(
            &mut inode,
            &mut blocks,
            end.div_ceil(block_size),
            self.config.max_file_blocks(),
        )?;

        let mut position = start;
        while position < end {
            let n = position / block_size;
            let offset = position % block_size;
            let chunk_end = end.min((n + 1) * block_size);

            let index = *block_list.get(n).ok_or(FsError::IoFault(NO_BLOCK))?;
            let block = blocks
                .get_mut(index)
                .map_err(|_| FsError::IoFault(index))?;

            block[offset..offset + (chunk_end - position)]
                .copy_from_slice(&data[position - start..chunk_end - start]);

            position = chunk_end;
            inode.size = inode.size.max(position);
        }

        file.cursor = len % block_size;

        debug!("[inode #{inumber}] wrote {len} bytes at {start} (size = {})", inode.size);
        Ok(len)
    }

    /// Reads into `buf` from the handle's cursor, counted from the start of the file. Returns
    /// the number of bytes read, zero once nothing remains. The cursor does not move.
    pub fn read(&self, handle: FileHandle, buf: &mut [u8]) -> Result<usize> {
        let OpenFile { inumber, cursor } = *self.open_files.get(handle)?;

        self.read_at(inumber, cursor, buf)
    }

    /// Reads the whole file behind `handle`, from its first byte whatever the cursor.
    pub fn read_to_end(&self, handle: FileHandle) -> Result<Vec<u8>> {
        let inumber = self.open_files.get(handle)?.inumber;
        let size = self.inodes.get(inumber)?.read().size;

        let mut contents = vec![0; size];
        let read = self.read_at(inumber, 0, &mut contents)?;
        contents.truncate(read);

        Ok(contents)
    }

    fn read_at(&self, inumber: InodeNumber, cursor: usize, buf: &mut [u8]) -> Result<usize> {
        let block_size = self.config.block_size;

        let inode = self.inodes.get(inumber)?.read();

        let len = buf.len().min(inode.size.saturating_sub(cursor));
        if len == 0 {
            return Ok(0);
        }
        let end = cursor + len;

        let blocks = self.pool.read();
        let block_list = addressing::block_list(&inode, &blocks)?;

        let mut position = cursor;
        while position < end {
            let n = position / block_size;
            let offset = position % block_size;
            let chunk_end = end.min((n + 1) * block_size);

            let index = *block_list.get(n).ok_or(FsError::IoFault(NO_BLOCK))?;
            let block = blocks.get(index).map_err(|_| FsError::IoFault(index))?;

            buf[position - cursor..chunk_end - cursor]
                .copy_from_slice(&block[offset..offset + (chunk_end - position)]);

            position = chunk_end;
        }

        debug!("[inode #{inumber}] read {len} bytes at {cursor}");
        Ok(len)
    }

    /// Copies the contents of `/name` into a new host file at `destination`.
    ///
    /// A host file that was partially written before a failure is left in place.
    pub fn export<P: AsRef<Path>>(&self, path: &str, destination: P) -> Result<()> {
        let destination = destination.as_ref();

        if self.lookup(path)?.is_none() {
            return Err(FsError::NotFound);
        }

        let mut host_file = File::create(destination)?;
        let handle = self.open(path, OpenFlag::read_only())?;

        let copied = self.read_to_end(handle).and_then(|contents| {
            host_file.write_all(&contents)?;
            Ok(contents.len())
        });
        self.close(handle)?;
        let copied = copied?;

        info!("exported {path} to {} ({copied} bytes)", destination.display());
        Ok(())
    }

    /// Copies the host file at `source` into `/name`, creating or emptying it first. Returns the
    /// number of bytes stored, which is clamped to the maximum file size.
    pub fn import<P: AsRef<Path>>(&self, source: P, path: &str) -> Result<usize> {
        let source = source.as_ref();
        let contents = fs::read(source)?;

        let handle = self.open(path, OpenFlag::CREATE | OpenFlag::TRUNC)?;
        let written = self.write(handle, &contents);
        self.close(handle)?;
        let written = written?;

        if written < contents.len() {
            warn!(
                "{} is {} bytes, only {written} fit in {path}",
                source.display(),
                contents.len()
            );
        }

        info!("imported {} to {path} ({written} bytes)", source.display());
        Ok(written)
    }

    /// Removes `/name` and releases its inode and blocks. Fails with [`FsError::Busy`] while any
    /// handle to the file is open.
    pub fn unlink(&self, path: &str) -> Result<()> {
        let name = file_name(path)?;

        let _namespace = self.namespace.write();
        let directory = self.directory();

        let inumber = directory
            .lookup(ROOT_INODE, name)?
            .ok_or(FsError::NotFound)?;

        if self.open_files.is_open(inumber) {
            return Err(FsError::Busy);
        }

        self.inodes.delete(inumber, &self.pool)?;
        directory.remove(ROOT_INODE, name)?;

        info!("[inode #{inumber}] unlinked {path}");
        Ok(())
    }

    pub fn stat(&self, path: &str) -> Result<FileStat> {
        let name = file_name(path)?;

        let _namespace = self.namespace.read();
        let inumber = self
            .directory()
            .lookup(ROOT_INODE, name)?
            .ok_or(FsError::NotFound)?;

        let inode = self.inodes.get(inumber)?.read();
        let blocks = self.pool.read();
        let data_blocks = addressing::block_list(&inode, &blocks)?.len();

        Ok(FileStat {
            inumber,
            kind: inode.kind,
            size: inode.size,
            blocks: data_blocks + usize::from(inode.has_indirect()),
        })
    }

    /// The used entries of the directory, in slot order.
    pub fn read_dir(&self) -> Result<Vec<DirEntry>> {
        let _namespace = self.namespace.read();

        Ok(self
            .directory()
            .entries(ROOT_INODE)?
            .into_iter()
            .filter_map(|entry| {
                Some(DirEntry {
                    inumber: entry.inumber()?,
                    name: entry.name.to_string(),
                })
            })
            .collect())
    }

    pub fn usage(&self) -> Usage {
        Usage {
            free_inodes: self.inodes.num_free(),
            free_blocks: self.pool.read().num_free(),
            open_files: self.open_files.num_open(),
        }
    }

    /// Checks the tables for consistency.
    ///
    /// Every directory entry must reference a file inode in use, and every file inode in use
    /// must be linked exactly once. Every inode must hold exactly the blocks its size needs. No
    /// block may be reachable twice. Every allocated block must be reachable.
    pub fn check(&self) -> Result<()> {
        let _namespace = self.namespace.write();

        let taken: HashSet<InodeNumber> = self.inodes.taken().into_iter().collect();
        let inodes = (0..self.config.num_inodes)
            .map(|inumber| self.inodes.get(inumber).map(|inode| inode.read()))
            .collect::<Result<Vec<_>>>()?;
        let blocks = self.pool.read();

        let root = &inodes[ROOT_INODE];
        if !taken.contains(&ROOT_INODE) || root.kind != InodeKind::Directory {
            inconsistent!("root inode does not represent a directory");
        }

        let mut reachable = HashSet::new();
        for inumber in 0..self.config.num_inodes {
            let inode = &inodes[inumber];

            if !taken.contains(&inumber) {
                if inode.direct_blocks().next().is_some() || inode.has_indirect() {
                    warn!("free inode {inumber} still lists blocks");
                }

                continue;
            }

            self.check_blocks(inumber, inode, &blocks, &mut reachable)?;
        }

        let allocated = blocks.allocated().count();
        if allocated != reachable.len() {
            inconsistent!(
                "{} allocated blocks are not reachable from any inode",
                allocated - reachable.len()
            );
        }

        let root_block = root.direct[0];
        let entries = directory::decode_entries(
            blocks
                .get(root_block)
                .map_err(|_| FsError::IoFault(root_block))?,
        )?;

        let mut names = HashSet::new();
        let mut linked = HashSet::new();
        for entry in entries.iter().filter(|entry| !entry.is_free()) {
            let Some(inumber) = entry.inumber() else {
                inconsistent!("invalid inode number in directory entry: {}", entry.inum);
            };

            if !taken.contains(&inumber) {
                inconsistent!("entry {} references free inode {inumber}", entry.name);
            }

            if inodes[inumber].kind != InodeKind::File {
                inconsistent!("entry {} does not reference a file", entry.name);
            }

            if !names.insert(entry.name.to_string()) {
                inconsistent!("directory contains duplicate entry: {}", entry.name);
            }

            if !linked.insert(inumber) {
                inconsistent!("inode {inumber} is linked more than once");
            }
        }

        if let Some(unlinked) = taken
            .iter()
            .find(|&&inumber| inumber != ROOT_INODE && !linked.contains(&inumber))
        {
            inconsistent!("inode {unlinked} is not linked from the directory");
        }

        Ok(())
    }

    fn check_blocks(
        &self,
        inumber: InodeNumber,
        inode: &Inode,
        blocks: &Blocks,
        reachable: &mut HashSet<BlockIndex>,
    ) -> Result<()> {
        let block_size = self.config.block_size;

        if inode.size > self.config.max_file_size() {
            inconsistent!("size of inode {inumber} is greater than the maximum file size");
        }

        if inode.kind == InodeKind::Directory && inode.size != block_size {
            inconsistent!("directory size {} is not one block", inode.size);
        }

        let block_list = match addressing::block_list(inode, blocks) {
            Ok(block_list) => block_list,
            Err(err) => inconsistent!("inode {inumber}: {err}"),
        };

        if block_list.len() != inode.size.div_ceil(block_size) {
            inconsistent!(
                "inode {inumber} holds {} blocks for {} bytes",
                block_list.len(),
                inode.size
            );
        }

        if inode.has_indirect() != (block_list.len() > self.config.num_direct) {
            inconsistent!("indirect block of inode {inumber} does not match its size");
        }

        let owned = block_list
            .into_iter()
            .chain(inode.has_indirect().then_some(inode.indirect));

        for index in owned {
            if !blocks.contains(index) {
                inconsistent!("block {index} of inode {inumber} is not allocated");
            }

            if !reachable.insert(index) {
                inconsistent!("block {index} is referenced more than once");
            }
        }

        Ok(())
    }

    fn open_entry(&self, name: &str, flags: BitFlags<OpenFlag>) -> Result<FileHandle> {
        let directory = self.directory();

        let (inumber, cursor) = match directory.lookup(ROOT_INODE, name)? {
            Some(inumber) => {
                if flags.contains(OpenFlag::TRUNC) {
                    self.truncate(inumber)?;
                }

                let size = self.inodes.get(inumber)?.read().size;
                let cursor = if flags.contains(OpenFlag::APPEND) {
                    size % self.config.block_size
                } else {
                    0
                };

                (inumber, cursor)
            }
            None if flags.contains(OpenFlag::CREATE) => {
                let inumber = self.inodes.create(InodeKind::File, &self.pool)?;

                if let Err(err) = directory.insert(ROOT_INODE, inumber, name) {
                    warn!("unable to link /{name} ({err}), deleting inode {inumber}");
                    self.inodes.delete(inumber, &self.pool)?;
                    return Err(err);
                }

                info!("[inode #{inumber}] created /{name}");
                (inumber, 0)
            }
            None => return Err(FsError::NotFound),
        };

        // if this fails for a file created above, the file stays created but is not opened
        self.open_files.acquire(inumber, cursor)
    }

    /// Releases every block of the file and sets its size to zero.
    fn truncate(&self, inumber: InodeNumber) -> Result<()> {
        let mut inode = self.inodes.get(inumber)?.write();
        let mut blocks = self.pool.write();

        let freed = addressing::release_all(&mut inode, &mut blocks)?;

        info!("[inode #{inumber}] truncated, {freed} blocks released");
        Ok(())
    }

    fn directory(&self) -> DirectoryStore<'_> {
        DirectoryStore::new(&self.inodes, &self.pool)
    }
}

/// Strips the separator from a path of the form `/name`.
fn file_name(path: &str) -> Result<&str> {
    match path.strip_prefix('/') {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(FsError::InvalidPath),
    }
}
