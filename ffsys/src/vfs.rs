//! # Handle layer
//!
//! Byte-oriented access to named files through small integer file
//! descriptors: open, read, write, seek, close.

use enumflags2::{bitflags, BitFlags};
use log::debug;

use crate::error::{ErrorCode, FsError};
use crate::fs::FileFileSystem;
use crate::layout::Superblock;
use crate::NULL_ADDRESS;

/// Integer token identifying an open file; the smallest value not in
/// use is handed out at `open`.
pub type Fd = i32;

/// Policy for opening a file.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// Clear the file's contents when opening, otherwise keep them.
    Truncate = 0x01,
    /// Create the file if it doesn't exist, otherwise only open
    /// existing files.
    Create = 0x02,
    /// Set the position to the file's end after opening, otherwise 0.
    End = 0x04,
}

/// An open file: its inode and the current byte position.
#[derive(Debug, Clone)]
pub(crate) struct OpenFile {
    pub(crate) inode_i: u32,
    pub(crate) pos: u64,
}

/// A live file's metadata, as reported by [`FileFileSystem::files`].
#[derive(Debug, Clone)]
pub struct FileStat {
    pub name: String,
    pub inode_i: u32,
    pub size: u64,
    /// Seconds since the epoch at creation.
    pub created_time: u64,
    /// Leading file blocks with a reserved data block behind them.
    pub reserved_blocks: usize,
}

/// One open handle's state, as reported by
/// [`FileFileSystem::open_files`].
#[derive(Debug, Clone, Copy)]
pub struct OpenFileStat {
    pub fd: Fd,
    pub inode_i: u32,
    pub pos: u64,
}

impl FileFileSystem {
    /// Opens the file named `name` according to `flags` and returns a
    /// fresh descriptor.
    ///
    /// `Create` means create-if-absent: an existing file is opened as
    /// is. A freshly created file gets its first data block reserved
    /// best-effort; when none is free the open still succeeds and later
    /// writes report the exhaustion.
    pub fn open(&mut self, name: &str, flags: impl Into<BitFlags<OpenFlag>>) -> Result<Fd, FsError> {
        let flags = flags.into();

        let mut file = match self.find_file(name)? {
            Some(inode) => inode,
            None if !flags.contains(OpenFlag::Create) => {
                return self.fail(FsError::NoSuchFile);
            }
            None => self.create_file(name)?,
        };

        if flags.contains(OpenFlag::Truncate) {
            file.size = 0;
            self.free_unused_file_blocks(&mut file)?;
        }

        let fd = self.lowest_free_fd();
        let pos = if flags.contains(OpenFlag::End) {
            file.size
        } else {
            0
        };
        self.open_files.insert(
            fd,
            OpenFile {
                inode_i: file.index,
                pos,
            },
        );

        debug!("open {name:?} flags={flags:?} fd={fd}");
        Ok(fd)
    }

    /// Reads up to `buf.len()` bytes from the descriptor's position and
    /// advances it by the count actually read.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, FsError> {
        let Some(file) = self.open_files.get(&fd) else {
            return self.fail(FsError::NoSuchFileDescriptor);
        };
        let (inode_i, pos) = (file.inode_i, file.pos);

        let inode = match self.read_inode(inode_i) {
            Ok(inode) => inode,
            Err(_) => return self.fail(FsError::CantReadInode),
        };

        let count = self.read_file_bytes(&inode, buf, pos)?;
        if let Some(file) = self.open_files.get_mut(&fd) {
            file.pos += count as u64;
        }
        Ok(count)
    }

    /// Writes `buf` at the descriptor's position and advances it by the
    /// count actually written, which falls short of `buf.len()` once
    /// block allocation is exhausted.
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, FsError> {
        let Some(file) = self.open_files.get(&fd) else {
            return self.fail(FsError::NoSuchFileDescriptor);
        };
        let (inode_i, pos) = (file.inode_i, file.pos);

        let mut inode = match self.read_inode(inode_i) {
            Ok(inode) => inode,
            Err(_) => return self.fail(FsError::CantReadInode),
        };

        let count = self.write_file_bytes(&mut inode, buf, pos)?;
        if let Some(file) = self.open_files.get_mut(&fd) {
            file.pos += count as u64;
        }
        Ok(count)
    }

    /// Releases the descriptor.
    pub fn close(&mut self, fd: Fd) -> Result<(), FsError> {
        match self.open_files.remove(&fd) {
            Some(_) => Ok(()),
            None => self.fail(FsError::NoSuchFileDescriptor),
        }
    }

    /// Moves the descriptor's position; `pos` may not pass the file's
    /// end.
    pub fn seek(&mut self, fd: Fd, pos: u64) -> Result<(), FsError> {
        let Some(file) = self.open_files.get(&fd) else {
            return self.fail(FsError::NoSuchFileDescriptor);
        };

        let inode = match self.read_inode(file.inode_i) {
            Ok(inode) => inode,
            Err(_) => return self.fail(FsError::CantReadInode),
        };
        if inode.size < pos {
            return Err(FsError::SeekPastEnd);
        }

        if let Some(file) = self.open_files.get_mut(&fd) {
            file.pos = pos;
        }
        Ok(())
    }

    /// The code of the most recently recorded failure.
    #[inline]
    pub fn last_error(&self) -> ErrorCode {
        self.errnum
    }

    /// Puts the recorded code back to [`ErrorCode::NoError`].
    #[inline]
    pub fn reset_error(&mut self) {
        self.errnum = ErrorCode::NoError;
    }

    /// Metadata for every live file, in inode order.
    pub fn files(&mut self) -> Result<Vec<FileStat>, FsError> {
        let mut stats = Vec::new();

        for inode_i in 0..self.sb.n_inodes as u32 {
            if self.inode_bitmap.is_free(inode_i as usize) {
                continue;
            }
            let inode = match self.read_inode(inode_i) {
                Ok(inode) => inode,
                Err(_) => return self.fail(FsError::CantReadInode),
            };

            let mut reserved_blocks = 0;
            for file_block_i in 0..self.max_file_blocks() {
                if self.file_block_address(&inode, file_block_i)? == NULL_ADDRESS {
                    break;
                }
                reserved_blocks += 1;
            }

            stats.push(FileStat {
                name: inode.name().to_owned(),
                inode_i: inode.index,
                size: inode.size,
                created_time: inode.created_time,
                reserved_blocks,
            });
        }

        Ok(stats)
    }

    /// State of every open descriptor.
    pub fn open_files(&self) -> Vec<OpenFileStat> {
        self.open_files
            .iter()
            .map(|(&fd, file)| OpenFileStat {
                fd,
                inode_i: file.inode_i,
                pos: file.pos,
            })
            .collect()
    }

    /// The mounted superblock.
    #[inline]
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    fn lowest_free_fd(&self) -> Fd {
        let mut fd = 0;
        while self.open_files.contains_key(&fd) {
            fd += 1;
        }
        fd
    }
}
