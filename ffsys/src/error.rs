use std::io;

use thiserror::Error;

/// Process-local error codes, readable through
/// [`FileFileSystem::last_error`](crate::FileFileSystem::last_error).
///
/// `FileAlreadyExists` and `FileAlreadyOpen` are reserved: no operation
/// currently produces them (`Create` means create-if-absent, never
/// exclusive-create, and a file may be opened through several handles
/// at once).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorCode {
    #[default]
    NoError,
    PathNotFound,
    NoSuchFileDescriptor,
    CantReadInode,
    NoFreeInodes,
    NoFreeDataBlocks,
    FileAlreadyExists,
    NoSuchFile,
    FileAlreadyOpen,
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file")]
    NoSuchFile,

    #[error("no such file descriptor")]
    NoSuchFileDescriptor,

    #[error("cannot read inode from the backing file")]
    CantReadInode,

    #[error("no free inodes")]
    NoFreeInodes,

    #[error("no free data blocks")]
    NoFreeDataBlocks,

    /// The addressing table covers no more file blocks.
    #[error("file block table is full")]
    FileFull,

    #[error("seek past end of file")]
    SeekPastEnd,

    #[error("block size {0} is smaller than the superblock")]
    BlockSizeTooSmall(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FsError {
    /// The code this failure records, if it records one. `FileFull` and
    /// `SeekPastEnd` leave the recorded code untouched;
    /// `BlockSizeTooSmall` can only come out of a constructor, before
    /// any code slot exists.
    pub(crate) fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::NoSuchFile => Some(ErrorCode::NoSuchFile),
            Self::NoSuchFileDescriptor => Some(ErrorCode::NoSuchFileDescriptor),
            Self::CantReadInode => Some(ErrorCode::CantReadInode),
            Self::NoFreeInodes => Some(ErrorCode::NoFreeInodes),
            Self::NoFreeDataBlocks => Some(ErrorCode::NoFreeDataBlocks),
            Self::Io(_) => Some(ErrorCode::PathNotFound),
            Self::FileFull | Self::SeekPastEnd | Self::BlockSizeTooSmall(_) => None,
        }
    }
}
