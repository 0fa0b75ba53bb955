//! FFSys (File FileSystem): a flat, EXT2-inspired file store materialized
//! inside one host file.
//!
//! The crate is layered top-down:

// Handle layer: open/read/write/seek/close over integer file descriptors
mod vfs;
pub use vfs::{Fd, FileStat, OpenFileStat, OpenFlag};

// Disk manager layer: format/mount, allocation, block indexing, file I/O
mod fs;
pub use fs::FileFileSystem;

// On-disk data structure layer: the records the backing file is made of
mod layout;
pub use layout::{Bitmap, INode, Superblock};

// Block device interface layer: positioned I/O against the backing file
mod block_dev;
pub use block_dev::BlockDevice;

mod error;
pub use error::{ErrorCode, FsError};

/// Direct address slots at the front of an inode's block table.
pub const N_DIRECT_SLOTS: usize = 15;
/// Single-indirect address slots at the back of an inode's block table.
pub const N_INDIRECT_SLOTS: usize = 5;
/// Total slots in an inode's block table.
pub const N_BLOCK_SLOTS: usize = N_DIRECT_SLOTS + N_INDIRECT_SLOTS;
/// Longest stored file name, not counting the NUL terminator.
pub const NAME_MAX_LEN: usize = 16;
/// Marks an unreserved entry in any block address table.
pub const NULL_ADDRESS: i32 = -1;
