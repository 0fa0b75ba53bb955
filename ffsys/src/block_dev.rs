use core::fmt::Debug;
use std::io;

/// Positioned byte I/O against the backing store.
///
/// Offsets are absolute byte positions; the filesystem computes
/// `block_index * block_size + intra_block_offset` itself, so records
/// that straddle a block boundary need no special handling here.
pub trait BlockDevice: Send + Sync + Debug {
    /// Fills `buf` from `offset`. A short read is an error.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Writes all of `buf` at `offset`.
    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()>;
}
