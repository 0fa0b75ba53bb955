use core::mem;

use crate::layout::INode;

/// Filesystem metadata at block 0: the layout constants stamped at
/// format time plus the two live free counters.
///
/// Serialized form is 24 bytes: the ten `u16` fields in declaration
/// order at offsets 0..20, then `address_block_capacity` as `u32` at
/// 20..24, all little-endian and tightly packed.
#[derive(Debug, Clone)]
pub struct Superblock {
    /// Size of one block in bytes.
    pub block_size: u16,
    /// Number of inode slots; fixed at `8 * block_size`.
    pub n_inodes: u16,
    /// Blocks reserved for the inode table.
    pub n_inode_blocks: u16,
    /// Number of file data blocks; fixed at `8 * block_size`.
    pub n_data_blocks: u16,
    /// Block index of the inode bitmap.
    pub inode_bitmap_i: u16,
    /// Block index of the data-block bitmap.
    pub data_block_bitmap_i: u16,
    /// Block index at which the inode table starts.
    pub inodes_start_i: u16,
    /// Block index at which file data blocks start.
    pub data_blocks_start_i: u16,
    pub n_free_inodes: u16,
    pub n_free_data_blocks: u16,
    /// How many 32-bit addresses fit into one address block.
    pub address_block_capacity: u32,
}

impl Superblock {
    pub const SIZE: usize = 24;

    /// Computes the layout of a fresh filesystem with the given block
    /// size.
    pub fn new(block_size: u16) -> Self {
        let bs = block_size as usize;
        let n_inodes = 8 * bs;
        let n_inode_blocks = (n_inodes * INode::SIZE).div_ceil(bs);
        let n_data_blocks = 8 * bs;

        let inodes_start_i = 3;
        Self {
            block_size,
            n_inodes: n_inodes as u16,
            n_inode_blocks: n_inode_blocks as u16,
            n_data_blocks: n_data_blocks as u16,
            inode_bitmap_i: 1,
            data_block_bitmap_i: 2,
            inodes_start_i,
            data_blocks_start_i: inodes_start_i + n_inode_blocks as u16,
            n_free_inodes: n_inodes as u16,
            n_free_data_blocks: n_data_blocks as u16,
            address_block_capacity: (bs / mem::size_of::<i32>()) as u32,
        }
    }

    /// The superblock, both bitmap blocks, the inode table and the data
    /// area together.
    #[inline]
    pub fn total_blocks(&self) -> usize {
        3 + self.n_inode_blocks as usize + self.n_data_blocks as usize
    }

    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Self {
        let u16_at = |at: usize| u16::from_le_bytes(buf[at..at + 2].try_into().unwrap());

        Self {
            block_size: u16_at(0),
            n_inodes: u16_at(2),
            n_inode_blocks: u16_at(4),
            n_data_blocks: u16_at(6),
            inode_bitmap_i: u16_at(8),
            data_block_bitmap_i: u16_at(10),
            inodes_start_i: u16_at(12),
            data_blocks_start_i: u16_at(14),
            n_free_inodes: u16_at(16),
            n_free_data_blocks: u16_at(18),
            address_block_capacity: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        }
    }

    pub fn write_bytes(&self, buf: &mut [u8; Self::SIZE]) {
        for (at, field) in [
            self.block_size,
            self.n_inodes,
            self.n_inode_blocks,
            self.n_data_blocks,
            self.inode_bitmap_i,
            self.data_block_bitmap_i,
            self.inodes_start_i,
            self.data_blocks_start_i,
            self.n_free_inodes,
            self.n_free_data_blocks,
        ]
        .into_iter()
        .enumerate()
        {
            buf[at * 2..at * 2 + 2].copy_from_slice(&field.to_le_bytes());
        }
        buf[20..24].copy_from_slice(&self.address_block_capacity.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_layout_for_1024_byte_blocks() {
        let sb = Superblock::new(1024);
        assert_eq!(sb.n_inodes, 8192);
        assert_eq!(sb.n_data_blocks, 8192);
        assert_eq!(sb.n_inode_blocks, 936);
        assert_eq!(sb.inodes_start_i, 3);
        assert_eq!(sb.data_blocks_start_i, 939);
        assert_eq!(sb.n_free_inodes, 8192);
        assert_eq!(sb.address_block_capacity, 256);
        assert_eq!(sb.total_blocks(), 3 + 936 + 8192);
    }

    #[test]
    fn serialized_form_is_packed_little_endian() {
        let mut sb = Superblock::new(1024);
        sb.n_free_inodes = 0x1234;

        let mut buf = [0u8; Superblock::SIZE];
        sb.write_bytes(&mut buf);
        assert_eq!(&buf[0..2], &[0x00, 0x04]);
        assert_eq!(&buf[16..18], &[0x34, 0x12]);
        assert_eq!(&buf[20..24], &[0x00, 0x01, 0x00, 0x00]);

        let back = Superblock::from_bytes(&buf);
        assert_eq!(back.n_free_inodes, 0x1234);
        assert_eq!(back.data_blocks_start_i, sb.data_blocks_start_i);
        assert_eq!(back.address_block_capacity, 256);
    }
}
