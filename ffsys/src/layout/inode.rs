use core::str;

use crate::{NAME_MAX_LEN, NULL_ADDRESS, N_BLOCK_SLOTS};

/// Per-file metadata record: the slot index (stored redundantly), a
/// NUL-terminated name, the byte size, the 20-entry block address table
/// and the creation timestamp.
///
/// Serialized form is 117 bytes, little-endian, tightly packed:
/// `index` u32 at 0..4, `name` at 4..21, `size` u64 at 21..29,
/// `blocks` as 20 × i32 at 29..109, `created_time` u64 at 109..117.
#[derive(Debug, Clone)]
pub struct INode {
    /// The ordinal number of this inode.
    pub index: u32,
    name: [u8; NAME_MAX_LEN + 1],
    /// Logical byte length of the file.
    pub size: u64,
    /// Block address table. The first 15 entries address data blocks
    /// directly; the last 5 address *address blocks* whose bodies are
    /// arrays of further data-block addresses. [`NULL_ADDRESS`] marks
    /// an unreserved entry.
    pub blocks: [i32; N_BLOCK_SLOTS],
    /// Seconds since the epoch at creation.
    pub created_time: u64,
}

impl INode {
    pub const SIZE: usize = 117;

    /// A fresh zero-sized inode. Names longer than [`NAME_MAX_LEN`]
    /// bytes are silently truncated.
    pub fn new(index: u32, name: &str, created_time: u64) -> Self {
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_MAX_LEN);
        let mut name = [0; NAME_MAX_LEN + 1];
        name[..len].copy_from_slice(&bytes[..len]);

        Self {
            index,
            name,
            size: 0,
            blocks: [NULL_ADDRESS; N_BLOCK_SLOTS],
            created_time,
        }
    }

    /// The file name up to its NUL terminator.
    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(self.name.len());
        str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Self {
        let mut name = [0; NAME_MAX_LEN + 1];
        name.copy_from_slice(&buf[4..21]);

        let mut blocks = [NULL_ADDRESS; N_BLOCK_SLOTS];
        for (slot, bytes) in blocks.iter_mut().zip(buf[29..109].chunks_exact(4)) {
            *slot = i32::from_le_bytes(bytes.try_into().unwrap());
        }

        Self {
            index: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            name,
            size: u64::from_le_bytes(buf[21..29].try_into().unwrap()),
            blocks,
            created_time: u64::from_le_bytes(buf[109..117].try_into().unwrap()),
        }
    }

    pub fn write_bytes(&self, buf: &mut [u8; Self::SIZE]) {
        buf[0..4].copy_from_slice(&self.index.to_le_bytes());
        buf[4..21].copy_from_slice(&self.name);
        buf[21..29].copy_from_slice(&self.size.to_le_bytes());
        for (bytes, slot) in buf[29..109].chunks_exact_mut(4).zip(&self.blocks) {
            bytes.copy_from_slice(&slot.to_le_bytes());
        }
        buf[109..117].copy_from_slice(&self.created_time.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_truncated_with_a_terminator() {
        let inode = INode::new(7, "a-name-that-goes-past-sixteen", 0);
        assert_eq!(inode.name(), "a-name-that-goes");
        assert_eq!(inode.name().len(), NAME_MAX_LEN);
    }

    #[test]
    fn fresh_inode_has_no_reserved_blocks() {
        let inode = INode::new(0, "x", 0);
        assert_eq!(inode.size, 0);
        assert!(inode.blocks.iter().all(|&slot| slot == NULL_ADDRESS));
    }

    #[test]
    fn serialized_form_round_trips() {
        let mut inode = INode::new(3, "hello", 1_700_000_000);
        inode.size = 2000;
        inode.blocks[0] = 5;
        inode.blocks[15] = 42;

        let mut buf = [0u8; INode::SIZE];
        inode.write_bytes(&mut buf);
        // index LE, then the name's first byte right behind it
        assert_eq!(&buf[0..5], &[3, 0, 0, 0, b'h']);
        // blocks[1] is unreserved: four 0xFF bytes at offset 33
        assert_eq!(&buf[33..37], &[0xff; 4]);

        let back = INode::from_bytes(&buf);
        assert_eq!(back.index, 3);
        assert_eq!(back.name(), "hello");
        assert_eq!(back.size, 2000);
        assert_eq!(back.blocks[0], 5);
        assert_eq!(back.blocks[15], 42);
        assert_eq!(back.blocks[19], NULL_ADDRESS);
        assert_eq!(back.created_time, 1_700_000_000);
    }
}
