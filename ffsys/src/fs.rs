//! # Disk manager layer
//!
//! Builds the backing file's layout and keeps it consistent: every
//! mutation is written back before the call that made it returns.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::block_dev::BlockDevice;
use crate::error::{ErrorCode, FsError};
use crate::layout::{Bitmap, INode, Superblock};
use crate::vfs::{Fd, OpenFile};
use crate::{NULL_ADDRESS, N_BLOCK_SLOTS, N_DIRECT_SLOTS, N_INDIRECT_SLOTS};

/// A flat filesystem living inside one backing file.
///
/// The value exclusively owns the device handle, both in-memory bitmaps
/// and the open-handle table, and is owned by exactly one thread of
/// execution at a time; nothing here locks.
#[derive(Debug)]
pub struct FileFileSystem {
    device: Arc<dyn BlockDevice>,
    pub(crate) sb: Superblock,
    pub(crate) inode_bitmap: Bitmap,
    pub(crate) data_block_bitmap: Bitmap,
    pub(crate) open_files: BTreeMap<Fd, OpenFile>,
    pub(crate) errnum: ErrorCode,
    /// All-(-1) template for initializing fresh address blocks.
    empty_address_block: Vec<u8>,
}

impl FileFileSystem {
    /// Creates a fresh filesystem on `device`: zeroes every block,
    /// stamps the superblock and writes both all-free bitmaps.
    pub fn format(device: Arc<dyn BlockDevice>, block_size: usize) -> Result<Self, FsError> {
        if block_size < Superblock::SIZE {
            return Err(FsError::BlockSizeTooSmall(block_size));
        }

        let sb = Superblock::new(block_size as u16);
        let fs = Self {
            device,
            inode_bitmap: Bitmap::new(block_size),
            data_block_bitmap: Bitmap::new(block_size),
            open_files: BTreeMap::new(),
            errnum: ErrorCode::NoError,
            empty_address_block: empty_address_block(sb.address_block_capacity as usize),
            sb,
        };

        let zeroes = vec![0; block_size];
        for block_i in 0..fs.sb.total_blocks() {
            fs.write_block(block_i, 0, &zeroes)?;
        }

        fs.write_superblock()?;
        fs.write_block(fs.sb.inode_bitmap_i as usize, 0, fs.inode_bitmap.as_bytes())?;
        fs.write_block(
            fs.sb.data_block_bitmap_i as usize,
            0,
            fs.data_block_bitmap.as_bytes(),
        )?;

        debug!(
            "formatted {} blocks of {} bytes",
            fs.sb.total_blocks(),
            block_size
        );
        Ok(fs)
    }

    /// Opens an existing filesystem: reads back the superblock and both
    /// bitmaps. The stamped layout is trusted as written.
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Self, FsError> {
        let mut sb_buf = [0; Superblock::SIZE];
        device.read_at(0, &mut sb_buf)?;
        let sb = Superblock::from_bytes(&sb_buf);

        let block_size = sb.block_size as usize;
        if block_size < Superblock::SIZE {
            return Err(FsError::BlockSizeTooSmall(block_size));
        }

        let mut bitmap_buf = vec![0; block_size];
        device.read_at(sb.inode_bitmap_i as u64 * block_size as u64, &mut bitmap_buf)?;
        let inode_bitmap = Bitmap::from_bytes(&bitmap_buf);
        device.read_at(
            sb.data_block_bitmap_i as u64 * block_size as u64,
            &mut bitmap_buf,
        )?;
        let data_block_bitmap = Bitmap::from_bytes(&bitmap_buf);

        debug!(
            "mounted: block_size={} free_inodes={} free_data_blocks={}",
            sb.block_size, sb.n_free_inodes, sb.n_free_data_blocks
        );
        Ok(Self {
            device,
            inode_bitmap,
            data_block_bitmap,
            open_files: BTreeMap::new(),
            errnum: ErrorCode::NoError,
            empty_address_block: empty_address_block(sb.address_block_capacity as usize),
            sb,
        })
    }
}

/* block and record I/O */

impl FileFileSystem {
    #[inline]
    pub(crate) fn block_size(&self) -> usize {
        self.sb.block_size as usize
    }

    /// Logical file blocks an inode's table can address in total.
    #[inline]
    pub(crate) fn max_file_blocks(&self) -> usize {
        N_DIRECT_SLOTS + N_INDIRECT_SLOTS * self.sb.address_block_capacity as usize
    }

    fn read_block(&self, block_i: usize, offset: usize, buf: &mut [u8]) -> Result<(), FsError> {
        let at = (block_i * self.block_size() + offset) as u64;
        Ok(self.device.read_at(at, buf)?)
    }

    fn write_block(&self, block_i: usize, offset: usize, buf: &[u8]) -> Result<(), FsError> {
        let at = (block_i * self.block_size() + offset) as u64;
        Ok(self.device.write_at(at, buf)?)
    }

    /// Reads the inode in slot `inode_i`, fresh from the backing file.
    pub(crate) fn read_inode(&self, inode_i: u32) -> Result<INode, FsError> {
        let at = self.sb.inodes_start_i as u64 * self.block_size() as u64
            + inode_i as u64 * INode::SIZE as u64;
        let mut buf = [0; INode::SIZE];
        self.device
            .read_at(at, &mut buf)
            .map_err(|_| FsError::CantReadInode)?;
        Ok(INode::from_bytes(&buf))
    }

    pub(crate) fn write_inode(&self, inode: &INode) -> Result<(), FsError> {
        let at = self.sb.inodes_start_i as u64 * self.block_size() as u64
            + inode.index as u64 * INode::SIZE as u64;
        let mut buf = [0; INode::SIZE];
        inode.write_bytes(&mut buf);
        Ok(self.device.write_at(at, &buf)?)
    }

    fn write_superblock(&self) -> Result<(), FsError> {
        let mut buf = [0; Superblock::SIZE];
        self.sb.write_bytes(&mut buf);
        Ok(self.device.write_at(0, &buf)?)
    }

    /// Records the failure's code (when it carries one) and hands the
    /// error back for returning.
    pub(crate) fn fail<T>(&mut self, err: FsError) -> Result<T, FsError> {
        if let Some(code) = err.code() {
            self.errnum = code;
        }
        Err(err)
    }
}

/* allocator */

impl FileFileSystem {
    /// Reserves the lowest free inode slot; persists the changed bitmap
    /// byte and the updated superblock counter before returning.
    pub(crate) fn reserve_inode(&mut self) -> Result<u32, FsError> {
        let Some(reserved) = self.inode_bitmap.reserve_first_free() else {
            return self.fail(FsError::NoFreeInodes);
        };

        let byte = self.inode_bitmap.byte_for(reserved);
        self.write_block(self.sb.inode_bitmap_i as usize, reserved / 8, &[byte])?;
        self.sb.n_free_inodes -= 1;
        self.write_superblock()?;

        Ok(reserved as u32)
    }

    /// Reserves the lowest free data block and returns its address
    /// (relative to the data area).
    pub(crate) fn reserve_data_block(&mut self) -> Result<i32, FsError> {
        let Some(reserved) = self.data_block_bitmap.reserve_first_free() else {
            debug!("data blocks exhausted");
            return self.fail(FsError::NoFreeDataBlocks);
        };

        let byte = self.data_block_bitmap.byte_for(reserved);
        self.write_block(self.sb.data_block_bitmap_i as usize, reserved / 8, &[byte])?;
        self.sb.n_free_data_blocks -= 1;
        self.write_superblock()?;

        Ok(reserved as i32)
    }

    pub(crate) fn free_data_block(&mut self, address: usize) -> Result<(), FsError> {
        if !self.data_block_bitmap.free(address) {
            return Ok(());
        }

        let byte = self.data_block_bitmap.byte_for(address);
        self.write_block(self.sb.data_block_bitmap_i as usize, address / 8, &[byte])?;
        self.sb.n_free_data_blocks += 1;
        self.write_superblock()
    }
}

/* indexing engine */

impl FileFileSystem {
    /// Resolves logical file block `file_block_i` of `inode` to a
    /// data-block address, [`NULL_ADDRESS`] when unmapped.
    pub(crate) fn file_block_address(
        &self,
        inode: &INode,
        file_block_i: usize,
    ) -> Result<i32, FsError> {
        if file_block_i < N_DIRECT_SLOTS {
            return Ok(inode.blocks[file_block_i]);
        }

        let capacity = self.sb.address_block_capacity as usize;
        let slot = (file_block_i - N_DIRECT_SLOTS) / capacity + N_DIRECT_SLOTS;
        if slot >= N_BLOCK_SLOTS || inode.blocks[slot] == NULL_ADDRESS {
            return Ok(NULL_ADDRESS);
        }

        let entry_i = (file_block_i - N_DIRECT_SLOTS) % capacity;
        let mut entry = [0; 4];
        self.read_block(
            self.data_block_i(inode.blocks[slot]),
            entry_i * 4,
            &mut entry,
        )?;
        Ok(i32::from_le_bytes(entry))
    }

    /// Stores `address` as the target of logical file block
    /// `file_block_i`, allocating the covering address block first when
    /// the slot is still unreserved.
    fn set_file_block_address(
        &mut self,
        inode: &mut INode,
        file_block_i: usize,
        address: i32,
    ) -> Result<(), FsError> {
        if file_block_i < N_DIRECT_SLOTS {
            inode.blocks[file_block_i] = address;
            return self.write_inode(inode);
        }

        let capacity = self.sb.address_block_capacity as usize;
        let slot = (file_block_i - N_DIRECT_SLOTS) / capacity + N_DIRECT_SLOTS;
        if slot >= N_BLOCK_SLOTS {
            return Err(FsError::FileFull);
        }

        if inode.blocks[slot] == NULL_ADDRESS {
            inode.blocks[slot] = self.initialize_address_block()?;
            self.write_inode(inode)?;
        }

        let entry_i = (file_block_i - N_DIRECT_SLOTS) % capacity;
        self.write_block(
            self.data_block_i(inode.blocks[slot]),
            entry_i * 4,
            &address.to_le_bytes(),
        )
    }

    /// Reserves a data block to serve as an address block and fills its
    /// body with null addresses.
    fn initialize_address_block(&mut self) -> Result<i32, FsError> {
        let reserved = self.reserve_data_block()?;
        self.write_block(self.data_block_i(reserved), 0, &self.empty_address_block)?;
        Ok(reserved)
    }

    /// Reserves a fresh data block for logical file block
    /// `file_block_i` and records its address in the inode's table.
    fn reserve_file_block(&mut self, inode: &mut INode, file_block_i: usize) -> Result<i32, FsError> {
        let reserved = self.reserve_data_block()?;
        if let Err(err) = self.set_file_block_address(inode, file_block_i, reserved) {
            // The block is unreachable if the table update failed.
            self.free_data_block(reserved as usize)?;
            return Err(err);
        }
        Ok(reserved)
    }

    fn free_file_block(&mut self, inode: &mut INode, file_block_i: usize) -> Result<(), FsError> {
        let address = self.file_block_address(inode, file_block_i)?;
        if address == NULL_ADDRESS {
            return Ok(());
        }

        self.free_data_block(address as usize)?;
        self.set_file_block_address(inode, file_block_i, NULL_ADDRESS)
    }

    /// Releases every file block past the last one `inode.size` still
    /// needs, plus any address block whose covered range lies wholly
    /// past it. A file keeps at least one block even at size 0.
    pub(crate) fn free_unused_file_blocks(&mut self, inode: &mut INode) -> Result<(), FsError> {
        let capacity = self.sb.address_block_capacity as usize;
        let last_block = (inode.size as usize).div_ceil(self.block_size()).max(1);

        for file_block_i in last_block..self.max_file_blocks() {
            if self.file_block_address(inode, file_block_i)? == NULL_ADDRESS {
                break;
            }
            self.free_file_block(inode, file_block_i)?;
        }

        for slot in 0..N_INDIRECT_SLOTS {
            let address = inode.blocks[N_DIRECT_SLOTS + slot];
            if address != NULL_ADDRESS && last_block < N_DIRECT_SLOTS + slot * capacity {
                self.free_data_block(address as usize)?;
                inode.blocks[N_DIRECT_SLOTS + slot] = NULL_ADDRESS;
            }
        }

        self.write_block(
            self.sb.data_block_bitmap_i as usize,
            0,
            self.data_block_bitmap.as_bytes(),
        )?;
        self.write_superblock()?;
        self.write_inode(inode)
    }

    /// Absolute block index of the data block at `address`.
    #[inline]
    fn data_block_i(&self, address: i32) -> usize {
        self.sb.data_blocks_start_i as usize + address as usize
    }
}

/* file I/O path */

impl FileFileSystem {
    /// Reads up to `buf.len()` bytes starting at byte `pos`, clamped to
    /// the file's size; stops early at an unmapped block.
    pub(crate) fn read_file_bytes(
        &self,
        inode: &INode,
        buf: &mut [u8],
        pos: u64,
    ) -> Result<usize, FsError> {
        let mut count = buf.len();
        if pos + count as u64 >= inode.size {
            count = inode.size.saturating_sub(pos) as usize;
        }

        let block_size = self.block_size();
        let mut file_block_i = (pos / block_size as u64) as usize;
        let mut read_count = 0;

        // Partial leading block when the position sits mid-block.
        let leftover = (pos % block_size as u64) as usize;
        if leftover != 0 {
            let address = self.file_block_address(inode, file_block_i)?;
            if address == NULL_ADDRESS {
                return Ok(0);
            }

            let to_read = (block_size - leftover).min(count);
            self.read_block(self.data_block_i(address), leftover, &mut buf[..to_read])?;
            read_count += to_read;
            file_block_i += 1;
        }

        while read_count < count {
            let address = self.file_block_address(inode, file_block_i)?;
            if address == NULL_ADDRESS {
                break;
            }

            let to_read = block_size.min(count - read_count);
            self.read_block(
                self.data_block_i(address),
                0,
                &mut buf[read_count..read_count + to_read],
            )?;
            read_count += to_read;
            file_block_i += 1;
        }

        Ok(read_count)
    }

    /// Writes `buf` starting at byte `pos`, reserving blocks as the file
    /// grows. Stops short when no block can be reserved; the returned
    /// count is what actually reached the backing file, and `size` is
    /// extended to cover exactly that.
    pub(crate) fn write_file_bytes(
        &mut self,
        inode: &mut INode,
        buf: &[u8],
        mut pos: u64,
    ) -> Result<usize, FsError> {
        let block_size = self.block_size();
        let mut file_block_i = (pos / block_size as u64) as usize;
        let mut written = 0;

        while written < buf.len() {
            let mut address = self.file_block_address(inode, file_block_i)?;
            if address == NULL_ADDRESS {
                address = match self.reserve_file_block(inode, file_block_i) {
                    Ok(address) => address,
                    Err(FsError::NoFreeDataBlocks | FsError::FileFull) => break,
                    Err(err) => return Err(err),
                };
            }

            let offset = (pos % block_size as u64) as usize;
            let to_write = (block_size - offset).min(buf.len() - written);
            self.write_block(
                self.data_block_i(address),
                offset,
                &buf[written..written + to_write],
            )?;

            written += to_write;
            pos += to_write as u64;
            file_block_i += 1;
        }

        inode.size = inode.size.max(pos);
        self.write_inode(inode)?;

        Ok(written)
    }
}

/* name table */

impl FileFileSystem {
    /// Scans the inode table for a live inode named `name`. The scan
    /// stops once every live inode has been inspected.
    pub(crate) fn find_file(&mut self, name: &str) -> Result<Option<INode>, FsError> {
        let live = (self.sb.n_inodes - self.sb.n_free_inodes) as usize;
        let mut inspected = 0;

        for inode_i in 0..self.sb.n_inodes as u32 {
            if inspected >= live {
                break;
            }
            if self.inode_bitmap.is_free(inode_i as usize) {
                continue;
            }

            let inode = match self.read_inode(inode_i) {
                Ok(inode) => inode,
                Err(_) => return self.fail(FsError::CantReadInode),
            };
            if inode.name() == name {
                return Ok(Some(inode));
            }
            inspected += 1;
        }

        Ok(None)
    }

    /// Reserves an inode and stamps a fresh file into it. The first
    /// data block is reserved best-effort: when none is free the file
    /// is still created, with an empty table.
    pub(crate) fn create_file(&mut self, name: &str) -> Result<INode, FsError> {
        let inode_i = self.reserve_inode()?;

        let created_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        let mut inode = INode::new(inode_i, name, created_time);

        if let Ok(address) = self.reserve_data_block() {
            inode.blocks[0] = address;
        }

        self.write_inode(&inode)?;
        Ok(inode)
    }
}

/// One address block's body: `capacity` null addresses.
fn empty_address_block(capacity: usize) -> Vec<u8> {
    std::iter::repeat(NULL_ADDRESS.to_le_bytes())
        .take(capacity)
        .flatten()
        .collect()
}
