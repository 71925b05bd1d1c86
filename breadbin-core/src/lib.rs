//! Inode-based storage engine over a fixed-size block device.
//!
//! Files are anonymous, addressed by inumber. Each inode carries 5
//! direct block pointers and one indirect pointer block of 1024 more.
//! Free space is tracked in memory only: every mount rebuilds the
//! free-block map by walking the inode table.

use std::fmt::Write as _;

use snafu::Snafu;

use breadbin_traits::{BlockDevice, BlockIndex, Error as BlockError};

mod bitmap;
mod buffers;
mod inode;
mod layout;
mod superblock;

use crate::bitmap::BlockMap;
use crate::buffers::zeroed_block;
use crate::inode::{Inode, PointerTable};
use crate::layout::DiskLayout;
use crate::superblock::SuperBlock;

pub const BLOCK_SIZE: usize = 4096;

pub use crate::inode::{DIRECT_POINTERS, INODES_PER_BLOCK, POINTERS_PER_BLOCK};
pub use crate::layout::MAX_FILE_SIZE;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("Inode is not allocated"))]
    Invalid,
    #[snafu(display("Inumber past the end of the inode table"))]
    InodeBounds,
    #[snafu(display("Offset past the end of the file"))]
    OffsetBeyondEnd,
    #[snafu(display("No free slot in the inode table"))]
    OutOfInodes,
    #[snafu(display("Invalid superblock"))]
    SuperBlock,
    #[snafu(display("Device is already mounted"))]
    AlreadyMounted,
    #[snafu(display("File references a missing data block"))]
    MissingBlock,
    #[snafu(display("Block device error {e}"))]
    Block { e: BlockError },
}

impl From<BlockError> for Error {
    fn from(e: BlockError) -> Self {
        Error::Block { e }
    }
}

/// A mounted file system. Holds the device exclusively; dropping the
/// engine abandons the in-memory free map, which the next mount
/// rebuilds from disk.
pub struct FileSystem<'d, D> {
    device: &'d mut D,
    layout: DiskLayout,
    free_map: BlockMap,
}

impl<'d, D: BlockDevice<BLOCK_SIZE>> FileSystem<'d, D> {
    /// Writes an empty file system: superblock, a zeroed inode table
    /// sized at ~10% of the device, and zeroed data blocks.
    pub fn format(device: &mut D) -> Result<(), Error> {
        if device.mounted() {
            return Err(Error::AlreadyMounted);
        }
        let layout = DiskLayout::new(device.size());
        SuperBlock::new(&layout).write(device)?;

        let zero = zeroed_block();
        for block in 1..layout.blocks {
            device.write(BlockIndex(block), &zero)?;
        }
        Ok(())
    }

    /// Validates the superblock, claims the device, and rebuilds the
    /// free-block map from every valid inode's pointer graph.
    pub fn mount(device: &'d mut D) -> Result<Self, Error> {
        if device.mounted() {
            return Err(Error::AlreadyMounted);
        }
        let sb = SuperBlock::read(device)?;
        sb.validate()?;
        let layout = DiskLayout::from_superblock(&sb);
        device.mount();

        let mut free_map = BlockMap::new(layout.blocks);
        free_map.set_used(0);
        for block in layout.inode_region() {
            free_map.set_used(block);
        }
        for block in layout.inode_region() {
            let table = inode::read_inode_block(device, BlockIndex(block))?;
            for entry in table.0.iter().filter(|e| e.is_valid()) {
                for &ptr in &entry.direct {
                    if ptr != 0 {
                        free_map.set_used(ptr);
                    }
                }
                if entry.indirect != 0 {
                    free_map.set_used(entry.indirect);
                    let pointers =
                        inode::read_pointer_block(device, BlockIndex(entry.indirect))?;
                    for &ptr in &pointers.0 {
                        if ptr != 0 {
                            free_map.set_used(ptr);
                        }
                    }
                }
            }
        }

        Ok(FileSystem {
            device,
            layout,
            free_map,
        })
    }

    /// Claims the first free inode table slot, in inumber order. No
    /// data blocks are allocated.
    pub fn create(&mut self) -> Result<u32, Error> {
        for (ordinal, block) in self.layout.inode_region().enumerate() {
            let mut table = inode::read_inode_block(self.device, BlockIndex(block))?;
            if let Some(slot) = table.0.iter().position(|e| !e.is_valid()) {
                table.0[slot] = Inode::fresh();
                inode::write_inode_block(self.device, BlockIndex(block), &table)?;
                return Ok((ordinal * INODES_PER_BLOCK + slot) as u32);
            }
        }
        Err(Error::OutOfInodes)
    }

    /// Releases every block the inode references, then zeroes and
    /// persists the inode itself.
    pub fn remove(&mut self, inumber: u32) -> Result<(), Error> {
        let entry = self.load_inode(inumber)?;
        if !entry.is_valid() {
            return Err(Error::Invalid);
        }
        for &ptr in &entry.direct {
            if ptr != 0 {
                self.free_map.release(ptr);
            }
        }
        if entry.indirect != 0 {
            self.free_map.release(entry.indirect);
            let pointers = inode::read_pointer_block(self.device, BlockIndex(entry.indirect))?;
            for &ptr in &pointers.0 {
                if ptr != 0 {
                    self.free_map.release(ptr);
                }
            }
        }
        self.save_inode(inumber, Inode::default())
    }

    pub fn stat(&mut self, inumber: u32) -> Result<u32, Error> {
        let entry = self.load_inode(inumber)?;
        if !entry.is_valid() {
            return Err(Error::Invalid);
        }
        Ok(entry.size)
    }

    /// Copies up to `data.len()` bytes starting at `offset` into
    /// `data`, clamped to the end of the file. Returns the byte count.
    pub fn read(&mut self, inumber: u32, data: &mut [u8], offset: u32) -> Result<usize, Error> {
        let entry = self.load_inode(inumber)?;
        if !entry.is_valid() {
            return Err(Error::Invalid);
        }
        if offset > entry.size {
            return Err(Error::OffsetBeyondEnd);
        }
        let length = data.len().min((entry.size - offset) as usize);

        let mut pointers = PointerTable::empty();
        let mut block = zeroed_block();
        let mut copied = 0;
        let mut logical = offset as usize / BLOCK_SIZE;
        let mut pos = offset as usize % BLOCK_SIZE;

        while copied < length {
            let physical = if logical < DIRECT_POINTERS {
                entry.direct[logical]
            } else {
                pointers.load(self.device, entry.indirect)?;
                pointers.get(logical - DIRECT_POINTERS)
            };
            if physical == 0 {
                return Err(Error::MissingBlock);
            }

            self.device.read(BlockIndex(physical), &mut block)?;
            let n = (BLOCK_SIZE - pos).min(length - copied);
            data[copied..copied + n].copy_from_slice(&block[pos..pos + n]);

            copied += n;
            pos = 0;
            logical += 1;
        }
        Ok(copied)
    }

    /// Writes `data` at `offset`, allocating direct blocks, the
    /// pointer block, and indirect data blocks as the walk reaches
    /// them. Running out of free blocks ends the write early; the
    /// bytes already placed stay placed and the count is returned.
    pub fn write(&mut self, inumber: u32, data: &[u8], offset: u32) -> Result<usize, Error> {
        let mut entry = self.load_inode(inumber)?;
        if offset > entry.size {
            return Err(Error::OffsetBeyondEnd);
        }
        let length = data.len().min((MAX_FILE_SIZE - offset) as usize);

        let mut pointers = PointerTable::empty();
        let mut entry_dirty = false;
        let mut block = zeroed_block();
        let mut written = 0;
        let mut logical = offset as usize / BLOCK_SIZE;
        let mut pos = offset as usize % BLOCK_SIZE;

        while written < length && logical < DIRECT_POINTERS + POINTERS_PER_BLOCK {
            let physical = if logical < DIRECT_POINTERS {
                if entry.direct[logical] == 0 {
                    let Some(fresh) = self.allocate_free_block()? else {
                        break;
                    };
                    entry.direct[logical] = fresh;
                    entry_dirty = true;
                }
                entry.direct[logical]
            } else {
                if entry.indirect == 0 {
                    let Some(fresh) = self.allocate_free_block()? else {
                        break;
                    };
                    entry.indirect = fresh;
                    entry_dirty = true;
                    pointers = PointerTable::fresh();
                }
                pointers.load(self.device, entry.indirect)?;
                let slot = logical - DIRECT_POINTERS;
                if pointers.get(slot) == 0 {
                    let Some(fresh) = self.allocate_free_block()? else {
                        break;
                    };
                    pointers.set(slot, fresh);
                }
                pointers.get(slot)
            };

            let n = (BLOCK_SIZE - pos).min(length - written);
            let chunk = &data[written..written + n];
            if let Ok(whole) = <&[u8; BLOCK_SIZE]>::try_from(chunk) {
                self.device.write(BlockIndex(physical), whole)?;
            } else {
                self.device.read(BlockIndex(physical), &mut block)?;
                block[pos..pos + n].copy_from_slice(chunk);
                self.device.write(BlockIndex(physical), &block)?;
            }

            written += n;
            pos = 0;
            logical += 1;
        }

        if offset + written as u32 > entry.size {
            entry.size = offset + written as u32;
            entry_dirty = true;
        }
        if entry_dirty {
            self.save_inode(inumber, entry)?;
        }
        pointers.flush(self.device, entry.indirect)?;
        Ok(written)
    }

    /// Textual dump of the superblock and every allocated inode. Works
    /// on unmounted devices, like `format`.
    pub fn debug_dump(device: &mut D) -> Result<String, Error> {
        let sb = SuperBlock::read(device)?;
        let mut out = String::new();
        let _ = writeln!(out, "SuperBlock:");
        if sb.magic_ok() {
            let _ = writeln!(out, "    magic number is valid");
        } else {
            let _ = writeln!(out, "    magic number is invalid");
        }
        let _ = writeln!(out, "    {} blocks", sb.blocks);
        let _ = writeln!(out, "    {} inode blocks", sb.inode_blocks);
        let _ = writeln!(out, "    {} inodes", sb.inodes);

        for table_block in 0..sb.inode_blocks {
            let table = inode::read_inode_block(device, BlockIndex(table_block + 1))?;
            for (slot, entry) in table.0.iter().enumerate() {
                if !entry.is_valid() {
                    continue;
                }
                let inumber = table_block * INODES_PER_BLOCK as u32 + slot as u32;
                let _ = writeln!(out, "Inode {inumber}:");
                let _ = writeln!(out, "    size: {} bytes", entry.size);
                let _ = write!(out, "    direct blocks:");
                for &ptr in entry.direct.iter().filter(|&&p| p != 0) {
                    let _ = write!(out, " {ptr}");
                }
                let _ = writeln!(out);
                if entry.indirect != 0 {
                    let _ = writeln!(out, "    indirect block: {}", entry.indirect);
                    let pointers =
                        inode::read_pointer_block(device, BlockIndex(entry.indirect))?;
                    let _ = write!(out, "    indirect data blocks:");
                    for &ptr in pointers.0.iter().filter(|&&p| p != 0) {
                        let _ = write!(out, " {ptr}");
                    }
                    let _ = writeln!(out);
                }
            }
        }
        Ok(out)
    }

    pub fn blocks(&self) -> u32 {
        self.layout.blocks
    }

    pub fn inode_blocks(&self) -> u32 {
        self.layout.inode_blocks
    }

    pub fn inodes(&self) -> u32 {
        self.layout.inodes
    }

    /// Free entries in the in-memory block map.
    pub fn free_blocks(&self) -> u32 {
        self.free_map.free_count()
    }

    fn load_inode(&mut self, inumber: u32) -> Result<Inode, Error> {
        if inumber >= self.layout.inodes {
            return Err(Error::InodeBounds);
        }
        let (block, slot) = inode::location(inumber);
        let table = inode::read_inode_block(self.device, block)?;
        Ok(table.0[slot])
    }

    fn save_inode(&mut self, inumber: u32, entry: Inode) -> Result<(), Error> {
        if inumber >= self.layout.inodes {
            return Err(Error::InodeBounds);
        }
        let (block, slot) = inode::location(inumber);
        let mut table = inode::read_inode_block(self.device, block)?;
        table.0[slot] = entry;
        inode::write_inode_block(self.device, block, &table)
    }

    /// First free block by index order, zero-filled on disk before the
    /// index is handed back. `Ok(None)` means the device is full.
    fn allocate_free_block(&mut self) -> Result<Option<u32>, Error> {
        let Some(index) = self.free_map.allocate() else {
            return Ok(None);
        };
        self.device.write(BlockIndex(index), &zeroed_block())?;
        Ok(Some(index))
    }
}
