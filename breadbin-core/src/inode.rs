use std::mem::size_of;

use bytemuck::Zeroable;

use breadbin_traits::{BlockDevice, BlockIndex};

use crate::{Error, BLOCK_SIZE};

pub const DIRECT_POINTERS: usize = 5;
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / size_of::<u32>();
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / size_of::<Inode>();

/// One 32-byte inode table entry. A pointer value of 0 means "no
/// block"; block 0 holds the superblock, so no file data ever lives
/// there.
#[derive(bytemuck::Pod, bytemuck::Zeroable, Clone, Copy, Debug, Default)]
#[repr(C)]
pub(crate) struct Inode {
    pub valid: u32,
    pub size: u32,
    pub direct: [u32; DIRECT_POINTERS],
    pub indirect: u32,
}

impl Inode {
    pub(crate) fn fresh() -> Self {
        Inode {
            valid: 1,
            ..Inode::zeroed()
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid != 0
    }
}

#[derive(bytemuck::Pod, bytemuck::Zeroable, Clone, Copy)]
#[repr(transparent)]
pub(crate) struct RawInodeBlock(pub(crate) [Inode; INODES_PER_BLOCK]);

#[derive(bytemuck::Pod, bytemuck::Zeroable, Clone, Copy)]
#[repr(transparent)]
pub(crate) struct PointerBlock(pub(crate) [u32; POINTERS_PER_BLOCK]);

/// The inode table starts at block 1, 128 entries per block.
pub(crate) fn location(inumber: u32) -> (BlockIndex, usize) {
    let block = BlockIndex(inumber / INODES_PER_BLOCK as u32 + 1);
    let slot = (inumber % INODES_PER_BLOCK as u32) as usize;
    (block, slot)
}

pub(crate) fn read_inode_block<D: BlockDevice<BLOCK_SIZE>>(
    device: &mut D,
    block: BlockIndex,
) -> Result<RawInodeBlock, Error> {
    let mut table = RawInodeBlock::zeroed();
    device.read(block, bytemuck::must_cast_mut(&mut table))?;
    Ok(table)
}

pub(crate) fn write_inode_block<D: BlockDevice<BLOCK_SIZE>>(
    device: &mut D,
    block: BlockIndex,
    table: &RawInodeBlock,
) -> Result<(), Error> {
    device.write(block, bytemuck::must_cast_ref(table))?;
    Ok(())
}

pub(crate) fn read_pointer_block<D: BlockDevice<BLOCK_SIZE>>(
    device: &mut D,
    block: BlockIndex,
) -> Result<PointerBlock, Error> {
    let mut pointers = PointerBlock::zeroed();
    device.read(block, bytemuck::must_cast_mut(&mut pointers))?;
    Ok(pointers)
}

/// In-memory copy of an inode's pointer block, materialized on first
/// use. The allocator zero-fills new blocks, so a freshly allocated
/// pointer block is seeded as all zeroes without a read-back.
pub(crate) struct PointerTable {
    block: Option<PointerBlock>,
    dirty: bool,
}

impl PointerTable {
    pub(crate) fn empty() -> Self {
        Self {
            block: None,
            dirty: false,
        }
    }

    pub(crate) fn fresh() -> Self {
        Self {
            block: Some(PointerBlock::zeroed()),
            dirty: true,
        }
    }

    /// Reads the pointer block behind `indirect` unless a copy is
    /// already held.
    pub(crate) fn load<D: BlockDevice<BLOCK_SIZE>>(
        &mut self,
        device: &mut D,
        indirect: u32,
    ) -> Result<(), Error> {
        if self.block.is_some() {
            return Ok(());
        }
        if indirect == 0 {
            return Err(Error::MissingBlock);
        }
        self.block = Some(read_pointer_block(device, BlockIndex(indirect))?);
        Ok(())
    }

    pub(crate) fn get(&self, slot: usize) -> u32 {
        self.block.as_ref().map_or(0, |t| t.0[slot])
    }

    pub(crate) fn set(&mut self, slot: usize, block: u32) {
        if let Some(table) = self.block.as_mut() {
            table.0[slot] = block;
            self.dirty = true;
        }
    }

    pub(crate) fn flush<D: BlockDevice<BLOCK_SIZE>>(
        &mut self,
        device: &mut D,
        indirect: u32,
    ) -> Result<(), Error> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(table) = self.block.as_ref() {
            device.write(BlockIndex(indirect), bytemuck::must_cast_ref(table))?;
        }
        self.dirty = false;
        Ok(())
    }
}
