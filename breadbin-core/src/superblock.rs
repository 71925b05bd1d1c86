use std::mem::size_of;

use breadbin_traits::{BlockDevice, BlockIndex};

use crate::inode::INODES_PER_BLOCK;
use crate::layout::DiskLayout;
use crate::{Error, BLOCK_SIZE};

pub(crate) const MAGIC: u32 = 0xf0f0_3410;

/// Block 0, native-endian. Everything after the four counters is zero
/// padding.
#[derive(bytemuck::Pod, bytemuck::Zeroable, Clone, Copy, Debug)]
#[repr(C)]
pub(crate) struct SuperBlock {
    pub magic: u32,
    pub blocks: u32,
    pub inode_blocks: u32,
    pub inodes: u32,
}

impl SuperBlock {
    pub(crate) fn new(layout: &DiskLayout) -> Self {
        SuperBlock {
            magic: MAGIC,
            blocks: layout.blocks,
            inode_blocks: layout.inode_blocks,
            inodes: layout.inodes,
        }
    }

    pub(crate) fn magic_ok(&self) -> bool {
        self.magic == MAGIC
    }

    /// Mount-time validation. The u64 widening keeps a garbage
    /// `inode_blocks` from overflowing the inode count check.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if !self.magic_ok()
            || u64::from(self.inodes) != u64::from(self.inode_blocks) * INODES_PER_BLOCK as u64
            || self.inode_blocks != self.blocks.div_ceil(10)
        {
            return Err(Error::SuperBlock);
        }
        Ok(())
    }

    /// Raw read of block 0. Callers decide how much to trust it.
    pub(crate) fn read<D: BlockDevice<BLOCK_SIZE>>(device: &mut D) -> Result<SuperBlock, Error> {
        let mut block = [0u8; BLOCK_SIZE];
        device.read(BlockIndex(0), &mut block)?;
        Ok(bytemuck::pod_read_unaligned(
            &block[..size_of::<SuperBlock>()],
        ))
    }

    pub(crate) fn write<D: BlockDevice<BLOCK_SIZE>>(&self, device: &mut D) -> Result<(), Error> {
        let mut block = [0u8; BLOCK_SIZE];
        block[..size_of::<SuperBlock>()].copy_from_slice(bytemuck::bytes_of(self));
        device.write(BlockIndex(0), &block)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_formatted_layout() {
        let sb = SuperBlock::new(&DiskLayout::new(20));
        assert!(sb.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let mut sb = SuperBlock::new(&DiskLayout::new(20));
        sb.magic ^= 1;
        assert_eq!(sb.validate(), Err(Error::SuperBlock));

        let mut sb = SuperBlock::new(&DiskLayout::new(20));
        sb.inodes -= 1;
        assert_eq!(sb.validate(), Err(Error::SuperBlock));

        let mut sb = SuperBlock::new(&DiskLayout::new(20));
        sb.inode_blocks += 1;
        assert_eq!(sb.validate(), Err(Error::SuperBlock));
    }
}
