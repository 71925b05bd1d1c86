//! Common utilities for tests
#![allow(unused)]

use breadbin_core::BLOCK_SIZE;
use breadbin_traits::{BlockDevice, BlockIndex, Error};

/// RAM-backed block device.
pub struct MemDisk {
    data: Vec<u8>,
    blocks: u32,
    mounted: bool,
}

impl MemDisk {
    pub fn new(blocks: u32) -> Self {
        MemDisk {
            data: vec![0u8; blocks as usize * BLOCK_SIZE],
            blocks,
            mounted: false,
        }
    }

    /// Flips one byte on disk, for corruption tests.
    pub fn corrupt(&mut self, offset: usize) {
        self.data[offset] ^= 0xff;
    }

    /// Simulates re-opening the device, which a file-backed device
    /// does by constructing a new handle.
    pub fn reopen(&mut self) {
        self.mounted = false;
    }
}

impl BlockDevice<BLOCK_SIZE> for MemDisk {
    fn size(&self) -> u32 {
        self.blocks
    }

    fn mounted(&self) -> bool {
        self.mounted
    }

    fn mount(&mut self) {
        self.mounted = true;
    }

    fn read(&mut self, block: BlockIndex, buffer: &mut [u8; BLOCK_SIZE]) -> Result<(), Error> {
        if block.0 >= self.blocks {
            return Err(Error::OutOfBounds);
        }
        let start = block.0 as usize * BLOCK_SIZE;
        buffer.copy_from_slice(&self.data[start..start + BLOCK_SIZE]);
        Ok(())
    }

    fn write(&mut self, block: BlockIndex, buffer: &[u8; BLOCK_SIZE]) -> Result<(), Error> {
        if block.0 >= self.blocks {
            return Err(Error::OutOfBounds);
        }
        let start = block.0 as usize * BLOCK_SIZE;
        self.data[start..start + BLOCK_SIZE].copy_from_slice(buffer);
        Ok(())
    }
}
