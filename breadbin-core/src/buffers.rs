use crate::BLOCK_SIZE;

pub(crate) type BlockBuffer = Box<[u8; BLOCK_SIZE]>;

pub(crate) fn zeroed_block() -> BlockBuffer {
    bytemuck::zeroed_box()
}
