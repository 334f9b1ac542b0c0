use std::mem::size_of;

// block indices are stored as little-endian `u32`s inside indirect blocks
pub type BlockIndex = u32;

/// The number of bytes a block index occupies inside an indirect block.
pub const BLOCK_INDEX_SIZE: usize = 4;
const_assert!(size_of::<BlockIndex>() == BLOCK_INDEX_SIZE);

/// Marks an unused block slot. The first unused slot ends a block list.
pub const NO_BLOCK: BlockIndex = BlockIndex::MAX;

/// A read-only view of a block whose bytes are a list of block indices.
#[derive(Clone, Copy)]
pub struct IndirectBlock<'a>(&'a [u8]);

impl<'a> IndirectBlock<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        IndirectBlock(bytes)
    }

    /// Iterates the stored indices in slot order, stopping at the first unused slot.
    pub fn iter(&self) -> impl Iterator<Item = BlockIndex> + 'a {
        let bytes: &'a [u8] = self.0;

        bytes
            .chunks_exact(BLOCK_INDEX_SIZE)
            .map(|chunk| {
                let mut raw = [0; BLOCK_INDEX_SIZE];
                raw.copy_from_slice(chunk);
                BlockIndex::from_le_bytes(raw)
            })
            .take_while(|&index| index != NO_BLOCK)
    }
}

/// A mutable view of an indirect block.
pub struct IndirectBlockMut<'a>(&'a mut [u8]);

impl<'a> IndirectBlockMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        IndirectBlockMut(bytes)
    }

    /// Marks every slot unused.
    pub fn clear(&mut self) {
        self.0.fill(0xff);
        debug_assert!(NO_BLOCK.to_le_bytes() == [0xff; BLOCK_INDEX_SIZE]);
    }

    pub fn set(&mut self, slot: usize, index: BlockIndex) {
        let start = slot * BLOCK_INDEX_SIZE;
        self.0[start..start + BLOCK_INDEX_SIZE].copy_from_slice(&index.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleared_block_is_empty() {
        let mut bytes = [0; 64];
        IndirectBlockMut::new(&mut bytes).clear();

        let view = IndirectBlock::new(&bytes);
        assert_eq!(view.iter().count(), 0);
        assert!(bytes.iter().all(|&byte| byte == 0xff));
    }

    #[test]
    fn test_iteration_stops_at_first_unused_slot() {
        let mut bytes = [0; 64];
        let mut block = IndirectBlockMut::new(&mut bytes);
        block.clear();
        block.set(0, 7);
        block.set(1, 3);
        block.set(3, 9);

        let view = IndirectBlock::new(&bytes);
        assert_eq!(view.iter().collect::<Vec<_>>(), vec![7, 3]);
        assert_eq!(bytes[12..16], 9u32.to_le_bytes());
    }

    #[test]
    fn test_full_block_yields_capacity_entries() {
        let mut bytes = [0; 32];
        let mut block = IndirectBlockMut::new(&mut bytes);
        for slot in 0..8 {
            block.set(slot, slot as BlockIndex + 100);
        }

        let view = IndirectBlock::new(&bytes);
        assert_eq!(view.iter().count(), 8);
        assert_eq!(view.iter().last(), Some(107));
    }
}
