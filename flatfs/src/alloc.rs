use crate::io::{BlockNumber, BlockStorage, Disk};
use crate::sb::{SuperBlock, INLINE_MAP_BYTES};
use crate::{BlockBuf, BLOCK_SIZE};

/// Bits held by the superblock's inline map slice.
pub(crate) const INLINE_MAP_BITS: u32 = (INLINE_MAP_BYTES * 8) as u32;
/// Bits held by each overflow map block.
pub(crate) const MAP_BLOCK_BITS: u32 = (BLOCK_SIZE * 8) as u32;

// The on-disk map counts bits from the least significant bit of the LAST
// byte of a slice, growing toward the first byte.

fn bit_isset(bits: &[u8], i: u32) -> bool {
    let byte = bits.len() - 1 - (i / 8) as usize;
    bits[byte] & (1 << (i % 8)) != 0
}

fn bit_set(bits: &mut [u8], i: u32) {
    let byte = bits.len() - 1 - (i / 8) as usize;
    bits[byte] |= 1 << (i % 8);
}

fn bit_clear(bits: &mut [u8], i: u32) {
    let byte = bits.len() - 1 - (i / 8) as usize;
    bits[byte] &= !(1 << (i % 8));
}

/// The free-space bitmap, one bit per data block with bit 0 addressing the
/// first block of the data region. The head of the map lives inline in the
/// superblock; volumes tracking more data blocks than the inline slice can
/// hold spill the rest into overflow blocks right after block 0.
///
/// Mutations only touch the in-memory cache and remember which device
/// blocks they dirtied; `save` writes the dirty ones back and nothing else.
pub(crate) struct FreeMap {
    sb: SuperBlock,
    overflow: Vec<BlockBuf>,
    /// Dirty flags, slot 0 for the superblock and slot k + 1 for overflow
    /// block k.
    dirty: Vec<bool>,
}

impl FreeMap {
    /// Builds the map of a freshly formatted volume, every bit clear.
    pub fn new(sb: SuperBlock) -> Self {
        let overflow = vec![[0u8; BLOCK_SIZE]; sb.map_blocks as usize];
        let dirty = vec![false; sb.map_blocks as usize + 1];
        FreeMap { sb, overflow, dirty }
    }

    /// Loads the map of a mounted volume, inline slice plus overflow
    /// blocks.
    pub fn load<T: BlockStorage>(sb: SuperBlock, disk: &mut Disk<T>) -> Self {
        let mut overflow = vec![[0u8; BLOCK_SIZE]; sb.map_blocks as usize];
        for (k, block) in overflow.iter_mut().enumerate() {
            disk.read(sb.map_block(k as u32), block);
        }
        let dirty = vec![false; sb.map_blocks as usize + 1];
        FreeMap { sb, overflow, dirty }
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.sb
    }

    /// Claims the first free data block, scanning in ascending block order.
    /// Returns `None` once every data block is taken.
    pub fn find(&mut self) -> Option<BlockNumber> {
        let first = self.sb.first_data_block();
        for blocknr in first..self.sb.blocks {
            if !self.isset(blocknr - first) {
                self.set(blocknr - first);
                return Some(blocknr);
            }
        }
        warn!(
            "free map exhausted, all {} data blocks in use",
            self.sb.data_blocks()
        );
        None
    }

    /// Returns a data block to the free pool. Block numbers outside the
    /// data region are ignored.
    pub fn clear(&mut self, blocknr: BlockNumber) {
        let first = self.sb.first_data_block();
        if blocknr < first || blocknr >= self.sb.blocks {
            return;
        }
        let bit = blocknr - first;
        if bit < INLINE_MAP_BITS {
            bit_clear(&mut self.sb.inline_map, bit);
            self.dirty[0] = true;
        } else {
            let rest = bit - INLINE_MAP_BITS;
            let k = (rest / MAP_BLOCK_BITS) as usize;
            bit_clear(&mut self.overflow[k], rest % MAP_BLOCK_BITS);
            self.dirty[k + 1] = true;
        }
    }

    /// Writes the blocks dirtied since the last save, superblock included.
    pub fn save<T: BlockStorage>(&mut self, disk: &mut Disk<T>) {
        if self.dirty[0] {
            disk.write(0, &self.sb.serialize());
            self.dirty[0] = false;
        }
        for k in 0..self.overflow.len() {
            if self.dirty[k + 1] {
                disk.write(self.sb.map_block(k as u32), &self.overflow[k]);
                self.dirty[k + 1] = false;
            }
        }
    }

    fn isset(&self, bit: u32) -> bool {
        if bit < INLINE_MAP_BITS {
            bit_isset(&self.sb.inline_map, bit)
        } else {
            let rest = bit - INLINE_MAP_BITS;
            let k = (rest / MAP_BLOCK_BITS) as usize;
            bit_isset(&self.overflow[k], rest % MAP_BLOCK_BITS)
        }
    }

    fn set(&mut self, bit: u32) {
        if bit < INLINE_MAP_BITS {
            bit_set(&mut self.sb.inline_map, bit);
            self.dirty[0] = true;
        } else {
            let rest = bit - INLINE_MAP_BITS;
            let k = (rest / MAP_BLOCK_BITS) as usize;
            bit_set(&mut self.overflow[k], rest % MAP_BLOCK_BITS);
            self.dirty[k + 1] = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{FileBlockEmulator, FileBlockEmulatorBuilder};

    fn test_disk(blocks: u32) -> Disk<FileBlockEmulator> {
        let dev = tempfile::tempfile().unwrap();
        let dev = FileBlockEmulatorBuilder::from(dev)
            .with_block_count(blocks)
            .build()
            .expect("could not initialize disk emulator");
        Disk::new(dev)
    }

    #[test]
    fn bit_zero_lands_in_the_last_byte() {
        let mut bits = [0u8; 4];
        bit_set(&mut bits, 0);
        assert_eq!(bits, [0, 0, 0, 1]);
        bit_set(&mut bits, 9);
        assert_eq!(bits, [0, 0, 2, 1]);

        assert!(bit_isset(&bits, 0));
        assert!(bit_isset(&bits, 9));
        assert!(!bit_isset(&bits, 1));

        bit_clear(&mut bits, 0);
        assert_eq!(bits, [0, 0, 2, 0]);
    }

    #[test]
    fn find_hands_out_data_blocks_in_order() {
        let mut map = FreeMap::new(SuperBlock::new(100, 5, 0));
        assert_eq!(map.find(), Some(6));
        assert_eq!(map.find(), Some(7));
        assert_eq!(map.find(), Some(8));
    }

    #[test]
    fn cleared_blocks_are_found_again_first() {
        let mut map = FreeMap::new(SuperBlock::new(100, 5, 0));
        map.find();
        map.find();
        map.find();

        map.clear(6);
        assert_eq!(map.find(), Some(6));
        assert_eq!(map.find(), Some(9));
    }

    #[test]
    fn exhausted_map_returns_none() {
        // 8 blocks total: superblock, one inode block, six data blocks.
        let mut map = FreeMap::new(SuperBlock::new(8, 1, 0));
        for expected in 2..8 {
            assert_eq!(map.find(), Some(expected));
        }
        assert_eq!(map.find(), None);
    }

    #[test]
    fn clear_outside_the_data_region_is_ignored() {
        let mut map = FreeMap::new(SuperBlock::new(100, 5, 0));
        map.clear(0);
        map.clear(5);
        map.clear(100);
        assert_eq!(map.find(), Some(6));
    }

    #[test]
    fn allocations_cross_into_overflow_blocks() {
        // 4993 data blocks, more than the 4000 inline bits can track.
        let sb = SuperBlock::new(5000, 5, 1);
        let first = sb.first_data_block();
        let mut map = FreeMap::new(sb);

        for i in 0..=INLINE_MAP_BITS {
            assert_eq!(map.find(), Some(first + i));
        }
        let in_overflow = first + INLINE_MAP_BITS;
        map.clear(in_overflow);
        assert_eq!(map.find(), Some(in_overflow));
    }

    #[test]
    fn save_writes_only_dirty_blocks() {
        let mut disk = test_disk(5000);
        let mut map = FreeMap::new(SuperBlock::new(5000, 5, 1));

        map.save(&mut disk);
        assert_eq!(disk.writes(), 0);

        map.find();
        map.save(&mut disk);
        assert_eq!(disk.writes(), 1);

        // Saving again with nothing new stays quiet.
        map.save(&mut disk);
        assert_eq!(disk.writes(), 1);
    }

    #[test]
    fn overflow_allocations_dirty_the_overflow_block() {
        let mut disk = test_disk(5000);
        let sb = SuperBlock::new(5000, 5, 1);
        let mut map = FreeMap::new(sb);
        for _ in 0..INLINE_MAP_BITS {
            map.find();
        }
        map.save(&mut disk);
        let baseline = disk.writes();

        // The next allocation lives in the overflow block alone.
        map.find();
        map.save(&mut disk);
        assert_eq!(disk.writes(), baseline + 1);
    }

    #[test]
    fn loaded_map_resumes_where_the_saved_one_left_off() {
        let mut disk = test_disk(100);
        let mut map = FreeMap::new(SuperBlock::new(100, 5, 0));
        map.find();
        map.find();
        map.save(&mut disk);

        let mut buf = [0u8; BLOCK_SIZE];
        disk.read(0, &mut buf);
        let mut reloaded = FreeMap::load(SuperBlock::parse(&buf), &mut disk);
        assert_eq!(reloaded.find(), Some(8));
    }
}
