use crate::io::{BlockNumber, BlockStorage, Disk};
use crate::{BlockBuf, BLOCK_SIZE};

/// Staging area for one data block of an open file.
///
/// Block resolution hands one of these back for every logical block a read
/// or write touches: either a mapped device block, or a hole standing in
/// for an unmaterialized stretch of a sparse file. The device block is read
/// only when a copy actually needs its current contents, and written back
/// only when a copy changed them.
pub(crate) struct DirectBlock {
    /// The mapped device block, or `None` for a hole.
    blocknr: Option<BlockNumber>,
    /// Intra-block byte offset the next copy starts at.
    off: usize,
    /// The buffer holds the block's current contents. Starts true for holes
    /// and freshly allocated blocks, whose contents are all zeros.
    in_core: bool,
    dirty: bool,
    buf: BlockBuf,
}

impl DirectBlock {
    /// A hole: reads see zeros, writes are a caller bug.
    pub fn hole(off: usize) -> Self {
        debug_assert!(off < BLOCK_SIZE);
        DirectBlock {
            blocknr: None,
            off,
            in_core: true,
            dirty: false,
            buf: [0; BLOCK_SIZE],
        }
    }

    /// A block mapped at `blocknr`. `fresh` marks a block allocated by this
    /// very operation: whatever the device holds there is garbage, its
    /// logical contents are zeros until copied into.
    pub fn mapped(blocknr: BlockNumber, off: usize, fresh: bool) -> Self {
        debug_assert!(off < BLOCK_SIZE);
        DirectBlock {
            blocknr: Some(blocknr),
            off,
            in_core: fresh,
            dirty: false,
            buf: [0; BLOCK_SIZE],
        }
    }

    /// Copies the block's bytes from the staged offset into `dest`,
    /// returning how many were taken: the shorter of `dest` and what is
    /// left of the block.
    pub fn copy_to<T: BlockStorage>(&mut self, disk: &mut Disk<T>, dest: &mut [u8]) -> usize {
        let n = dest.len().min(BLOCK_SIZE - self.off);
        if !self.in_core {
            if let Some(blocknr) = self.blocknr {
                disk.read(blocknr, &mut self.buf);
            }
            self.in_core = true;
        }
        dest[..n].copy_from_slice(&self.buf[self.off..self.off + n]);
        n
    }

    /// Copies `src` into the block at the staged offset, returning how many
    /// bytes fit. The device block is read first unless its bytes are all
    /// about to be replaced.
    ///
    /// # Panics
    ///
    /// Holes take no data; resolution must map a real block before a write.
    pub fn copy_from<T: BlockStorage>(&mut self, disk: &mut Disk<T>, src: &[u8]) -> usize {
        let blocknr = match self.blocknr {
            Some(blocknr) => blocknr,
            None => panic!("cannot write into a hole block"),
        };
        let n = src.len().min(BLOCK_SIZE - self.off);
        let replaces_all = self.off == 0 && n == BLOCK_SIZE;
        if !self.in_core && !replaces_all {
            disk.read(blocknr, &mut self.buf);
        }
        self.in_core = true;
        self.buf[self.off..self.off + n].copy_from_slice(&src[..n]);
        self.dirty = true;
        n
    }

    /// Writes the staged bytes back if any copy changed them. Clean blocks
    /// never touch the device.
    pub fn save<T: BlockStorage>(&mut self, disk: &mut Disk<T>) {
        if !self.dirty {
            return;
        }
        // copy_from rejects holes, so a dirty block always has a number.
        if let Some(blocknr) = self.blocknr {
            disk.write(blocknr, &self.buf);
        }
        self.dirty = false;
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
    fn offset_writes_preserve_the_rest_of_the_block() {
        let mut disk = test_disk(2);

        let mut db = DirectBlock::mapped(1, 0, true);
        db.copy_from(&mut disk, b"abc");
        db.save(&mut disk);

        let mut db = DirectBlock::mapped(1, 6, false);
        db.copy_from(&mut disk, b"def");
        db.save(&mut disk);

        let mut buf = [0u8; BLOCK_SIZE];
        disk.read(1, &mut buf);
        assert_eq!(&buf[0..9], b"abc\0\0\0def");
    }

    #[test]
    fn full_overwrite_skips_the_read() {
        let mut disk = test_disk(2);
        let mut db = DirectBlock::mapped(1, 0, false);

        let n = db.copy_from(&mut disk, &[0x55; BLOCK_SIZE]);
        assert_eq!(n, BLOCK_SIZE);
        assert_eq!(disk.reads(), 0);
    }

    #[test]
    fn partial_overwrite_reads_the_block_first() {
        let mut disk = test_disk(2);
        let mut db = DirectBlock::mapped(1, 0, false);

        db.copy_from(&mut disk, b"abc");
        assert_eq!(disk.reads(), 1);
    }

    #[test]
    fn fresh_blocks_zero_fill_around_the_copy() {
        let mut disk = test_disk(2);
        // Poison the device block to prove nothing reads it back.
        disk.write(1, &[0xAA; BLOCK_SIZE]);

        let mut db = DirectBlock::mapped(1, 3, true);
        db.copy_from(&mut disk, b"xyz");
        db.save(&mut disk);

        let mut buf = [0u8; BLOCK_SIZE];
        disk.read(1, &mut buf);
        assert_eq!(&buf[0..3], &[0, 0, 0]);
        assert_eq!(&buf[3..6], b"xyz");
        assert_eq!(&buf[6..10], &[0, 0, 0, 0]);
    }

    #[test]
    fn holes_read_as_zeros_without_device_traffic() {
        let mut disk = test_disk(2);
        let mut db = DirectBlock::hole(3);

        let mut dest = [0xFFu8; 16];
        let n = db.copy_to(&mut disk, &mut dest);
        assert_eq!(n, 16);
        assert_eq!(dest, [0u8; 16]);
        db.save(&mut disk);
        assert_eq!(disk.reads(), 0);
        assert_eq!(disk.writes(), 0);
    }

    #[test]
    #[should_panic(expected = "hole")]
    fn writing_into_a_hole_panics() {
        let mut disk = test_disk(2);
        DirectBlock::hole(0).copy_from(&mut disk, b"abc");
    }

    #[test]
    fn copies_clamp_at_the_end_of_the_block() {
        let mut disk = test_disk(2);

        let mut db = DirectBlock::mapped(1, BLOCK_SIZE - 12, true);
        assert_eq!(db.copy_from(&mut disk, &[0x11; 100]), 12);
        db.save(&mut disk);

        let mut db = DirectBlock::mapped(1, BLOCK_SIZE - 12, false);
        let mut dest = [0u8; 100];
        assert_eq!(db.copy_to(&mut disk, &mut dest), 12);
        assert_eq!(&dest[..12], &[0x11; 12]);
    }

    #[test]
    fn clean_blocks_are_never_written_back() {
        let mut disk = test_disk(2);
        let mut db = DirectBlock::mapped(1, 0, false);

        let mut dest = [0u8; 8];
        db.copy_to(&mut disk, &mut dest);
        db.save(&mut disk);
        assert_eq!(disk.writes(), 0);
    }
}
