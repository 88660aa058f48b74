use crate::io::{BlockNumber, BlockStorage};
use crate::BLOCK_SIZE;

/// The engine's handle on the underlying device.
///
/// Every transfer moves exactly one block. Callers are expected to stay in
/// range; an out-of-range block number is a programming error and a failed
/// transfer means the medium is dying, neither of which the engine can
/// recover from, so both panic. Transfers are counted so callers can observe
/// how much device traffic an operation actually produced.
pub(crate) struct Disk<T: BlockStorage> {
    dev: T,
    blocks: u32,
    reads: u64,
    writes: u64,
}

impl<T: BlockStorage> Disk<T> {
    pub fn new(dev: T) -> Self {
        let blocks = dev.block_count();
        Disk {
            dev,
            blocks,
            reads: 0,
            writes: 0,
        }
    }

    pub fn block_count(&self) -> u32 {
        self.blocks
    }

    pub fn read(&mut self, blocknr: BlockNumber, buf: &mut [u8]) {
        assert_eq!(buf.len(), BLOCK_SIZE, "device transfers are whole blocks");
        assert!(
            blocknr < self.blocks,
            "block {} out of range (device holds {})",
            blocknr,
            self.blocks
        );
        self.reads += 1;
        if let Err(e) = self.dev.read_block(blocknr, buf) {
            panic!("device fault reading block {}: {}", blocknr, e);
        }
    }

    pub fn write(&mut self, blocknr: BlockNumber, buf: &[u8]) {
        assert_eq!(buf.len(), BLOCK_SIZE, "device transfers are whole blocks");
        assert!(
            blocknr < self.blocks,
            "block {} out of range (device holds {})",
            blocknr,
            self.blocks
        );
        self.writes += 1;
        if let Err(e) = self.dev.write_block(blocknr, buf) {
            panic!("device fault writing block {}: {}", blocknr, e);
        }
    }

    pub fn sync(&mut self) {
        if let Err(e) = self.dev.sync_disk() {
            panic!("device fault syncing: {}", e);
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn into_inner(self) -> T {
        self.dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::FileBlockEmulatorBuilder;

    fn test_disk(blocks: u32) -> Disk<crate::io::FileBlockEmulator> {
        let dev = tempfile::tempfile().unwrap();
        let dev = FileBlockEmulatorBuilder::from(dev)
            .with_block_count(blocks)
            .build()
            .expect("could not initialize disk emulator");
        Disk::new(dev)
    }

    #[test]
    fn counts_reads_and_writes() {
        let mut disk = test_disk(4);
        let mut buf = [0u8; BLOCK_SIZE];
        disk.read(0, &mut buf);
        disk.read(1, &mut buf);
        disk.write(2, &buf);
        assert_eq!(disk.reads(), 2);
        assert_eq!(disk.writes(), 1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_block_panics() {
        let mut disk = test_disk(2);
        let mut buf = [0u8; BLOCK_SIZE];
        disk.read(2, &mut buf);
    }

    #[test]
    #[should_panic(expected = "whole blocks")]
    fn partial_buffer_panics() {
        let mut disk = test_disk(2);
        let mut buf = [0u8; BLOCK_SIZE / 2];
        disk.read(0, &mut buf);
    }
}
