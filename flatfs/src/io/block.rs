use std::path::Path;

/// The block number to access, ranging from 0 (the first block) to n - 1
/// (the last block) where n is the number of blocks the device holds.
pub type BlockNumber = u32;

/// The seam between the storage engine and whatever actually holds the bytes.
///
/// Implementations move fixed-size blocks and report failures through
/// `std::io::Result`; the engine layers its own fatality policy on top of
/// that, so a faulty medium should surface errors rather than panic here.
pub trait BlockStorage {
    /// Opens a disk at the specified path. This method does not validate the
    /// storage blocks, it is up to clients to ensure disks are appropriately
    /// initialized.
    fn open_disk<P: AsRef<Path>>(path: P, nblocks: u32) -> std::io::Result<Self>
    where
        Self: std::marker::Sized;

    /// Reads disk block number into the provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range will return an error.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;

    /// Writes the provided buffer into the specified block number.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range will return an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;

    /// Flush any buffered disk IO from memory. This is useful if it must be
    /// guaranteed the disk writes actually occurred, for instance, if being
    /// re-read from disk.
    fn sync_disk(&mut self) -> std::io::Result<()>;

    /// The number of blocks the device holds.
    fn block_count(&self) -> u32;
}
