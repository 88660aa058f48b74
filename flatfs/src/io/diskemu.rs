use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};
use std::path::Path;

use crate::io::{BlockNumber, BlockStorage};
use crate::BLOCK_SIZE;

/// Emulates block disk/flash storage in userspace using a file as block
/// storage. This is only meant to be used for storage engine development
/// and testing.
pub struct FileBlockEmulator {
    /// The file must be a fixed-size file some exact multiple of the size of
    /// a block.
    fd: File,
    /// The total number of blocks available in the file store.
    block_count: u32,
}

impl FileBlockEmulator {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }
}

impl BlockStorage for FileBlockEmulator {
    fn open_disk<P: AsRef<Path>>(dest: P, nblocks: u32) -> std::io::Result<Self> {
        // Return an error if the file does not exist rather than create one.
        let file = OpenOptions::new().read(true).write(true).open(dest)?;
        Ok(FileBlockEmulator {
            fd: file,
            block_count: nblocks,
        })
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        if blocknr >= self.block_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            ));
        }
        if buf.len() < BLOCK_SIZE {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "buffer does not contain enough space to read block",
            ));
        }
        self.fd
            .seek(SeekFrom::Start(blocknr as u64 * BLOCK_SIZE as u64))?;
        self.fd.read_exact(&mut buf[..BLOCK_SIZE])?;
        Ok(())
    }

    /// This method truncates writes that exceed the total block size.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        if blocknr >= self.block_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            ));
        }
        self.fd
            .seek(SeekFrom::Start(blocknr as u64 * BLOCK_SIZE as u64))?;
        let max = if BLOCK_SIZE < buf.len() {
            BLOCK_SIZE
        } else {
            buf.len()
        };
        self.fd.write_all(&buf[0..max])?;
        Ok(())
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()
    }

    fn block_count(&self) -> u32 {
        self.block_count
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    block_count: u32,
    clear_medium: bool,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            // A better default here might be the size of the file rounded
            // down to the nearest block.
            block_count: 0,
            clear_medium: true,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the number of blocks in the block store device.
    pub fn with_block_count(mut self, blocks: u32) -> Self {
        self.block_count = blocks;
        self
    }

    /// Whether building zeroes the backing file first. Pass `false` to
    /// attach to a medium that already holds data, e.g. when remounting a
    /// formatted volume.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumes ownership of the file descriptor used and does
    /// destructive things to prepare the file for use. Additionally,
    /// ownership of the file is transferred to the emulator meaning this
    /// builder can only be used to create one emulator.
    pub fn build(mut self) -> std::io::Result<FileBlockEmulator> {
        debug_assert!(self.block_count > 0);
        if self.clear_medium {
            self.zero_medium()?;
        } else {
            // Grow the file so every block is addressable without touching
            // the bytes it already holds.
            let len = self.block_count as u64 * BLOCK_SIZE as u64;
            if self.fd.metadata()?.len() < len {
                self.fd.set_len(len)?;
            }
        }
        Ok(FileBlockEmulator {
            fd: self.fd,
            block_count: self.block_count,
        })
    }

    fn zero_medium(&mut self) -> std::io::Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        self.fd
            .set_len(self.block_count as u64 * BLOCK_SIZE as u64)?;
        let zeros = vec![0x00; BLOCK_SIZE];
        // Zero out the "disk" blocks, buffering to prevent excessive writes.
        let mut bfd = BufWriter::new(&self.fd);
        for _ in 0..self.block_count {
            bfd.write_all(zeros.as_slice())?;
        }
        bfd.flush()?;
        Ok(())
    }
}
