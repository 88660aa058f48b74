use std::convert::TryInto;

use crate::io::BlockNumber;
use crate::node::INODES_PER_BLOCK;
use crate::BLOCK_SIZE;

/// Bytes of the free map packed into the superblock after its three header
/// fields.
pub(crate) const INLINE_MAP_BYTES: usize = BLOCK_SIZE - 12;

/// Block 0 of every volume: the three layout fields followed by the inline
/// slice of the free-space bitmap.
///
/// The regions of a volume follow from the header alone. Map overflow
/// blocks, if any, start right after the superblock, the inode region after
/// those, and everything left over is the data region. An unformatted
/// volume parses as all zeros and reports an empty data region.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SuperBlock {
    /// Total blocks in the volume, metadata included.
    pub blocks: u32,
    /// Blocks holding inodes.
    pub inode_blocks: u32,
    /// Blocks holding the part of the free map that spills past the inline
    /// slice.
    pub map_blocks: u32,
    /// The head of the free-space bitmap.
    pub inline_map: [u8; INLINE_MAP_BYTES],
}

impl SuperBlock {
    pub fn new(blocks: u32, inode_blocks: u32, map_blocks: u32) -> Self {
        SuperBlock {
            blocks,
            inode_blocks,
            map_blocks,
            inline_map: [0; INLINE_MAP_BYTES],
        }
    }

    /// Reads the superblock from a buffer of exactly BLOCK_SIZE bytes.
    /// Passing a slice of any other size will result in a panic.
    pub fn parse(buf: &[u8]) -> Self {
        assert_eq!(
            buf.len(),
            BLOCK_SIZE,
            "length of buffer to parse must equal block size"
        );
        let blocks = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let inode_blocks = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        let map_blocks = u32::from_be_bytes(buf[8..12].try_into().unwrap());
        let mut inline_map = [0u8; INLINE_MAP_BYTES];
        inline_map.copy_from_slice(&buf[12..BLOCK_SIZE]);
        SuperBlock {
            blocks,
            inode_blocks,
            map_blocks,
            inline_map,
        }
    }

    /// Serializes the superblock into a BLOCK_SIZE buffer for writing to
    /// disk. The encoding is the header fields in big endian followed by
    /// the inline map slice.
    pub fn serialize(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(BLOCK_SIZE);
        encoded.extend_from_slice(&self.blocks.to_be_bytes());
        encoded.extend_from_slice(&self.inode_blocks.to_be_bytes());
        encoded.extend_from_slice(&self.map_blocks.to_be_bytes());
        encoded.extend_from_slice(&self.inline_map);
        encoded
    }

    /// Block holding overflow map chunk `idx`; the overflow region starts
    /// right after the superblock.
    pub fn map_block(&self, idx: u32) -> BlockNumber {
        debug_assert!(idx < self.map_blocks);
        1 + idx
    }

    /// First block of the inode region.
    pub fn first_inode_block(&self) -> BlockNumber {
        1 + self.map_blocks
    }

    /// First block of the data region.
    pub fn first_data_block(&self) -> BlockNumber {
        self.first_inode_block() + self.inode_blocks
    }

    /// Blocks left for file contents once the metadata regions are taken
    /// out.
    pub fn data_blocks(&self) -> u32 {
        self.blocks
            .saturating_sub(1 + self.map_blocks + self.inode_blocks)
    }

    /// Total inodes the volume can hold. Valid inumbers run from 1 to this
    /// count inclusive.
    pub fn inode_count(&self) -> u32 {
        self.inode_blocks * INODES_PER_BLOCK as u32
    }
}
