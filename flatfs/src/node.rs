use byteorder::BigEndian;
use zerocopy::byteorder::U32;
use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::BLOCK_SIZE;

/// On-disk size of one inode record.
pub(crate) const INODE_SIZE: usize = 64;
/// Inodes packed into one device block.
pub(crate) const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
/// Block pointers carried by one inode.
pub(crate) const INODE_PTRS: usize = 13;
/// Pointers packed into one indirect block.
pub(crate) const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 4;

/// Pointer slots addressing data blocks directly.
pub(crate) const DIRECT_PTRS: usize = 10;
/// Pointer slot holding the single indirect block.
pub(crate) const SINGLE_PTR: usize = 10;
/// Pointer slot holding the double indirect block.
pub(crate) const DOUBLE_PTR: usize = 11;
/// Pointer slot holding the triple indirect block.
pub(crate) const TRIPLE_PTR: usize = 12;

/// One 64 byte inode record as it sits on disk, all fields big endian.
///
/// `flags` is nonzero while the inode is allocated. The first ten pointer
/// slots address data blocks directly; the last three hold the single,
/// double, and triple indirect block pointers. A zero pointer anywhere
/// means the range behind it is a hole.
#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Copy, Clone)]
pub(crate) struct Inode {
    flags: U32<BigEndian>,
    owner: U32<BigEndian>,
    size: U32<BigEndian>,
    ptrs: [U32<BigEndian>; INODE_PTRS],
}

impl Inode {
    pub fn empty() -> Self {
        Inode {
            flags: U32::new(0),
            owner: U32::new(0),
            size: U32::new(0),
            ptrs: [U32::new(0); INODE_PTRS],
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.flags.get() != 0
    }

    /// Marks the inode in use and resets its file state.
    pub fn allocate(&mut self) {
        self.flags.set(1);
        self.owner.set(0);
        self.size.set(0);
        self.ptrs = [U32::new(0); INODE_PTRS];
    }

    pub fn release(&mut self) {
        self.flags.set(0);
    }

    pub fn size(&self) -> u32 {
        self.size.get()
    }

    pub fn set_size(&mut self, size: u32) {
        self.size.set(size);
    }

    pub fn ptr(&self, slot: usize) -> u32 {
        self.ptrs[slot].get()
    }

    pub fn set_ptr(&mut self, slot: usize, blocknr: u32) {
        self.ptrs[slot].set(blocknr);
    }
}

/// A device block's worth of inodes.
#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Copy, Clone)]
pub(crate) struct InodeBlock {
    nodes: [Inode; INODES_PER_BLOCK],
}

impl InodeBlock {
    pub fn empty() -> Self {
        InodeBlock {
            nodes: [Inode::empty(); INODES_PER_BLOCK],
        }
    }

    /// Reads a block of inodes from a buffer of exactly BLOCK_SIZE bytes.
    pub fn parse(buf: &[u8]) -> Self {
        assert_eq!(
            buf.len(),
            BLOCK_SIZE,
            "length of buffer to parse must equal block size"
        );
        let mut block = Self::empty();
        block.as_bytes_mut().copy_from_slice(buf);
        block
    }

    pub fn node(&self, slot: usize) -> &Inode {
        &self.nodes[slot]
    }

    pub fn node_mut(&mut self, slot: usize) -> &mut Inode {
        &mut self.nodes[slot]
    }
}

/// A device block reinterpreted as big endian block pointers.
#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Copy, Clone)]
pub(crate) struct IndirectBlock {
    ptrs: [U32<BigEndian>; PTRS_PER_BLOCK],
}

impl IndirectBlock {
    pub fn zeroed() -> Self {
        IndirectBlock {
            ptrs: [U32::new(0); PTRS_PER_BLOCK],
        }
    }

    /// Reads an indirect block from a buffer of exactly BLOCK_SIZE bytes.
    pub fn parse(buf: &[u8]) -> Self {
        assert_eq!(
            buf.len(),
            BLOCK_SIZE,
            "length of buffer to parse must equal block size"
        );
        let mut block = Self::zeroed();
        block.as_bytes_mut().copy_from_slice(buf);
        block
    }

    pub fn entry(&self, slot: usize) -> u32 {
        self.ptrs[slot].get()
    }

    pub fn set_entry(&mut self, slot: usize, blocknr: u32) {
        self.ptrs[slot].set(blocknr);
    }
}
