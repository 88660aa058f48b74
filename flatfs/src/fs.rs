use std::io::SeekFrom;

use thiserror::Error;
use zerocopy::AsBytes;

use crate::alloc::{FreeMap, INLINE_MAP_BITS, MAP_BLOCK_BITS};
use crate::data::DirectBlock;
use crate::io::{BlockNumber, BlockStorage, Disk};
use crate::node::{
    Inode, IndirectBlock, InodeBlock, DIRECT_PTRS, DOUBLE_PTR, INODES_PER_BLOCK, PTRS_PER_BLOCK,
    SINGLE_PTR, TRIPLE_PTR,
};
use crate::sb::SuperBlock;
use crate::table::{Fd, FileTable, OpenFile, MAX_OPEN_FILES};
use crate::BLOCK_SIZE;

/// Logical blocks reachable through each indirection level.
const SINGLE_CAP: u32 = PTRS_PER_BLOCK as u32;
const DOUBLE_CAP: u32 = SINGLE_CAP * SINGLE_CAP;
const TRIPLE_CAP: u32 = DOUBLE_CAP * SINGLE_CAP;
/// One past the largest logical block any file can address.
const MAX_FILE_BLOCKS: u32 = DIRECT_PTRS as u32 + SINGLE_CAP + DOUBLE_CAP + TRIPLE_CAP;

/// Whether block resolution may materialize missing blocks.
#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Read,
    Write,
}

#[derive(Error, Debug)]
pub enum FsError {
    #[error("file system size of {requested} blocks exceeds device size of {device} blocks")]
    ExceedsDevice { requested: u32, device: u32 },
    #[error("metadata will not fit in a file system of {0} blocks")]
    MetadataOverflow(u32),
    #[error("file table is full")]
    TableFull,
    #[error("out of files")]
    OutOfInodes,
    #[error("file system is full")]
    NoSpace,
    #[error("file descriptor {0} is invalid")]
    BadDescriptor(Fd),
    #[error("inumber {0} is invalid")]
    BadInumber(u32),
    #[error("file {0} does not exist")]
    DoesNotExist(u32),
    #[error("cannot seek to a negative offset")]
    SeekBelowZero,
    #[error("seek target exceeds the maximum file offset")]
    SeekOverflow,
    #[error("cannot delete an open file (fd {0})")]
    FileOpen(Fd),
}

/// The storage engine proper: Unix-style file operations over a block
/// device, files addressed by inumber.
///
/// # Layout
/// ==========================================================
/// | SuperBlock | FreeMap overflow | Inodes | Data Region   |
/// ==========================================================
pub struct FlatFs<T: BlockStorage> {
    disk: Disk<T>,
    map: FreeMap,
    table: FileTable,
}

impl<T: BlockStorage> FlatFs<T> {
    /// Attaches to a device, reading whatever superblock it carries.
    ///
    /// Mounting does not validate formatting. A device never formatted
    /// parses as a volume of zero blocks and only becomes usable after
    /// [`format`](Self::format).
    pub fn mount(dev: T) -> Self {
        let mut disk = Disk::new(dev);
        let mut buf = [0u8; BLOCK_SIZE];
        disk.read(0, &mut buf);
        let sb = SuperBlock::parse(&buf);
        debug!(
            "mounted volume: {} blocks, {} inode blocks, {} map overflow blocks",
            sb.blocks, sb.inode_blocks, sb.map_blocks
        );
        let map = FreeMap::load(sb, &mut disk);
        FlatFs {
            disk,
            map,
            table: FileTable::new(),
        }
    }

    /// Writes a brand-new volume layout: a fresh superblock, a cleared free
    /// map, and zeroed inodes. Anything the volume held before is gone.
    ///
    /// `blocks` is the total size of the volume and must fit the device;
    /// `inode_blocks` fixes how many files it can ever hold.
    pub fn format(&mut self, blocks: u32, inode_blocks: u32) -> Result<(), FsError> {
        if blocks > self.disk.block_count() {
            return Err(FsError::ExceedsDevice {
                requested: blocks,
                device: self.disk.block_count(),
            });
        }
        let map_blocks = Self::map_overflow_blocks(blocks, inode_blocks)?;
        let sb = SuperBlock::new(blocks, inode_blocks, map_blocks);

        self.disk.write(0, &sb.serialize());
        let zeros = [0u8; BLOCK_SIZE];
        for blocknr in 1..sb.first_data_block() {
            self.disk.write(blocknr, &zeros);
        }
        self.disk.sync();
        info!(
            "formatted volume: {} blocks ({} inode, {} map overflow, {} data)",
            blocks,
            inode_blocks,
            map_blocks,
            sb.data_blocks()
        );

        self.map = FreeMap::new(sb);
        self.table = FileTable::new();
        Ok(())
    }

    /// Overflow blocks needed to track the data region the inline map slice
    /// cannot. The bit count is taken before the overflow blocks themselves
    /// are carved out, so the map never tracks fewer blocks than exist.
    fn map_overflow_blocks(blocks: u32, inode_blocks: u32) -> Result<u32, FsError> {
        let extra_bits = blocks as i64 - inode_blocks as i64 - 1 - INLINE_MAP_BITS as i64;
        let map_blocks = if extra_bits > 0 {
            ((extra_bits + MAP_BLOCK_BITS as i64 - 1) / MAP_BLOCK_BITS as i64) as u32
        } else {
            0
        };
        if (blocks as i64) - (map_blocks as i64) - (inode_blocks as i64) - 1 < 0 {
            return Err(FsError::MetadataOverflow(blocks));
        }
        Ok(map_blocks)
    }

    /// Creates a new empty file and opens it, returning the descriptor.
    pub fn create(&mut self) -> Result<Fd, FsError> {
        let fd = self.table.allocate().ok_or(FsError::TableFull)?;
        let sb = self.map.superblock().clone();
        let mut buf = [0u8; BLOCK_SIZE];
        for iblock in 0..sb.inode_blocks {
            let blocknr = sb.first_inode_block() + iblock;
            self.disk.read(blocknr, &mut buf);
            let mut nodes = InodeBlock::parse(&buf);
            for slot in 0..INODES_PER_BLOCK {
                if nodes.node(slot).is_allocated() {
                    continue;
                }
                nodes.node_mut(slot).allocate();
                let inode = *nodes.node(slot);
                self.disk.write(blocknr, nodes.as_bytes());
                let inumber = iblock * INODES_PER_BLOCK as u32 + slot as u32 + 1;
                self.table.add(inode, inumber, fd);
                debug!("created file {} (fd {})", inumber, fd);
                return Ok(fd);
            }
        }
        Err(FsError::OutOfInodes)
    }

    /// Opens an existing file by inumber, returning a descriptor with its
    /// seek pointer at zero.
    pub fn open(&mut self, inumber: u32) -> Result<Fd, FsError> {
        if inumber < 1 || inumber > self.map.superblock().inode_count() {
            return Err(FsError::BadInumber(inumber));
        }
        let fd = self.table.allocate().ok_or(FsError::TableFull)?;
        let (blocknr, slot) = self.inode_location(inumber);
        let mut buf = [0u8; BLOCK_SIZE];
        self.disk.read(blocknr, &mut buf);
        let inode = *InodeBlock::parse(&buf).node(slot);
        if !inode.is_allocated() {
            return Err(FsError::DoesNotExist(inumber));
        }
        self.table.add(inode, inumber, fd);
        Ok(fd)
    }

    /// The inumber behind an open descriptor.
    pub fn inumber(&self, fd: Fd) -> Result<u32, FsError> {
        self.table
            .get(fd)
            .map(|file| file.inumber)
            .ok_or(FsError::BadDescriptor(fd))
    }

    /// Reads from the seek pointer into `buf`, advancing the pointer by the
    /// bytes transferred. Returns how many landed, zero at end of file; the
    /// transfer never passes the recorded file size and bytes of `buf`
    /// beyond it stay untouched.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, FsError> {
        let file = self.table.get_mut(fd).ok_or(FsError::BadDescriptor(fd))?;
        let size = file.inode.size();
        let mut done = 0;
        while done < buf.len() && file.seek < size {
            // Clamp to the caller's buffer and to the end of the file.
            let want = (buf.len() - done).min((size - file.seek) as usize);
            let mut db = Self::data_block_at(&mut self.disk, &mut self.map, file, Mode::Read)?;
            let n = db.copy_to(&mut self.disk, &mut buf[done..done + want]);
            file.seek += n as u32;
            done += n;
        }
        Ok(done)
    }

    /// Writes all of `buf` at the seek pointer, advancing it and growing
    /// the file size past the last byte written. Writing ahead of the
    /// current size leaves holes that read back as zeros.
    ///
    /// Blocks and pointers persisted before a failed allocation stay
    /// persisted; the file keeps the bytes that made it to the device.
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, FsError> {
        let file = self.table.get_mut(fd).ok_or(FsError::BadDescriptor(fd))?;
        let mut done = 0;
        while done < buf.len() {
            let mut db = Self::data_block_at(&mut self.disk, &mut self.map, file, Mode::Write)?;
            let n = db.copy_from(&mut self.disk, &buf[done..]);
            db.save(&mut self.disk);
            file.seek += n as u32;
            if file.seek > file.inode.size() {
                file.inode.set_size(file.seek);
            }
            done += n;
        }
        Ok(done)
    }

    /// Moves the seek pointer. `Current` and `End` resolve against the
    /// pointer and the file size; the target must stay between zero and the
    /// largest offset the on-disk size field can record.
    pub fn seek(&mut self, fd: Fd, pos: SeekFrom) -> Result<u32, FsError> {
        let file = self.table.get_mut(fd).ok_or(FsError::BadDescriptor(fd))?;
        let target: i64 = match pos {
            SeekFrom::Start(off) => {
                if off > i32::MAX as u64 {
                    return Err(FsError::SeekOverflow);
                }
                off as i64
            }
            SeekFrom::Current(off) => file.seek as i64 + off,
            SeekFrom::End(off) => file.inode.size() as i64 + off,
        };
        if target < 0 {
            return Err(FsError::SeekBelowZero);
        }
        if target > i32::MAX as i64 {
            return Err(FsError::SeekOverflow);
        }
        file.seek = target as u32;
        Ok(file.seek)
    }

    /// Writes the staged inode back to its slot and releases the
    /// descriptor.
    pub fn close(&mut self, fd: Fd) -> Result<(), FsError> {
        let file = self.table.take(fd).ok_or(FsError::BadDescriptor(fd))?;
        self.save_inode(file.inumber, &file.inode);
        Ok(())
    }

    /// Deletes a file, returning every data and indirect block it held to
    /// the free pool. Open files cannot be deleted.
    pub fn delete(&mut self, inumber: u32) -> Result<(), FsError> {
        if inumber < 1 || inumber > self.map.superblock().inode_count() {
            return Err(FsError::BadInumber(inumber));
        }
        if let Some(fd) = self.table.descriptor_for(inumber) {
            return Err(FsError::FileOpen(fd));
        }
        let (blocknr, slot) = self.inode_location(inumber);
        let mut buf = [0u8; BLOCK_SIZE];
        self.disk.read(blocknr, &mut buf);
        let mut nodes = InodeBlock::parse(&buf);
        if !nodes.node(slot).is_allocated() {
            return Err(FsError::DoesNotExist(inumber));
        }

        let inode = *nodes.node(slot);
        for ptr in 0..DIRECT_PTRS {
            self.release_chain(inode.ptr(ptr), 0);
        }
        self.release_chain(inode.ptr(SINGLE_PTR), 1);
        self.release_chain(inode.ptr(DOUBLE_PTR), 2);
        self.release_chain(inode.ptr(TRIPLE_PTR), 3);

        nodes.node_mut(slot).release();
        self.disk.write(blocknr, nodes.as_bytes());
        self.map.save(&mut self.disk);
        debug!("deleted file {}", inumber);
        Ok(())
    }

    /// Flushes every open file and the free map, syncs the device, and
    /// hands it back.
    pub fn shutdown(mut self) -> T {
        for fd in 0..MAX_OPEN_FILES {
            if self.table.get(fd).is_some() {
                // The descriptor was just checked, close cannot fail.
                let _ = self.close(fd);
            }
        }
        self.map.save(&mut self.disk);
        self.disk.sync();
        info!(
            "shutdown: {} device reads, {} device writes",
            self.disk.reads(),
            self.disk.writes()
        );
        self.disk.into_inner()
    }

    /// The inode block and slot an inumber lives at.
    fn inode_location(&self, inumber: u32) -> (BlockNumber, usize) {
        let sb = self.map.superblock();
        let blocknr = sb.first_inode_block() + (inumber - 1) / INODES_PER_BLOCK as u32;
        let slot = ((inumber - 1) % INODES_PER_BLOCK as u32) as usize;
        (blocknr, slot)
    }

    /// Read-modify-write of the block slot an inode lives in.
    fn save_inode(&mut self, inumber: u32, inode: &Inode) {
        let (blocknr, slot) = self.inode_location(inumber);
        let mut buf = [0u8; BLOCK_SIZE];
        self.disk.read(blocknr, &mut buf);
        let mut nodes = InodeBlock::parse(&buf);
        *nodes.node_mut(slot) = *inode;
        self.disk.write(blocknr, nodes.as_bytes());
    }

    /// Frees `blocknr` and, for `depth > 0`, every live block in the
    /// indirect chain below it.
    fn release_chain(&mut self, blocknr: BlockNumber, depth: u32) {
        if blocknr == 0 {
            return;
        }
        if depth > 0 {
            let mut buf = [0u8; BLOCK_SIZE];
            self.disk.read(blocknr, &mut buf);
            let indirect = IndirectBlock::parse(&buf);
            for slot in 0..PTRS_PER_BLOCK {
                self.release_chain(indirect.entry(slot), depth - 1);
            }
        }
        self.map.clear(blocknr);
    }

    /// Resolves the data block under the file's seek pointer.
    ///
    /// In write mode every missing link on the way down is materialized:
    /// data blocks come back fresh, indirect blocks are zeroed and written
    /// before the pointer to them is, so no persisted pointer ever leads to
    /// garbage. Links persisted before a failed allocation stay persisted.
    /// In read mode the first zero pointer short-circuits to a hole.
    fn data_block_at(
        disk: &mut Disk<T>,
        map: &mut FreeMap,
        file: &mut OpenFile,
        mode: Mode,
    ) -> Result<DirectBlock, FsError> {
        let logical = file.seek / BLOCK_SIZE as u32;
        let off = (file.seek % BLOCK_SIZE as u32) as usize;
        if logical >= MAX_FILE_BLOCKS {
            panic!("file too large: logical block {} is beyond reach", logical);
        }

        // Direct pointers live in the inode itself, staged until close.
        if (logical as usize) < DIRECT_PTRS {
            let slot = logical as usize;
            return match (file.inode.ptr(slot), mode) {
                (0, Mode::Read) => Ok(DirectBlock::hole(off)),
                (0, Mode::Write) => {
                    let blocknr = map.find().ok_or(FsError::NoSpace)?;
                    map.save(disk);
                    file.inode.set_ptr(slot, blocknr);
                    Ok(DirectBlock::mapped(blocknr, off, true))
                }
                (blocknr, _) => Ok(DirectBlock::mapped(blocknr, off, false)),
            };
        }

        let (slot, path) = Self::chain_path(logical);
        let mut blocknr = file.inode.ptr(slot);
        if blocknr == 0 {
            if mode == Mode::Read {
                return Ok(DirectBlock::hole(off));
            }
            blocknr = Self::alloc_indirect(disk, map)?;
            file.inode.set_ptr(slot, blocknr);
        }

        // Walk down the chain. `blocknr` is always an indirect block here;
        // `index` picks the slot to follow at each level.
        for (level, &index) in path.iter().enumerate() {
            let mut buf = [0u8; BLOCK_SIZE];
            disk.read(blocknr, &mut buf);
            let mut indirect = IndirectBlock::parse(&buf);
            let next = indirect.entry(index as usize);
            let leaf = level == path.len() - 1;

            if next != 0 {
                if leaf {
                    return Ok(DirectBlock::mapped(next, off, false));
                }
                blocknr = next;
                continue;
            }
            if mode == Mode::Read {
                return Ok(DirectBlock::hole(off));
            }

            let child = if leaf {
                let child = map.find().ok_or(FsError::NoSpace)?;
                map.save(disk);
                child
            } else {
                Self::alloc_indirect(disk, map)?
            };
            indirect.set_entry(index as usize, child);
            disk.write(blocknr, indirect.as_bytes());
            if leaf {
                return Ok(DirectBlock::mapped(child, off, true));
            }
            blocknr = child;
        }
        unreachable!("indirect paths always end at a leaf")
    }

    /// The inode pointer slot and per-level indices addressing a logical
    /// block past the direct range.
    fn chain_path(logical: u32) -> (usize, Vec<u32>) {
        let l = logical - DIRECT_PTRS as u32;
        if l < SINGLE_CAP {
            return (SINGLE_PTR, vec![l]);
        }
        let l = l - SINGLE_CAP;
        if l < DOUBLE_CAP {
            return (DOUBLE_PTR, vec![l / SINGLE_CAP, l % SINGLE_CAP]);
        }
        let l = l - DOUBLE_CAP;
        (
            TRIPLE_PTR,
            vec![l / DOUBLE_CAP, (l % DOUBLE_CAP) / SINGLE_CAP, l % SINGLE_CAP],
        )
    }

    /// Allocates a zeroed indirect block and persists it before anything
    /// points at it.
    fn alloc_indirect(disk: &mut Disk<T>, map: &mut FreeMap) -> Result<BlockNumber, FsError> {
        let blocknr = map.find().ok_or(FsError::NoSpace)?;
        disk.write(blocknr, IndirectBlock::zeroed().as_bytes());
        map.save(disk);
        Ok(blocknr)
    }
}
