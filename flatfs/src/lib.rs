//! A flat-namespace file store over a fixed-size block device.
//!
//! Files are addressed by inumber rather than by path: the engine keeps no
//! directory tree, only a superblock, a free-space bitmap, and a fixed region
//! of inodes mapping logical file blocks to data blocks through direct and
//! single/double/triple indirect pointers. Sparse regions are never
//! materialized; they read back as zeros and only take blocks once written.
//!
//! Storage attaches through the [`io::BlockStorage`] trait.
//! [`io::FileBlockEmulator`] backs it with a regular file for development
//! and testing.

#[macro_use]
extern crate log;

mod alloc;
mod data;
mod fs;
pub mod io;
mod node;
mod sb;
mod table;

pub use crate::fs::{FlatFs, FsError};
pub use crate::table::Fd;

/// Every device block, metadata or data, is this many bytes.
pub const BLOCK_SIZE: usize = 512;

/// One block's worth of bytes, the unit every device transfer moves.
pub(crate) type BlockBuf = [u8; BLOCK_SIZE];
