use std::io::SeekFrom;

use tempfile::NamedTempFile;

use flatfs::io::{FileBlockEmulator, FileBlockEmulatorBuilder};
use flatfs::{FlatFs, FsError, BLOCK_SIZE};

fn emulator_on(file: std::fs::File, blocks: u32, clear: bool) -> FileBlockEmulator {
  FileBlockEmulatorBuilder::from(file)
    .with_block_count(blocks)
    .clear_medium(clear)
    .build()
    .expect("could not initialize disk emulator")
}

#[test]
fn files_survive_a_remount() {
  let tf = NamedTempFile::new().unwrap();

  let mut fs = FlatFs::mount(emulator_on(tf.reopen().unwrap(), 64, true));
  fs.format(64, 2).unwrap();
  let fd = fs.create().unwrap();
  fs.write(fd, b"persisted across remount").unwrap();
  fs.shutdown();

  // A later mount of the same medium sees the same file.
  let mut fs = FlatFs::mount(emulator_on(tf.into_file(), 64, false));
  let fd = fs.open(1).unwrap();
  let mut buf = [0u8; 24];
  assert_eq!(fs.read(fd, &mut buf).unwrap(), 24);
  assert_eq!(&buf, b"persisted across remount");
}

#[test]
fn interleaved_writes_keep_files_apart() {
  let tf = NamedTempFile::new().unwrap();
  let mut fs = FlatFs::mount(emulator_on(tf.into_file(), 128, true));
  fs.format(128, 1).unwrap();

  let a = fs.create().unwrap();
  let b = fs.create().unwrap();
  // Alternate writes block by block so the two files' allocations
  // interleave on the device, crossing the direct range in both.
  for _ in 0..13 {
    fs.write(a, &[0x11u8; BLOCK_SIZE]).unwrap();
    fs.write(b, &[0x22u8; BLOCK_SIZE]).unwrap();
  }

  for (fd, fill) in [(a, 0x11u8), (b, 0x22u8)].iter().copied() {
    fs.seek(fd, SeekFrom::Start(0)).unwrap();
    let mut buf = vec![0u8; 13 * BLOCK_SIZE];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), buf.len());
    assert!(buf.iter().all(|&byte| byte == fill));
  }
}

#[test]
fn an_unformatted_volume_has_no_files() {
  let tf = NamedTempFile::new().unwrap();
  let mut fs = FlatFs::mount(emulator_on(tf.into_file(), 16, true));
  // A zeroed superblock parses as a volume with no inodes.
  match fs.open(1).unwrap_err() {
    FsError::BadInumber(1) => (),
    e => panic!("unexpected error: {}", e),
  }
}

#[test]
fn shutdown_returns_the_device_intact() {
  let tf = NamedTempFile::new().unwrap();
  let mut fs = FlatFs::mount(emulator_on(tf.reopen().unwrap(), 32, true));
  fs.format(32, 1).unwrap();
  let fd = fs.create().unwrap();
  fs.write(fd, b"bytes on the way out").unwrap();

  let dev = fs.shutdown();
  let file = dev.into_file();
  assert_eq!(file.metadata().unwrap().len(), 32 * BLOCK_SIZE as u64);
}
