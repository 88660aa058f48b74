//! Formats an emulated disk backed by a temporary file, then runs a file
//! through its paces.

use std::io::SeekFrom;

use flatfs::io::FileBlockEmulatorBuilder;
use flatfs::FlatFs;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dev = tempfile::tempfile()?;
    let dev = FileBlockEmulatorBuilder::from(dev)
        .with_block_count(256)
        .build()?;

    let mut fs = FlatFs::mount(dev);
    fs.format(256, 2)?;

    let fd = fs.create()?;
    fs.write(fd, b"hello, flat file store")?;
    fs.seek(fd, SeekFrom::Start(0))?;

    let mut buf = [0u8; 22];
    let n = fs.read(fd, &mut buf)?;
    println!(
        "file {} holds {} bytes: {}",
        fs.inumber(fd)?,
        n,
        String::from_utf8_lossy(&buf[..n])
    );

    fs.close(fd)?;
    fs.shutdown();
    Ok(())
}
