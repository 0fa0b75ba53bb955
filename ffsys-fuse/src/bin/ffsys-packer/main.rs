mod cli;

use std::fs;
use std::fs::File;
use std::io;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::DateTime;
use clap::Parser;
use cli::Cli;
use ffsys::{FileFileSystem, FsError, OpenFlag};
use ffsys_fuse::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut ffs = match &cli.source {
        Some(source) => {
            let device = Arc::new(BlockFile::create(&cli.image)?);
            let mut ffs =
                FileFileSystem::format(device, cli.block_size as usize).map_err(into_io)?;
            pack(&mut ffs, source)?;
            ffs
        }
        None => {
            let device = Arc::new(BlockFile::open(&cli.image)?);
            FileFileSystem::mount(device).map_err(into_io)?
        }
    };

    if cli.list {
        list(&mut ffs)?;
    }

    Ok(())
}

/// Copies every regular file under `source` into the image.
fn pack(ffs: &mut FileFileSystem, source: &Path) -> io::Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        log::info!("file={name:?}");

        let mut host_file = File::open(entry.path())?;
        let mut data: Vec<u8> = Vec::new();
        host_file.read_to_end(&mut data)?;

        let fd = ffs.open(&name, OpenFlag::Create).map_err(into_io)?;
        let written = ffs.write(fd, &data).map_err(into_io)?;
        if written < data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("image full: {name:?} packed {written}/{} bytes", data.len()),
            ));
        }
        ffs.close(fd).map_err(into_io)?;
    }

    Ok(())
}

fn list(ffs: &mut FileFileSystem) -> io::Result<()> {
    let sb = ffs.superblock();
    println!("Block size: {}", sb.block_size);
    println!("N free i-nodes: {}", sb.n_free_inodes);
    println!("N free data blocks: {}", sb.n_free_data_blocks);
    println!();

    println!("Files:");
    for stat in ffs.files().map_err(into_io)? {
        let created = DateTime::from_timestamp(stat.created_time as i64, 0).unwrap_or_default();
        println!("- {}", stat.name);
        println!("  Size: {}", stat.size);
        println!("  I-node: {}", stat.inode_i);
        println!("  Created: {}", created.format("%d/%m/%Y - %H:%M"));
        println!("  Reserved {} data blocks.", stat.reserved_blocks);
    }

    Ok(())
}

fn into_io(err: FsError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}
