use std::sync::Arc;

use enumflags2::BitFlags;
use ffsys::{ErrorCode, FileFileSystem, FsError, OpenFlag};
use tempfile::TempDir;

use crate::BlockFile;

fn format(dir: &TempDir, name: &str, block_size: usize) -> FileFileSystem {
    let device = Arc::new(BlockFile::create(dir.path().join(name)).unwrap());
    FileFileSystem::format(device, block_size).unwrap()
}

fn mount(dir: &TempDir, name: &str) -> FileFileSystem {
    let device = Arc::new(BlockFile::open(dir.path().join(name)).unwrap());
    FileFileSystem::mount(device).unwrap()
}

#[test]
fn format_then_mount_an_empty_image() {
    let dir = tempfile::tempdir().unwrap();
    drop(format(&dir, "x.ffsys", 1024));

    let mut ffs = mount(&dir, "x.ffsys");
    let sb = ffs.superblock();
    assert_eq!(sb.block_size, 1024);
    assert_eq!(sb.n_free_inodes, 8192);
    assert_eq!(sb.n_free_data_blocks, 8192);
    assert!(ffs.open_files().is_empty());
    assert!(ffs.files().unwrap().is_empty());
}

#[test]
fn create_write_and_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut ffs = format(&dir, "a.ffsys", 1024);

    let fd = ffs.open("a", OpenFlag::Create).unwrap();
    assert_eq!(fd, 0);
    assert_eq!(ffs.write(fd, b"hello").unwrap(), 5);
    ffs.seek(fd, 0).unwrap();

    let mut buf = [0; 5];
    assert_eq!(ffs.read(fd, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
}

#[test]
fn a_write_spanning_blocks_lays_out_contiguously() {
    let dir = tempfile::tempdir().unwrap();
    let mut ffs = format(&dir, "b.ffsys", 1024);

    let data: Vec<u8> = (0..2000u32).map(|i| (i % 256) as u8).collect();
    let fd = ffs.open("b", OpenFlag::Create).unwrap();
    assert_eq!(ffs.write(fd, &data).unwrap(), 2000);

    let stats = ffs.files().unwrap();
    assert_eq!(stats[0].size, 2000);
    // blocks[0] and blocks[1] are mapped, blocks[2] is not
    assert_eq!(stats[0].reserved_blocks, 2);

    ffs.seek(fd, 0).unwrap();
    let mut back = vec![0; 2000];
    assert_eq!(ffs.read(fd, &mut back).unwrap(), 2000);
    assert_eq!(back, data);
}

#[test]
fn reads_and_writes_at_arbitrary_positions() {
    let dir = tempfile::tempdir().unwrap();
    let mut ffs = format(&dir, "p.ffsys", 1024);

    let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    let fd = ffs.open("p", OpenFlag::Create).unwrap();
    ffs.write(fd, &data).unwrap();

    // Overwrite a stretch straddling the first block boundary.
    ffs.seek(fd, 1000).unwrap();
    assert_eq!(ffs.write(fd, &[0xee; 100]).unwrap(), 100);

    ffs.seek(fd, 990).unwrap();
    let mut back = [0; 120];
    assert_eq!(ffs.read(fd, &mut back).unwrap(), 120);
    assert_eq!(&back[..10], &data[990..1000]);
    assert_eq!(&back[10..110], &[0xee; 100]);
    assert_eq!(&back[110..], &data[1100..1110]);

    // Overwriting never shrinks the size.
    assert_eq!(ffs.files().unwrap()[0].size, 3000);
}

#[test]
fn indirect_slots_take_over_past_the_direct_area() {
    // 64-byte blocks: direct slots cover 960 bytes, each address block
    // then fans out to 16 further blocks.
    let dir = tempfile::tempdir().unwrap();
    let mut ffs = format(&dir, "i.ffsys", 64);

    let data = vec![0x5a; 15 * 64 + 1];
    let fd = ffs.open("i", OpenFlag::Create).unwrap();
    assert_eq!(ffs.write(fd, &data).unwrap(), data.len());

    // 16 content blocks plus one address block
    assert_eq!(ffs.superblock().n_free_data_blocks, 512 - 17);
    assert_eq!(ffs.files().unwrap()[0].reserved_blocks, 16);

    // The indirect mapping survives a remount.
    drop(ffs);
    let mut ffs = mount(&dir, "i.ffsys");
    let fd = ffs.open("i", BitFlags::empty()).unwrap();
    let mut back = vec![0; data.len()];
    assert_eq!(ffs.read(fd, &mut back).unwrap(), data.len());
    assert_eq!(back, data);
}

#[test]
fn truncate_reclaims_all_but_one_block() {
    let dir = tempfile::tempdir().unwrap();
    let mut ffs = format(&dir, "t.ffsys", 1024);

    let fd = ffs.open("t", OpenFlag::Create).unwrap();
    assert_eq!(ffs.write(fd, &vec![3; 10 * 1024]).unwrap(), 10 * 1024);
    ffs.close(fd).unwrap();
    assert_eq!(ffs.superblock().n_free_data_blocks, 8192 - 10);

    let fd = ffs.open("t", OpenFlag::Truncate).unwrap();
    assert_eq!(ffs.superblock().n_free_data_blocks, 8192 - 1);
    assert_eq!(ffs.files().unwrap()[0].size, 0);

    let mut buf = [0; 8];
    assert_eq!(ffs.read(fd, &mut buf).unwrap(), 0);
}

#[test]
fn contents_survive_a_remount() {
    let dir = tempfile::tempdir().unwrap();

    let mut ffs = format(&dir, "s.ffsys", 1024);
    let fd = ffs.open("notes", OpenFlag::Create).unwrap();
    assert_eq!(ffs.write(fd, b"abc").unwrap(), 3);
    drop(ffs);

    let mut ffs = mount(&dir, "s.ffsys");
    let fd = ffs.open("notes", BitFlags::empty()).unwrap();
    let mut buf = [0; 3];
    assert_eq!(ffs.read(fd, &mut buf).unwrap(), 3);
    assert_eq!(&buf, b"abc");
}

#[test]
fn create_reopens_an_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut ffs = format(&dir, "r.ffsys", 1024);

    let fd = ffs.open("same", OpenFlag::Create).unwrap();
    ffs.write(fd, b"kept").unwrap();
    ffs.close(fd).unwrap();

    // Opening with Create again must find the same inode, not make a
    // second file.
    let fd = ffs.open("same", OpenFlag::Create | OpenFlag::End).unwrap();
    assert_eq!(ffs.files().unwrap().len(), 1);
    assert_eq!(ffs.open_files()[0].pos, 4);

    ffs.seek(fd, 0).unwrap();
    let mut buf = [0; 4];
    ffs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"kept");
}

#[test]
fn descriptors_are_reused_lowest_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut ffs = format(&dir, "d.ffsys", 1024);

    assert_eq!(ffs.open("a", OpenFlag::Create).unwrap(), 0);
    assert_eq!(ffs.open("b", OpenFlag::Create).unwrap(), 1);
    assert_eq!(ffs.open("a", BitFlags::empty()).unwrap(), 2);

    ffs.close(1).unwrap();
    assert_eq!(ffs.open("b", BitFlags::empty()).unwrap(), 1);
}

#[test]
fn unknown_descriptors_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut ffs = format(&dir, "u.ffsys", 1024);

    let mut buf = [0; 1];
    assert!(matches!(
        ffs.read(9, &mut buf).unwrap_err(),
        FsError::NoSuchFileDescriptor
    ));
    assert_eq!(ffs.last_error(), ErrorCode::NoSuchFileDescriptor);

    assert!(ffs.write(9, b"x").is_err());
    assert!(ffs.seek(9, 0).is_err());
    assert!(ffs.close(9).is_err());
}

#[test]
fn seek_is_bounded_by_the_file_size() {
    let dir = tempfile::tempdir().unwrap();
    let mut ffs = format(&dir, "k.ffsys", 1024);

    let fd = ffs.open("k", OpenFlag::Create).unwrap();
    ffs.write(fd, b"0123456789").unwrap();

    ffs.seek(fd, 10).unwrap();
    let err = ffs.seek(fd, 11).unwrap_err();
    assert!(matches!(err, FsError::SeekPastEnd));
    // A bad seek leaves the recorded code alone.
    assert_eq!(ffs.last_error(), ErrorCode::NoError);

    // The position is still where the good seek put it.
    assert_eq!(ffs.open_files()[0].pos, 10);
}

#[test]
fn opening_a_missing_file_without_create_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut ffs = format(&dir, "m.ffsys", 1024);

    assert!(matches!(
        ffs.open("absent", BitFlags::empty()).unwrap_err(),
        FsError::NoSuchFile
    ));
    assert_eq!(ffs.last_error(), ErrorCode::NoSuchFile);

    ffs.reset_error();
    assert_eq!(ffs.last_error(), ErrorCode::NoError);
}

#[test]
fn long_names_are_truncated_to_sixteen_chars() {
    let dir = tempfile::tempdir().unwrap();
    let mut ffs = format(&dir, "n.ffsys", 1024);

    let fd = ffs.open("exactly-sixteen-and-more", OpenFlag::Create).unwrap();
    ffs.close(fd).unwrap();

    assert_eq!(ffs.files().unwrap()[0].name, "exactly-sixteen-");
    assert!(ffs.open("exactly-sixteen-", BitFlags::empty()).is_ok());
}
