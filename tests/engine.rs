use std::fs;

use memfs::{FsConfig, FsError, MemFs, OpenFlag};
use tempfile::tempdir;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

#[test]
fn test_write_read_and_export() {
    let memfs = MemFs::new(FsConfig::default()).unwrap();
    let data = b"twenty bytes of text";
    assert_eq!(data.len(), 20);

    let handle = memfs.open("/f1", OpenFlag::CREATE).unwrap();
    assert_eq!(memfs.write(handle, data).unwrap(), 20);
    memfs.close(handle).unwrap();

    let handle = memfs.open("/f1", OpenFlag::read_only()).unwrap();
    let mut buf = [0; 20];
    assert_eq!(memfs.read(handle, &mut buf).unwrap(), 20);
    assert_eq!(&buf, data);
    memfs.close(handle).unwrap();

    let dir = tempdir().unwrap();
    let out = dir.path().join("out");
    memfs.export("/f1", &out).unwrap();

    assert_eq!(fs::read(&out).unwrap(), data);
    assert_eq!(memfs.usage().open_files, 0);
}

#[test]
fn test_open_without_create_and_trunc_on_empty_file() {
    let memfs = MemFs::new(FsConfig::default()).unwrap();

    assert!(matches!(
        memfs.open("/missing", OpenFlag::read_only()),
        Err(FsError::NotFound)
    ));

    let created = memfs.open("/f", OpenFlag::CREATE).unwrap();
    let truncated = memfs.open("/f", OpenFlag::TRUNC).unwrap();

    assert_eq!(memfs.stat("/f").unwrap().size, 0);
    memfs.close(created).unwrap();
    memfs.close(truncated).unwrap();
}

#[test]
fn test_indirect_block_round_trip() {
    let memfs = MemFs::new(FsConfig::default()).unwrap();
    let config = memfs.config().clone();
    let data = pattern(config.block_size * (config.num_direct + 5) + 123);

    let handle = memfs.open("/big", OpenFlag::CREATE).unwrap();
    assert_eq!(memfs.write(handle, &data).unwrap(), data.len());
    memfs.close(handle).unwrap();

    let stat = memfs.stat("/big").unwrap();
    assert_eq!(stat.size, data.len());
    assert_eq!(stat.blocks, config.num_direct + 6 + 1);

    let handle = memfs.open("/big", OpenFlag::read_only()).unwrap();
    let mut buf = vec![0; data.len() + 10];
    let read = memfs.read(handle, &mut buf).unwrap();
    memfs.close(handle).unwrap();

    assert_eq!(read, data.len());
    assert_eq!(&buf[..read], &data[..]);
    memfs.check().unwrap();
}

#[test]
fn test_appending_across_the_indirect_boundary() {
    let memfs = MemFs::new(FsConfig::default()).unwrap();
    let data = pattern(15_000);

    for chunk in data.chunks(700) {
        let handle = memfs.open("/log", OpenFlag::CREATE | OpenFlag::APPEND).unwrap();
        assert_eq!(memfs.write(handle, chunk).unwrap(), chunk.len());
        memfs.close(handle).unwrap();
    }

    let handle = memfs.open("/log", OpenFlag::read_only()).unwrap();
    assert_eq!(memfs.read_to_end(handle).unwrap(), data);
    memfs.check().unwrap();
}

#[test]
fn test_import_then_export() {
    let memfs = MemFs::new(FsConfig::default()).unwrap();
    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    let data = pattern(5000);
    fs::write(&source, &data).unwrap();

    assert_eq!(memfs.import(&source, "/copy").unwrap(), data.len());

    let destination = dir.path().join("destination");
    memfs.export("/copy", &destination).unwrap();
    assert_eq!(fs::read(&destination).unwrap(), data);

    // importing again replaces the contents
    fs::write(&source, b"short").unwrap();
    assert_eq!(memfs.import(&source, "/copy").unwrap(), 5);
    memfs.export("/copy", &destination).unwrap();
    assert_eq!(fs::read(&destination).unwrap(), b"short");
}

#[test]
fn test_import_is_clamped_to_max_file_size() {
    let config = FsConfig {
        block_size: 64,
        num_direct: 2,
        num_blocks: 64,
        ..FsConfig::default()
    };
    let max = config.max_file_size();
    let memfs = MemFs::new(config).unwrap();

    let dir = tempdir().unwrap();
    let source = dir.path().join("source");
    fs::write(&source, pattern(max + 500)).unwrap();

    assert_eq!(memfs.import(&source, "/f").unwrap(), max);
    assert_eq!(memfs.stat("/f").unwrap().size, max);
}

#[test]
fn test_export_failures() {
    let memfs = MemFs::new(FsConfig::default()).unwrap();
    let dir = tempdir().unwrap();

    assert!(matches!(
        memfs.export("/missing", dir.path().join("out")),
        Err(FsError::NotFound)
    ));

    let handle = memfs.open("/f", OpenFlag::CREATE).unwrap();
    memfs.close(handle).unwrap();

    assert!(matches!(
        memfs.export("/f", dir.path().join("no-such-dir").join("out")),
        Err(FsError::HostIo(_))
    ));
    assert_eq!(memfs.usage().open_files, 0);
}

#[test]
fn test_import_missing_host_file() {
    let memfs = MemFs::new(FsConfig::default()).unwrap();
    let dir = tempdir().unwrap();

    assert!(matches!(
        memfs.import(dir.path().join("missing"), "/f"),
        Err(FsError::HostIo(_))
    ));
    assert_eq!(memfs.lookup("/f").unwrap(), None);
}

#[test]
fn test_read_dir_lists_entries_in_slot_order() {
    let memfs = MemFs::new(FsConfig::default()).unwrap();

    for name in ["a", "b", "c"] {
        let handle = memfs.open(&format!("/{name}"), OpenFlag::CREATE).unwrap();
        memfs.close(handle).unwrap();
    }
    memfs.unlink("/b").unwrap();
    let handle = memfs.open("/d", OpenFlag::CREATE).unwrap();
    memfs.close(handle).unwrap();

    let names: Vec<_> = memfs
        .read_dir()
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, ["a", "d", "c"]);
}

#[test]
fn test_create_and_delete_cycles_do_not_leak() {
    let memfs = MemFs::new(FsConfig {
        num_blocks: 64,
        ..FsConfig::default()
    })
    .unwrap();
    let initial = memfs.usage();

    for round in 0..20 {
        let handle = memfs.open("/tmp", OpenFlag::CREATE).unwrap();
        memfs.write(handle, &pattern(1024 * (round % 15 + 1))).unwrap();
        memfs.close(handle).unwrap();
        memfs.unlink("/tmp").unwrap();
    }

    assert_eq!(memfs.usage(), initial);
    memfs.check().unwrap();
}
