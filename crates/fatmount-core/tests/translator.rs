//! Translator tests on real FAT images.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use chrono::{Local, NaiveDate, TimeZone};
use fatmount_core::{
    DirEntry, FatVfs, FatfsEngine, FileType, MAX_VOLUMES, OpenFlags, VfsError, VfsOps, VolumeFlags,
};

use common::{IMAGE_BYTES, Instrumented, blank_image, fat_image, init_tracing};

fn names(entries: &[DirEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.name.as_str()).collect()
}

fn p(s: &str) -> &Path {
    Path::new(s)
}

// ============================================================================
// Mount lifecycle
// ============================================================================

#[test]
fn test_hello_persists_across_remount() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);

    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();
    volume.create(p("/hello"), OpenFlags::write()).unwrap();
    assert_eq!(volume.write(p("/hello"), OpenFlags::write(), 0, b"hello").unwrap(), 5);
    volume.unmount();
    assert!(vfs.volumes().is_empty());

    let volume = vfs.mount(&image, VolumeFlags::READ_ONLY).unwrap();
    assert_eq!(volume.read(p("/hello"), OpenFlags::read(), 0, 4096).unwrap(), b"hello");
    let attr = volume.getattr(p("/hello")).unwrap();
    assert!(attr.is_file());
    assert_eq!(attr.size, 5);
}

#[test]
fn test_data_survives_dropping_the_bridge() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);

    {
        let vfs = Arc::new(FatVfs::new());
        let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();
        volume.write_all(p("/notes.txt"), b"kept").unwrap();
    }

    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::READ_ONLY).unwrap();
    assert_eq!(volume.read_all(p("/notes.txt")).unwrap(), b"kept");
}

#[test]
fn test_mount_failure_releases_the_slot() {
    let dir = tempfile::tempdir().unwrap();
    let vfs = Arc::new(FatVfs::new());

    let err = vfs
        .mount(dir.path().join("missing.img"), VolumeFlags::READ_ONLY)
        .unwrap_err();
    assert!(matches!(err, VfsError::NotInitialized(_)), "{err:?}");

    let blank = blank_image(dir.path(), "blank.img", IMAGE_BYTES);
    let err = vfs.mount(&blank, VolumeFlags::READ_ONLY).unwrap_err();
    assert!(matches!(err, VfsError::NotInitialized(_)), "{err:?}");

    assert!(vfs.volumes().is_empty());

    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let volume = vfs.mount(&image, VolumeFlags::READ_ONLY).unwrap();
    assert_eq!(volume.id(), 0);
}

#[test]
fn test_volume_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());

    let volumes: Vec<_> = (0..MAX_VOLUMES)
        .map(|_| vfs.mount(&image, VolumeFlags::READ_ONLY).unwrap())
        .collect();
    let ids: Vec<_> = volumes.iter().map(|v| usize::from(v.id())).collect();
    assert_eq!(ids, (0..MAX_VOLUMES).collect::<Vec<_>>());

    let err = vfs.mount(&image, VolumeFlags::READ_ONLY).unwrap_err();
    assert!(matches!(err, VfsError::CapacityExceeded(MAX_VOLUMES)));

    // A freed slot is reused.
    let mut volumes = volumes;
    volumes.remove(3).unmount();
    let again = vfs.mount(&image, VolumeFlags::READ_ONLY).unwrap();
    assert_eq!(again.id(), 3);
}

#[test]
fn test_unmounted_clone_never_reaches_the_next_volume() {
    let dir = tempfile::tempdir().unwrap();
    let first = fat_image(dir.path(), "a.img", IMAGE_BYTES);
    let second = fat_image(dir.path(), "b.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());

    let volume = vfs.mount(&first, VolumeFlags::empty()).unwrap();
    let stale = volume.clone();
    volume.unmount();

    let next = vfs.mount(&second, VolumeFlags::empty()).unwrap();
    assert_eq!(next.id(), stale.id());

    let err = stale.write_all(p("/from_old_handle"), b"x").unwrap_err();
    assert!(matches!(err, VfsError::NotInitialized(_)), "{err:?}");
    assert!(matches!(stale.statfs(), Err(VfsError::NotInitialized(_))));
    assert!(matches!(stale.getattr(p("/")), Err(VfsError::NotInitialized(_))));
    assert!(stale.geometry().is_none());
    assert!(!next.exists(p("/from_old_handle")));

    // A second unmount through the old handle leaves the new volume alone.
    stale.unmount();
    assert_eq!(vfs.volumes().len(), 1);
    next.write_all(p("/still_here"), b"y").unwrap();
    assert_eq!(next.read_all(p("/still_here")).unwrap(), b"y");
}

#[test]
fn test_volumes_report_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::READ_ONLY).unwrap();

    let infos = vfs.volumes();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].id, 0);
    assert_eq!(infos[0].source, image);
    assert!(infos[0].read_only);

    let geometry = infos[0].geometry.clone().unwrap();
    assert_eq!(geometry.sector_size, 512);
    assert!(geometry.cluster_size >= 512);
    assert_eq!(Some(geometry), volume.geometry());
}

// ============================================================================
// Read-only policy
// ============================================================================

#[test]
fn test_read_only_rejects_mutations_without_engine_calls() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    {
        let vfs = Arc::new(FatVfs::new());
        let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();
        volume.write_all(p("/existing.txt"), b"data").unwrap();
        volume.mkdir(p("/dir")).unwrap();
    }

    let (engine, stats) = Instrumented::new(FatfsEngine::new());
    let vfs = Arc::new(FatVfs::with_engine(engine));
    let volume = vfs.mount(&image, VolumeFlags::READ_ONLY).unwrap();
    assert!(volume.read_only());
    let before = stats.calls();

    let results = [
        volume.create(p("/new.txt"), OpenFlags::write()),
        volume.write(p("/existing.txt"), OpenFlags::write(), 0, b"x").map(drop),
        volume.open(p("/existing.txt"), OpenFlags::write()),
        volume.open(p("/existing.txt"), OpenFlags::read_write()),
        volume.mkdir(p("/other")),
        volume.unlink(p("/existing.txt")),
        volume.rmdir(p("/dir")),
        volume.rename(p("/existing.txt"), p("/renamed.txt")),
        volume.truncate(p("/existing.txt"), 0),
        volume.utimens(p("/existing.txt"), SystemTime::now()),
    ];
    for result in results {
        assert!(matches!(result, Err(VfsError::ReadOnly)), "{result:?}");
    }
    assert_eq!(stats.calls(), before, "engine reached on a read-only volume");

    volume.open(p("/existing.txt"), OpenFlags::read()).unwrap();
    assert!(stats.calls() > before);
    assert_eq!(volume.read_all(p("/existing.txt")).unwrap(), b"data");
}

// ============================================================================
// Serialization
// ============================================================================

#[test]
fn test_calls_are_serialized_across_volumes() {
    const CHUNK: usize = 4096;
    const CHUNKS: usize = 6;

    let dir = tempfile::tempdir().unwrap();
    let first = fat_image(dir.path(), "a.img", IMAGE_BYTES);
    let second = fat_image(dir.path(), "b.img", IMAGE_BYTES);

    let (engine, stats) = Instrumented::with_delay(FatfsEngine::new(), Duration::from_millis(2));
    let vfs = Arc::new(FatVfs::with_engine(engine));
    let volumes = [
        vfs.mount(&first, VolumeFlags::empty()).unwrap(),
        vfs.mount(&second, VolumeFlags::empty()).unwrap(),
    ];

    let fill = |worker: usize, chunk: usize| vec![(worker * 16 + chunk) as u8; CHUNK];

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let volume = volumes[worker % 2].clone();
            thread::spawn(move || {
                let path = format!("/worker{worker}.bin");
                volume.create(p(&path), OpenFlags::write()).unwrap();
                for chunk in 0..CHUNKS {
                    let data = fill(worker, chunk);
                    let offset = (chunk * CHUNK) as u64;
                    let written = volume.write(p(&path), OpenFlags::write(), offset, &data).unwrap();
                    assert_eq!(written as usize, CHUNK);
                    let back = volume
                        .read(p(&path), OpenFlags::read(), offset, CHUNK as u32)
                        .unwrap();
                    assert_eq!(back, data, "worker {worker} chunk {chunk}");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(stats.max_in_flight(), 1);
    assert!(stats.calls() >= 4 * CHUNKS * 2);

    for worker in 0..4 {
        let volume = &volumes[worker % 2];
        let other = &volumes[(worker + 1) % 2];
        let path = format!("/worker{worker}.bin");
        let expected: Vec<u8> = (0..CHUNKS).flat_map(|chunk| fill(worker, chunk)).collect();
        assert_eq!(volume.read_all(p(&path)).unwrap(), expected, "worker {worker}");
        assert!(!other.exists(p(&path)));
    }
}

// ============================================================================
// Directories
// ============================================================================

#[test]
fn test_empty_directory_lists_dot_entries_only() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();

    volume.mkdir(p("/empty")).unwrap();
    let entries = volume.readdir(p("/empty")).unwrap();
    assert_eq!(names(&entries), [".", ".."]);
    assert!(entries.iter().all(|e| e.kind == FileType::Directory));
}

#[test]
fn test_readdir_reports_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();

    volume.mkdir(p("/docs")).unwrap();
    volume.write_all(p("/docs/Long File Name.txt"), b"x").unwrap();
    volume.mkdir(p("/docs/sub")).unwrap();

    let mut entries = volume.readdir(p("/docs")).unwrap();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(
        entries,
        vec![
            DirEntry::directory("."),
            DirEntry::directory(".."),
            DirEntry::file("Long File Name.txt"),
            DirEntry::directory("sub"),
        ]
    );

    volume.opendir(p("/docs")).unwrap();
    volume.opendir(p("/")).unwrap();
    assert!(matches!(volume.opendir(p("/nope")), Err(VfsError::NotFound(_))));
    assert!(matches!(volume.readdir(p("/nope")), Err(VfsError::NotFound(_))));
}

#[test]
fn test_mkdir_existing_and_rmdir_non_empty() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();

    volume.mkdir(p("/d")).unwrap();
    assert!(matches!(volume.mkdir(p("/d")), Err(VfsError::AlreadyExists(_))));
    assert!(matches!(volume.mkdir(p("/missing/d")), Err(VfsError::NotFound(_))));

    volume.write_all(p("/d/f"), b"1").unwrap();
    assert!(matches!(volume.rmdir(p("/d")), Err(VfsError::PermissionDenied(_))));

    volume.unlink(p("/d/f")).unwrap();
    volume.rmdir(p("/d")).unwrap();
    assert!(!volume.exists(p("/d")));

    // Case variants outside ASCII name the same directory.
    volume.mkdir(p("/Äpfel")).unwrap();
    assert!(matches!(volume.mkdir(p("/äpfel")), Err(VfsError::AlreadyExists(_))));
    assert!(volume.getattr(p("/äpfel")).unwrap().is_dir());
}

// ============================================================================
// Files
// ============================================================================

#[test]
fn test_getattr() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();

    let root = volume.getattr(p("/")).unwrap();
    assert!(root.is_dir());
    assert_eq!(root.perm, 0o755);
    assert_eq!(root.nlink, 2);

    volume.mkdir(p("/sub")).unwrap();
    let sub = volume.getattr(p("/sub")).unwrap();
    assert!(sub.is_dir());
    assert_eq!(sub.nlink, 2);

    volume.write_all(p("/sub/file.bin"), &[7u8; 3000]).unwrap();
    let file = volume.getattr(p("/sub/file.bin")).unwrap();
    assert!(file.is_file());
    assert_eq!(file.size, 3000);
    assert_eq!(file.nlink, 1);
    assert_eq!(file.ctime, file.mtime);

    // FAT names are case-insensitive.
    assert_eq!(volume.getattr(p("/SUB/FILE.BIN")).unwrap().size, 3000);

    assert!(matches!(volume.getattr(p("/nope")), Err(VfsError::NotFound(_))));
    assert!(matches!(volume.getattr(p("/nope/deeper")), Err(VfsError::NotFound(_))));
}

#[test]
fn test_open_and_create_dispositions() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();

    assert!(matches!(volume.open(p("/a"), OpenFlags::read()), Err(VfsError::NotFound(_))));
    volume.create(p("/a"), OpenFlags::write()).unwrap();
    volume.open(p("/a"), OpenFlags::read()).unwrap();

    let exclusive = OpenFlags {
        exclusive: true,
        ..OpenFlags::write()
    };
    assert!(matches!(volume.create(p("/a"), exclusive), Err(VfsError::AlreadyExists(_))));

    volume.write_all(p("/a"), b"contents").unwrap();
    let truncating = OpenFlags {
        truncate: true,
        ..OpenFlags::write()
    };
    volume.create(p("/a"), truncating).unwrap();
    assert_eq!(volume.getattr(p("/a")).unwrap().size, 0);

    volume.mkdir(p("/d")).unwrap();
    assert!(matches!(volume.open(p("/d"), OpenFlags::read()), Err(VfsError::NotFound(_))));
    assert!(matches!(volume.create(p("/d"), OpenFlags::write()), Err(VfsError::PermissionDenied(_))));
}

#[test]
fn test_read_write_at_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();
    let path = p("/data.bin");

    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    volume.create(path, OpenFlags::write()).unwrap();
    assert_eq!(volume.write(path, OpenFlags::write(), 0, &payload).unwrap(), 20_000);

    assert_eq!(
        volume.read(path, OpenFlags::read(), 10_000, 100).unwrap(),
        &payload[10_000..10_100]
    );
    // Short read at end of file.
    assert_eq!(volume.read(path, OpenFlags::read(), 19_990, 100).unwrap().len(), 10);

    volume.write(path, OpenFlags::read_write(), 5, b"PATCH").unwrap();
    let back = volume.read_all(path).unwrap();
    assert_eq!(&back[..5], &payload[..5]);
    assert_eq!(&back[5..10], b"PATCH");
    assert_eq!(&back[10..], &payload[10..]);

    // Writing past the end fills the gap with zeros.
    let sparse = p("/sparse");
    volume.create(sparse, OpenFlags::write()).unwrap();
    volume.write(sparse, OpenFlags::write(), 10, b"x").unwrap();
    assert_eq!(volume.read_all(sparse).unwrap(), b"\0\0\0\0\0\0\0\0\0\0x");

    // Access mode is enforced by the engine.
    assert!(matches!(
        volume.read(path, OpenFlags::write(), 0, 1),
        Err(VfsError::PermissionDenied(_))
    ));
    assert!(matches!(
        volume.write(path, OpenFlags::read(), 0, b"x"),
        Err(VfsError::PermissionDenied(_))
    ));
}

#[test]
fn test_write_on_full_volume_reports_bytes_written() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "small.img", 1024 * 1024);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();
    let path = p("/big.bin");

    let data = vec![0x5au8; 2 * 1024 * 1024];
    volume.create(path, OpenFlags::write()).unwrap();
    let written = volume.write(path, OpenFlags::write(), 0, &data).unwrap() as usize;
    assert!(written > 0);
    assert!(written < data.len());

    assert_eq!(volume.getattr(path).unwrap().size, written as u64);
    let back = volume.read_all(path).unwrap();
    assert_eq!(back.len(), written);
    assert!(back.iter().all(|&b| b == 0x5a));
}

#[test]
fn test_truncate_shrinks_and_extends() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();

    volume.write_all(p("/t"), b"abcdef").unwrap();
    volume.truncate(p("/t"), 2).unwrap();
    assert_eq!(volume.read_all(p("/t")).unwrap(), b"ab");

    volume.truncate(p("/t"), 5).unwrap();
    assert_eq!(volume.read_all(p("/t")).unwrap(), b"ab\0\0\0");

    assert!(matches!(volume.truncate(p("/nope"), 0), Err(VfsError::NotFound(_))));
}

#[test]
fn test_unlink_and_rename() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();

    volume.write_all(p("/a.txt"), b"A").unwrap();
    volume.write_all(p("/b.txt"), b"B").unwrap();
    volume.mkdir(p("/d")).unwrap();

    assert!(matches!(
        volume.rename(p("/a.txt"), p("/b.txt")),
        Err(VfsError::AlreadyExists(_))
    ));
    assert!(matches!(volume.rename(p("/zzz"), p("/y")), Err(VfsError::NotFound(_))));

    volume.rename(p("/a.txt"), p("/d/moved.txt")).unwrap();
    assert!(!volume.exists(p("/a.txt")));
    assert_eq!(volume.read_all(p("/d/moved.txt")).unwrap(), b"A");

    volume.unlink(p("/b.txt")).unwrap();
    assert!(matches!(volume.unlink(p("/b.txt")), Err(VfsError::NotFound(_))));
}

#[test]
fn test_utimens() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();
    volume.write_all(p("/stamped"), b"x").unwrap();

    let at = |s: u32| {
        let naive = NaiveDate::from_ymd_opt(2020, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, s)
            .unwrap();
        SystemTime::from(Local.from_local_datetime(&naive).earliest().unwrap())
    };
    volume.utimens(p("/stamped"), at(31)).unwrap();
    assert_eq!(volume.getattr(p("/stamped")).unwrap().mtime, at(30));

    // 1970 has no FAT encoding.
    let too_old = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
    assert!(matches!(
        volume.utimens(p("/stamped"), too_old),
        Err(VfsError::InvalidArgument(_))
    ));
    assert!(matches!(
        volume.utimens(p("/nope"), at(0)),
        Err(VfsError::NotFound(_))
    ));
}

#[test]
fn test_statfs() {
    let dir = tempfile::tempdir().unwrap();
    let image = fat_image(dir.path(), "disk.img", IMAGE_BYTES);
    let vfs = Arc::new(FatVfs::new());
    let volume = vfs.mount(&image, VolumeFlags::empty()).unwrap();

    let before = volume.statfs().unwrap();
    assert_eq!(before.namelen, 255);
    assert!(before.blocks > 0);
    assert!(before.bfree <= before.blocks);

    volume.write_all(p("/big"), &vec![1u8; 256 * 1024]).unwrap();
    let after = volume.statfs().unwrap();
    assert!(after.bfree < before.bfree);
}

// ============================================================================
// Multiple volumes
// ============================================================================

#[test]
fn test_volumes_are_namespaced() {
    let dir = tempfile::tempdir().unwrap();
    let first = fat_image(dir.path(), "a.img", IMAGE_BYTES);
    let second = fat_image(dir.path(), "b.img", IMAGE_BYTES);

    let vfs = Arc::new(FatVfs::new());
    let zero = vfs.mount(&first, VolumeFlags::empty()).unwrap();
    let one = vfs.mount(&second, VolumeFlags::empty()).unwrap();
    assert_eq!((zero.id(), one.id()), (0, 1));

    zero.write_all(p("/same.txt"), b"zero").unwrap();
    one.write_all(p("/same.txt"), b"one").unwrap();
    one.write_all(p("/only-one.txt"), b"1").unwrap();
    one.mkdir(p("/sub")).unwrap();
    one.rename(p("/only-one.txt"), p("/sub/only-one.txt")).unwrap();

    assert_eq!(zero.read_all(p("/same.txt")).unwrap(), b"zero");
    assert_eq!(one.read_all(p("/same.txt")).unwrap(), b"one");
    assert!(!zero.exists(p("/sub")));
    assert!(one.exists(p("/sub/only-one.txt")));

    // Unmounting one volume leaves the other usable.
    zero.unmount();
    assert_eq!(one.read_all(p("/same.txt")).unwrap(), b"one");
    assert_eq!(vfs.volumes().len(), 1);
}
