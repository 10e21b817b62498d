//! Durability tests against real disk image files.

use std::path::PathBuf;

use basic8_core::disk::DISK_SIZE;
use basic8_core::{Basic8Error, DiskImage};

/// Unique scratch path per test; removed by the guard on drop.
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "basic8-test-{}-{}.dsk",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        Self(path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[test]
fn missing_image_is_created_full_size() {
    let scratch = ScratchFile::new("create");
    {
        let disk = DiskImage::open(&scratch.0).unwrap();
        assert!(disk.list_files().is_empty());
    }
    let on_disk = std::fs::metadata(&scratch.0).unwrap();
    assert_eq!(on_disk.len(), DISK_SIZE as u64);
}

#[test]
fn files_survive_a_remount() {
    let scratch = ScratchFile::new("remount");
    let payload: Vec<u8> = (0..600u32).map(|i| (i % 256) as u8).collect();
    {
        let mut disk = DiskImage::open(&scratch.0).unwrap();
        disk.save_file("KEEP", &payload).unwrap();
        // No explicit flush call: save_file persists on its own.
    }
    {
        let disk = DiskImage::open(&scratch.0).unwrap();
        assert_eq!(disk.load_file("KEEP").unwrap(), payload);
        assert_eq!(disk.list_files(), vec![("KEEP.BAS".to_string(), 600)]);
    }
}

#[test]
fn deletion_persists_too() {
    let scratch = ScratchFile::new("delete");
    {
        let mut disk = DiskImage::open(&scratch.0).unwrap();
        disk.save_file("GONE", b"bytes").unwrap();
        disk.delete_file("GONE").unwrap();
    }
    let disk = DiskImage::open(&scratch.0).unwrap();
    assert!(matches!(
        disk.load_file("GONE"),
        Err(Basic8Error::FileNotFound(_))
    ));
}

#[test]
fn truncated_image_is_rejected() {
    let scratch = ScratchFile::new("truncated");
    std::fs::write(&scratch.0, b"not a disk image").unwrap();
    assert!(matches!(
        DiskImage::open(&scratch.0),
        Err(Basic8Error::InvalidImage(_))
    ));
}

#[test]
fn foreign_image_of_the_right_size_is_rejected() {
    let scratch = ScratchFile::new("foreign");
    std::fs::write(&scratch.0, vec![0xAAu8; DISK_SIZE]).unwrap();
    assert!(matches!(
        DiskImage::open(&scratch.0),
        Err(Basic8Error::InvalidImage(_))
    ));
}
