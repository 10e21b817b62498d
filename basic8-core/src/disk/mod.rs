//! Virtual floppy disk with a FAT-style filesystem.
//!
//! Geometry is a 5.25" single-sided floppy: 40 tracks of 16 sectors of 256
//! bytes, 163,840 bytes in all. Track 0 is reserved for the boot sector,
//! a 64-entry directory and the allocation table; tracks 1-39 carry file
//! data, allocated one sector ("unit") at a time.

mod entry;
mod image;

pub use entry::{DirEntry, ATTR_DELETED, ATTR_VOLUME};
pub use image::DiskImage;

pub const TRACKS: usize = 40;
pub const SECTORS_PER_TRACK: usize = 16;
pub const SECTOR_SIZE: usize = 256;
pub const DISK_SIZE: usize = TRACKS * SECTORS_PER_TRACK * SECTOR_SIZE;

/// Sectors addressable by the allocation table.
pub const TOTAL_UNITS: usize = TRACKS * SECTORS_PER_TRACK;
/// First data unit; everything below belongs to track 0.
pub const DATA_START_UNIT: usize = SECTORS_PER_TRACK;
/// Bytes available to files (tracks 1-39).
pub const DATA_CAPACITY: usize = (TOTAL_UNITS - DATA_START_UNIT) * SECTOR_SIZE;

pub const DIR_ENTRIES: usize = 64;
pub const DIR_ENTRY_SIZE: usize = 32;
/// Directory occupies sectors 1-8 of track 0.
pub const DIR_OFFSET: usize = SECTOR_SIZE;
/// Allocation table occupies sectors 9-13 of track 0 (640 u16 entries).
pub const FAT_OFFSET: usize = 9 * SECTOR_SIZE;

/// Allocation table sentinels. Any other value is the next unit in the
/// file's chain.
pub const FAT_FREE: u16 = 0xFFFF;
pub const FAT_END: u16 = 0xFFFE;
/// Marker for track 0 units, which are never allocatable.
pub const FAT_SYSTEM: u16 = 0x0000;

/// Boot sector signature.
pub const BOOT_SIGNATURE: &[u8] = b"B8DOS1.0";

/// Normalize a filename to 8.3 form.
///
/// - Uppercases everything
/// - Truncates the name to 8 chars and the extension to 3
/// - Strips characters outside `A-Z 0-9 $ # @ ! % ' ( ) - _`
/// - Applies `default_ext` when the name carries no extension
pub fn normalize_8_3(filename: &str, default_ext: &str) -> String {
    let upper = filename.to_uppercase();
    let (name, ext) = match upper.rfind('.') {
        Some(pos) => (&upper[..pos], &upper[pos + 1..]),
        None => (upper.as_str(), default_ext),
    };

    fn clean(s: &str) -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric() || "$#@!%'()-_".contains(*c))
            .collect()
    }

    let clean_name: String = clean(name).chars().take(8).collect();
    let clean_ext: String = clean(ext).chars().take(3).collect();

    let final_name = if clean_name.is_empty() {
        "_".to_string()
    } else {
        clean_name
    };

    if clean_ext.is_empty() {
        final_name
    } else {
        format!("{}.{}", final_name, clean_ext)
    }
}
