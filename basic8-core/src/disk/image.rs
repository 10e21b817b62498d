//! The disk image: a 163,840-byte buffer plus its backing file.
//!
//! The whole image is the unit of durability. Every mutating operation
//! leaves the in-memory image consistent before returning and flushes it to
//! the backing file, so a crash can only lose the operation in flight,
//! never corrupt what an earlier flush persisted. Failed operations
//! (`DiskFull`, `DirectoryFull`, `FileNotFound`) perform their checks up
//! front and leave the image untouched.

use std::path::{Path, PathBuf};

use crate::error::{Basic8Error, Basic8Result};

use super::{
    normalize_8_3, DirEntry, BOOT_SIGNATURE, DATA_START_UNIT, DIR_ENTRIES, DIR_ENTRY_SIZE,
    DIR_OFFSET, DISK_SIZE, FAT_END, FAT_FREE, FAT_OFFSET, FAT_SYSTEM, SECTOR_SIZE, TOTAL_UNITS,
};

/// Default volume label for freshly formatted disks.
const DEFAULT_LABEL: &str = "BASIC8";

/// A mounted virtual floppy.
pub struct DiskImage {
    data: Vec<u8>,
    path: Option<PathBuf>,
}

impl DiskImage {
    /// Open a disk image file, creating and formatting it if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Basic8Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let data = std::fs::read(path)?;
            if data.len() != DISK_SIZE {
                return Err(Basic8Error::InvalidImage(format!(
                    "{}: {} bytes, expected {}",
                    path.display(),
                    data.len(),
                    DISK_SIZE
                )));
            }
            if !data.starts_with(BOOT_SIGNATURE) {
                return Err(Basic8Error::InvalidImage(format!(
                    "{}: missing boot signature",
                    path.display()
                )));
            }
            log::debug!("mounted disk image {}", path.display());
            Ok(Self {
                data,
                path: Some(path.to_path_buf()),
            })
        } else {
            let mut disk = Self {
                data: vec![0; DISK_SIZE],
                path: Some(path.to_path_buf()),
            };
            disk.format(DEFAULT_LABEL)?;
            log::debug!("formatted new disk image {}", path.display());
            Ok(disk)
        }
    }

    /// A formatted image with no backing file (tests, scratch disks).
    pub fn in_memory() -> Self {
        let mut disk = Self {
            data: vec![0; DISK_SIZE],
            path: None,
        };
        disk.format(DEFAULT_LABEL).expect("no backing file to fail");
        disk
    }

    /// Re-initialize to an empty filesystem: boot signature, volume label
    /// in directory slot 0, every data unit free.
    pub fn format(&mut self, label: &str) -> Basic8Result<()> {
        self.data.fill(0);
        self.data[..BOOT_SIGNATURE.len()].copy_from_slice(BOOT_SIGNATURE);

        for unit in 0..TOTAL_UNITS {
            let value = if unit < DATA_START_UNIT {
                FAT_SYSTEM
            } else {
                FAT_FREE
            };
            self.fat_set(unit as u16, value);
        }

        self.write_entry(0, &DirEntry::volume(&normalize_8_3(label, "VOL")));
        self.flush()
    }

    /// Store a file, overwriting any existing file of the same name. Names
    /// without an extension default to `.BAS`.
    pub fn save_file(&mut self, name: &str, data: &[u8]) -> Basic8Result<()> {
        let filename = normalize_8_3(name, "BAS");
        let needed = data.len().div_ceil(SECTOR_SIZE).max(1);

        // All failure checks happen before the image is touched.
        let existing = self.find_entry(&filename);
        let slot = match existing {
            Some(slot) => slot,
            None => self.find_free_slot().ok_or(Basic8Error::DirectoryFull)?,
        };
        let reclaimable = existing
            .map(|slot| self.chain_units(self.read_entry(slot).start_unit()).len())
            .unwrap_or(0);
        let free = self.free_unit_count() + reclaimable;
        if needed > free {
            return Err(Basic8Error::DiskFull { needed, free });
        }

        if let Some(slot) = existing {
            let start = self.read_entry(slot).start_unit();
            self.free_chain(start);
        }

        let units = self.take_free_units(needed);
        debug_assert_eq!(units.len(), needed);
        for (i, &unit) in units.iter().enumerate() {
            let offset = unit as usize * SECTOR_SIZE;
            let chunk_start = i * SECTOR_SIZE;
            let chunk_end = (chunk_start + SECTOR_SIZE).min(data.len());
            let sector = &mut self.data[offset..offset + SECTOR_SIZE];
            sector.fill(0);
            if chunk_start < data.len() {
                sector[..chunk_end - chunk_start].copy_from_slice(&data[chunk_start..chunk_end]);
            }
            let link = units.get(i + 1).copied().unwrap_or(FAT_END);
            self.fat_set(unit, link);
        }

        self.write_entry(slot, &DirEntry::new_file(&filename, units[0], data.len() as u32));
        log::debug!("saved {} ({} bytes, {} units)", filename, data.len(), needed);
        self.flush()
    }

    /// Read a whole file back, following its allocation chain.
    pub fn load_file(&self, name: &str) -> Basic8Result<Vec<u8>> {
        let filename = normalize_8_3(name, "BAS");
        let slot = self
            .find_entry(&filename)
            .ok_or_else(|| Basic8Error::FileNotFound(filename.clone()))?;
        let entry = self.read_entry(slot);

        let mut data = Vec::with_capacity(entry.size() as usize);
        for unit in self.checked_chain(entry.start_unit())? {
            let offset = unit as usize * SECTOR_SIZE;
            data.extend_from_slice(&self.data[offset..offset + SECTOR_SIZE]);
        }
        data.truncate(entry.size() as usize);
        Ok(data)
    }

    /// Delete a file: mark its directory entry and free its chain. The
    /// data sectors keep their bytes but become unreachable.
    pub fn delete_file(&mut self, name: &str) -> Basic8Result<()> {
        let filename = normalize_8_3(name, "BAS");
        let slot = self
            .find_entry(&filename)
            .ok_or_else(|| Basic8Error::FileNotFound(filename.clone()))?;
        let mut entry = self.read_entry(slot);
        entry.mark_deleted();
        self.write_entry(slot, &entry);
        self.free_chain(entry.start_unit());
        log::debug!("deleted {}", filename);
        self.flush()
    }

    /// Whether a live file of this name exists.
    pub fn exists(&self, name: &str) -> bool {
        self.find_entry(&normalize_8_3(name, "BAS")).is_some()
    }

    /// `(filename, size)` for every live file, in directory-slot order.
    pub fn list_files(&self) -> Vec<(String, u32)> {
        (0..DIR_ENTRIES)
            .map(|slot| self.read_entry(slot))
            .filter(DirEntry::is_live_file)
            .map(|entry| (entry.filename(), entry.size()))
            .collect()
    }

    /// Unallocated data capacity in bytes.
    pub fn free_space(&self) -> usize {
        self.free_unit_count() * SECTOR_SIZE
    }

    /// Volume label from directory slot 0, if present.
    pub fn volume_label(&self) -> Option<String> {
        let entry = self.read_entry(0);
        (entry.attributes() & super::ATTR_VOLUME != 0).then(|| entry.name())
    }

    /// Write the image back to its backing file, if it has one.
    pub fn flush(&self) -> Basic8Result<()> {
        if let Some(path) = &self.path {
            std::fs::write(path, &self.data)?;
        }
        Ok(())
    }

    // ==================== directory and FAT access ====================

    fn read_entry(&self, slot: usize) -> DirEntry {
        let offset = DIR_OFFSET + slot * DIR_ENTRY_SIZE;
        DirEntry::from_bytes(&self.data[offset..offset + DIR_ENTRY_SIZE])
    }

    fn write_entry(&mut self, slot: usize, entry: &DirEntry) {
        let offset = DIR_OFFSET + slot * DIR_ENTRY_SIZE;
        self.data[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
    }

    fn find_entry(&self, filename: &str) -> Option<usize> {
        (0..DIR_ENTRIES).find(|&slot| {
            let entry = self.read_entry(slot);
            entry.is_live_file() && entry.filename() == filename
        })
    }

    fn find_free_slot(&self) -> Option<usize> {
        (0..DIR_ENTRIES).find(|&slot| self.read_entry(slot).is_free())
    }

    fn fat_get(&self, unit: u16) -> u16 {
        let offset = FAT_OFFSET + unit as usize * 2;
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    fn fat_set(&mut self, unit: u16, value: u16) {
        let offset = FAT_OFFSET + unit as usize * 2;
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn free_unit_count(&self) -> usize {
        (DATA_START_UNIT..TOTAL_UNITS)
            .filter(|&unit| self.fat_get(unit as u16) == FAT_FREE)
            .count()
    }

    /// Lowest-numbered free data units, already linked into nothing.
    fn take_free_units(&self, count: usize) -> Vec<u16> {
        (DATA_START_UNIT..TOTAL_UNITS)
            .map(|unit| unit as u16)
            .filter(|&unit| self.fat_get(unit) == FAT_FREE)
            .take(count)
            .collect()
    }

    /// Units of a chain, tolerating a broken tail (used when sizing
    /// reclaimable space).
    fn chain_units(&self, start: u16) -> Vec<u16> {
        let mut units = Vec::new();
        let mut unit = start;
        while (DATA_START_UNIT..TOTAL_UNITS).contains(&(unit as usize)) {
            if units.len() > TOTAL_UNITS {
                break;
            }
            units.push(unit);
            match self.fat_get(unit) {
                FAT_END | FAT_FREE => break,
                next => unit = next,
            }
        }
        units
    }

    /// Units of a chain, rejecting corruption: free units mid-chain,
    /// out-of-range links and cycles all fail.
    fn checked_chain(&self, start: u16) -> Basic8Result<Vec<u16>> {
        let mut units = Vec::new();
        let mut unit = start;
        loop {
            if !(DATA_START_UNIT..TOTAL_UNITS).contains(&(unit as usize)) {
                return Err(Basic8Error::InvalidImage(format!(
                    "chain link to unit {unit} outside the data area"
                )));
            }
            if units.len() >= TOTAL_UNITS {
                return Err(Basic8Error::InvalidImage("allocation chain cycle".into()));
            }
            units.push(unit);
            match self.fat_get(unit) {
                FAT_END => return Ok(units),
                FAT_FREE => {
                    return Err(Basic8Error::InvalidImage(format!(
                        "free unit {unit} inside an allocation chain"
                    )))
                }
                next => unit = next,
            }
        }
    }

    /// Walk a chain marking every unit free. Stops quietly at corruption;
    /// freeing is best-effort by design.
    fn free_chain(&mut self, start: u16) {
        let mut unit = start;
        let mut hops = 0;
        while (DATA_START_UNIT..TOTAL_UNITS).contains(&(unit as usize)) && hops <= TOTAL_UNITS {
            let next = self.fat_get(unit);
            self.fat_set(unit, FAT_FREE);
            match next {
                FAT_END | FAT_FREE => break,
                n => unit = n,
            }
            hops += 1;
        }
    }
}
