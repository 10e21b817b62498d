//! Program bundle loading from ZIP files.
//!
//! A bundle is a ZIP archive of BASIC programs and text files with an
//! optional `manifest.mf` JSON document describing it. Bundles exist to
//! seed a freshly formatted floppy: the CLI's `--import` flag installs a
//! bundle's files onto the mounted disk image.

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use serde::{Deserialize, Serialize};
use zip::ZipArchive;

use crate::disk::{normalize_8_3, DiskImage};
use crate::error::Basic8Result;

/// File entry in a bundle manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub src: String,
    /// Name to install under, when different from `src`.
    #[serde(default)]
    pub dst: Option<String>,
}

/// Bundle manifest schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

/// A bundle read into memory, filenames already in 8.3 form.
#[derive(Debug, Clone)]
pub struct LoadedBundle {
    pub manifest: BundleManifest,
    pub files: BTreeMap<String, Vec<u8>>,
}

/// Read a bundle from ZIP data. Files keep their basename, normalized to
/// 8.3; a `manifest.mf` is parsed if present, otherwise a manifest listing
/// every file is synthesized.
pub fn load_bundle<R: Read + Seek>(reader: R) -> Basic8Result<LoadedBundle> {
    let mut archive = ZipArchive::new(reader)?;
    let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut manifest: Option<BundleManifest> = None;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;

        let upper = name.to_uppercase();
        if upper == "MANIFEST.MF" || upper.ends_with("/MANIFEST.MF") {
            manifest = Some(serde_json::from_slice(&content)?);
        } else {
            // Nested paths flatten to their basename.
            let basename = name.rsplit('/').next().unwrap_or(&name);
            files.insert(normalize_8_3(basename, ""), content);
        }
    }

    let manifest = manifest.unwrap_or_else(|| BundleManifest {
        id: None,
        name: "Unnamed bundle".to_string(),
        version: None,
        description: None,
        files: files
            .keys()
            .map(|name| FileEntry {
                src: name.clone(),
                dst: None,
            })
            .collect(),
    });

    Ok(LoadedBundle { manifest, files })
}

/// Read a bundle from a file path.
pub fn load_bundle_from_path(path: &std::path::Path) -> Basic8Result<LoadedBundle> {
    let file = std::fs::File::open(path)?;
    load_bundle(std::io::BufReader::new(file))
}

/// Install a bundle's files onto a disk image, honoring manifest renames.
/// Returns the number of files written.
pub fn install_bundle(bundle: &LoadedBundle, disk: &mut DiskImage) -> Basic8Result<usize> {
    let mut installed = 0;
    for entry in &bundle.manifest.files {
        let src = normalize_8_3(&entry.src, "");
        if let Some(data) = bundle.files.get(&src) {
            let dst = entry.dst.as_deref().unwrap_or(&entry.src);
            disk.save_file(dst, data)?;
            installed += 1;
        } else {
            log::warn!("bundle {} names a missing file: {}", bundle.manifest.name, entry.src);
        }
    }
    log::debug!("installed {} files from bundle {}", installed, bundle.manifest.name);
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn build_test_zip(with_manifest: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut zip = zip::ZipWriter::new(cursor);

            if with_manifest {
                let manifest = r#"{
                    "id": "games",
                    "name": "Game Pack",
                    "version": "1.0",
                    "files": [
                        { "src": "GUESS.BAS" },
                        { "src": "NOTES.TXT", "dst": "README.TXT" }
                    ]
                }"#;
                zip.start_file::<_, ()>("manifest.mf", Default::default())
                    .unwrap();
                zip.write_all(manifest.as_bytes()).unwrap();
            }

            zip.start_file::<_, ()>("GUESS.BAS", Default::default())
                .unwrap();
            zip.write_all(b"10 A% = 7\n").unwrap();

            zip.start_file::<_, ()>("docs/NOTES.TXT", Default::default())
                .unwrap();
            zip.write_all(b"notes").unwrap();

            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn load_bundle_with_manifest() {
        let bundle = load_bundle(Cursor::new(build_test_zip(true))).unwrap();
        assert_eq!(bundle.manifest.name, "Game Pack");
        assert_eq!(bundle.manifest.id.as_deref(), Some("games"));
        assert_eq!(bundle.files.len(), 2);
        assert!(bundle.files.contains_key("GUESS.BAS"));
        assert!(bundle.files.contains_key("NOTES.TXT")); // flattened path
    }

    #[test]
    fn missing_manifest_is_synthesized() {
        let bundle = load_bundle(Cursor::new(build_test_zip(false))).unwrap();
        assert_eq!(bundle.manifest.name, "Unnamed bundle");
        assert_eq!(bundle.manifest.files.len(), 2);
    }

    #[test]
    fn install_honors_renames() {
        let bundle = load_bundle(Cursor::new(build_test_zip(true))).unwrap();
        let mut disk = DiskImage::in_memory();
        let installed = install_bundle(&bundle, &mut disk).unwrap();
        assert_eq!(installed, 2);
        assert!(disk.exists("GUESS.BAS"));
        assert!(disk.exists("README.TXT"));
        assert!(!disk.exists("NOTES.TXT"));
        assert_eq!(disk.load_file("GUESS.BAS").unwrap(), b"10 A% = 7\n");
    }
}
