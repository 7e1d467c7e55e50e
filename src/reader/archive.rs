//! Zip archive handling.
//!
//! Archives are unpacked into a scratch directory before reading; entries
//! whose names escape the target directory are skipped.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result};

const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];

/// Whether `path` is a file starting with the zip local header signature.
pub fn is_zip(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|_| magic == ZIP_MAGIC)
        .unwrap_or(false)
}

/// Extract `archive` into `target` and return the data root: `target`
/// itself, or its only subdirectory when the archive wraps everything in
/// one folder.
pub fn extract_zip(archive: &Path, target: &Path) -> Result<PathBuf> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| match e {
        zip::result::ZipError::Io(io) => Error::Io(io),
        other => Error::CorruptArchive(format!("{}: {other}", archive.display())),
    })?;

    fs::create_dir_all(target)?;
    let mut extracted = 0usize;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(entry = entry.name(), "skipping zip entry outside the archive root");
            continue;
        };
        let out = target.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = File::create(&out)?;
        io::copy(&mut entry, &mut writer)?;
        extracted += 1;
    }
    debug!(archive = %archive.display(), files = extracted, "extracted zip archive");

    data_root(target)
}

/// Descend through a single wrapping directory, ignoring hidden entries
/// such as `__MACOSX`.
fn data_root(dir: &Path) -> Result<PathBuf> {
    let mut visible = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name.starts_with("__") {
            continue;
        }
        visible.push(entry.path());
    }
    match visible.as_slice() {
        [only] if only.is_dir() => Ok(only.clone()),
        _ => Ok(dir.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_unwraps_single_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("dataset.zip");
        write_zip(&archive, &[("dwca/taxon.txt", "taxonID\n1\n"), ("dwca/meta.xml", "<archive/>")]);
        assert!(is_zip(&archive));

        let root = extract_zip(&archive, &tmp.path().join("out")).unwrap();
        assert!(root.ends_with("dwca"));
        assert!(root.join("taxon.txt").is_file());
    }

    #[test]
    fn test_flat_archive_root() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("flat.zip");
        write_zip(&archive, &[("NameUsage.tsv", "ID\tscientificName\n"), ("metadata.yaml", "title: x\n")]);
        let target = tmp.path().join("out");
        assert_eq!(extract_zip(&archive, &target).unwrap(), target);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("broken.zip");
        std::fs::write(&archive, b"PK\x03\x04 definitely not a zip").unwrap();
        let err = extract_zip(&archive, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
    }
}
