//! Zip bundling of finished demos.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::DemoError;

/// Demo archives use this extension.
pub const ARCHIVE_EXTENSION: &str = "ecd";

/// Bundles `dir` (recursively) into a zip at `archive_path`, with the
/// directory's own name as the single top-level entry.
pub fn pack_archive(dir: &Path, archive_path: &Path) -> Result<(), DemoError> {
    let file = File::create(archive_path).map_err(|e| DemoError::io(archive_path, e))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let top = dir
        .file_name()
        .ok_or_else(|| DemoError::Malformed(String::from("demo directory has no name")))?
        .to_string_lossy()
        .into_owned();

    add_dir(&mut writer, dir, &top, options)?;
    writer.finish()?;

    Ok(())
}

fn add_dir(
    writer: &mut ZipWriter<File>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<(), DemoError> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| DemoError::io(dir, e))?
        .collect::<Result<_, _>>()
        .map_err(|e| DemoError::io(dir, e))?;

    // Stable archive layout regardless of directory iteration order.
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let name = format!("{prefix}/{}", entry.file_name().to_string_lossy());

        if path.is_dir() {
            writer.add_directory(name.as_str(), options)?;
            add_dir(writer, &path, &name, options)?;
        } else {
            writer.start_file(name.as_str(), options)?;
            let mut file = File::open(&path).map_err(|e| DemoError::io(&path, e))?;
            let mut buf = vec![];
            file.read_to_end(&mut buf).map_err(|e| DemoError::io(&path, e))?;
            writer.write_all(&buf).map_err(|e| DemoError::io(&path, e))?;
        }
    }

    Ok(())
}

/// Extracts an archive into `dest` and returns the top-level directory.
pub fn unpack_archive(archive_path: &Path, dest: &Path) -> Result<PathBuf, DemoError> {
    let file = File::open(archive_path).map_err(|e| DemoError::io(archive_path, e))?;
    let mut archive = ZipArchive::new(file)?;

    archive.extract(dest)?;

    let top = archive
        .file_names()
        .filter_map(|name| name.split('/').next())
        .next()
        .ok_or_else(|| DemoError::Malformed(String::from("empty demo archive")))?
        .to_owned();

    Ok(dest.join(top))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_and_unpack_round_trip() {
        let staging = tempfile::tempdir().unwrap();
        let root = staging.path().join("2026-08-01_120000");
        std::fs::create_dir_all(root.join("0")).unwrap();
        std::fs::write(root.join("info.json"), b"{}").unwrap();
        std::fs::write(root.join("0/demodata.bin"), b"stream").unwrap();

        let archive = staging.path().join("demo.ecd");
        pack_archive(&root, &archive).unwrap();

        let out = tempfile::tempdir().unwrap();
        let unpacked = unpack_archive(&archive, out.path()).unwrap();

        assert!(unpacked.ends_with("2026-08-01_120000"));
        assert_eq!(
            std::fs::read(unpacked.join("0/demodata.bin")).unwrap(),
            b"stream"
        );
    }
}
