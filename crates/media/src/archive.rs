//! ZIP extraction and packing.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use {
    tracing::{debug, info},
    walkdir::WalkDir,
    zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions},
};

use crate::{Error, Result};

/// Extension of accepted and produced containers.
pub const ZIP_EXTENSION: &str = ".zip";

/// Case-insensitive check for the ZIP extension.
#[must_use]
pub fn is_archive_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(ZIP_EXTENSION)
}

/// Unpack `archive` into `dest`, creating it if needed.
///
/// Entries whose names would escape `dest` are rejected by the zip reader.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| Error::io_at("open", archive, e))?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|e| {
        Error::external(format!("failed to read zip archive {}", archive.display()), e)
    })?;
    fs::create_dir_all(dest).map_err(|e| Error::io_at("create", dest, e))?;

    let entries = zip.len();
    zip.extract(dest)
        .map_err(|e| Error::external(format!("failed to extract {}", archive.display()), e))?;

    info!(
        archive = %archive.display(),
        dest = %dest.display(),
        entries,
        "archive extracted"
    );
    Ok(())
}

/// Pack the full contents of `dir` into `<base>.zip` and return its path.
pub fn build_archive(dir: &Path, base: &Path) -> Result<PathBuf> {
    let mut zip_path = base.as_os_str().to_owned();
    zip_path.push(ZIP_EXTENSION);
    let zip_path = PathBuf::from(zip_path);

    let file = File::create(&zip_path).map_err(|e| Error::io_at("create", &zip_path, e))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut files = 0usize;
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry =
            entry.map_err(|e| Error::external(format!("failed to walk {}", dir.display()), e))?;
        let name = entry_name(dir, entry.path())?;

        if entry.file_type().is_dir() {
            writer
                .add_directory(name, options)
                .map_err(|e| Error::external("failed to add directory entry", e))?;
            continue;
        }

        writer
            .start_file(name.clone(), options)
            .map_err(|e| Error::external(format!("failed to add {name}"), e))?;
        let mut source =
            File::open(entry.path()).map_err(|e| Error::io_at("open", entry.path(), e))?;
        io::copy(&mut source, &mut writer)
            .map_err(|e| Error::io(format!("failed to write {name}"), e))?;
        debug!(entry = %name, "added file to archive");
        files += 1;
    }

    writer
        .finish()
        .map_err(|e| Error::external(format!("failed to finish {}", zip_path.display()), e))?;

    info!(archive = %zip_path.display(), files, "archive built");
    Ok(zip_path)
}

/// Archive entry name for `path` relative to `root`, always `/`-separated.
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::invalid_input(format!(
            "{} is not inside {}",
            path.display(),
            root.display()
        ))
    })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Read};

    fn entry_names(zip_path: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
        let mut names: Vec<_> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn build_then_extract_restores_tree() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.png"), b"first").unwrap();
        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub").join("b.png"), b"second").unwrap();

        let out = tempfile::tempdir().unwrap();
        let zip_path = build_archive(src.path(), &out.path().join("converted_images")).unwrap();
        assert_eq!(zip_path, out.path().join("converted_images.zip"));
        assert_eq!(entry_names(&zip_path), vec!["a.png", "sub/", "sub/b.png"]);

        let dest = out.path().join("extracted");
        extract_archive(&zip_path, &dest).unwrap();
        assert_eq!(fs::read(dest.join("a.png")).unwrap(), b"first");
        assert_eq!(fs::read(dest.join("sub").join("b.png")).unwrap(), b"second");
    }

    #[test]
    fn entries_are_deflated() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("zeros.bin"), vec![0u8; 64 * 1024]).unwrap();
        let out = tempfile::tempdir().unwrap();

        let zip_path = build_archive(src.path(), &out.path().join("z")).unwrap();

        let mut zip = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut entry = zip.by_name("zeros.bin").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();
        assert_eq!(body.len(), 64 * 1024);
    }

    #[test]
    fn empty_directory_builds_empty_archive() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let zip_path = build_archive(src.path(), &out.path().join("empty")).unwrap();
        assert!(entry_names(&zip_path).is_empty());
    }

    #[test]
    fn extract_rejects_non_zip() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.zip");
        fs::write(&bogus, b"definitely not a zip").unwrap();

        let err = extract_archive(&bogus, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::External { .. }), "{err}");
    }

    #[test]
    fn archive_name_matching() {
        assert!(is_archive_name("photos.zip"));
        assert!(is_archive_name("PHOTOS.ZIP"));
        assert!(!is_archive_name("photos.zip.txt"));
        assert!(!is_archive_name("photos.rar"));
    }
}
