//! Size-bounded splitting of an archive into raw byte-range parts.
//!
//! Parts are plain slices of the original file, not standalone archives:
//! they have to be concatenated in order (see [`join_parts`]) before any
//! zip tool can open the result.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{Error, Result, archive::ZIP_EXTENSION};

/// Default part size threshold, in megabytes.
pub const DEFAULT_MAX_PART_SIZE_MB: u64 = 2000;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Split `path` when it is larger than `max_size_mb` megabytes.
pub fn split_archive(path: &Path, max_size_mb: u64) -> Result<Vec<PathBuf>> {
    let max_bytes = max_size_mb
        .checked_mul(BYTES_PER_MB)
        .ok_or_else(|| Error::invalid_input(format!("part size {max_size_mb} MB is too large")))?;
    split_archive_bytes(path, max_bytes)
}

/// Split `path` into `<base>_part<N>.zip` files of at most `max_bytes` each.
///
/// A file that does not exceed the threshold is returned untouched as the
/// only element. Otherwise the original is removed once all parts exist.
pub fn split_archive_bytes(path: &Path, max_bytes: u64) -> Result<Vec<PathBuf>> {
    if max_bytes == 0 {
        return Err(Error::invalid_input("part size must be greater than zero"));
    }

    let size = fs::metadata(path)
        .map_err(|e| Error::io_at("stat", path, e))?
        .len();
    if size <= max_bytes {
        return Ok(vec![path.to_path_buf()]);
    }

    let part_count = size.div_ceil(max_bytes);
    let mut reader = BufReader::new(File::open(path).map_err(|e| Error::io_at("open", path, e))?);
    let mut parts = Vec::new();

    for number in 1..=part_count {
        let part_path = part_path(path, number);
        let file = File::create(&part_path).map_err(|e| Error::io_at("create", &part_path, e))?;
        let mut writer = BufWriter::new(file);
        let written = io::copy(&mut (&mut reader).take(max_bytes), &mut writer)
            .map_err(|e| Error::io_at("write", &part_path, e))?;
        writer
            .flush()
            .map_err(|e| Error::io_at("write", &part_path, e))?;
        info!(part = %part_path.display(), bytes = written, "wrote archive part");
        parts.push(part_path);
    }

    drop(reader);
    fs::remove_file(path).map_err(|e| Error::io_at("remove", path, e))?;

    warn!(
        archive = %path.display(),
        size,
        parts = parts.len(),
        "archive split into byte-range parts; they must be concatenated before unzipping"
    );
    Ok(parts)
}

/// Concatenate `parts` in order into `dest`, returning the bytes written.
pub fn join_parts(parts: &[PathBuf], dest: &Path) -> Result<u64> {
    if parts.is_empty() {
        return Err(Error::invalid_input("no parts to join"));
    }

    let file = File::create(dest).map_err(|e| Error::io_at("create", dest, e))?;
    let mut writer = BufWriter::new(file);
    let mut total = 0u64;
    for part in parts {
        let mut source = File::open(part).map_err(|e| Error::io_at("open", part, e))?;
        total += io::copy(&mut source, &mut writer).map_err(|e| Error::io_at("read", part, e))?;
    }
    writer.flush().map_err(|e| Error::io_at("write", dest, e))?;

    info!(dest = %dest.display(), parts = parts.len(), bytes = total, "joined archive parts");
    Ok(total)
}

/// `out/converted_images.zip` + 2 -> `out/converted_images_part2.zip`.
fn part_path(path: &Path, number: u64) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = if name.to_ascii_lowercase().ends_with(ZIP_EXTENSION) {
        &name[..name.len() - ZIP_EXTENSION.len()]
    } else {
        name.as_str()
    };
    path.with_file_name(format!("{base}_part{number}{ZIP_EXTENSION}"))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn sample_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn small_file_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converted_images.zip");
        fs::write(&path, sample_bytes(100)).unwrap();

        let parts = split_archive_bytes(&path, 100).unwrap();

        assert_eq!(parts, vec![path.clone()]);
        assert_eq!(fs::read(&path).unwrap(), sample_bytes(100));
    }

    #[test]
    fn default_threshold_keeps_small_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.zip");
        fs::write(&path, sample_bytes(4096)).unwrap();

        let parts = split_archive(&path, DEFAULT_MAX_PART_SIZE_MB).unwrap();

        assert_eq!(parts, vec![path.clone()]);
        assert!(path.exists());
    }

    #[rstest]
    #[case(101, 100, 2)]
    #[case(250, 100, 3)]
    #[case(300, 100, 3)]
    #[case(1000, 7, 143)]
    fn large_file_is_cut_into_ordered_parts(
        #[case] size: usize,
        #[case] max_bytes: u64,
        #[case] expected_parts: usize,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converted_images.zip");
        let original = sample_bytes(size);
        fs::write(&path, &original).unwrap();

        let parts = split_archive_bytes(&path, max_bytes).unwrap();

        assert_eq!(parts.len(), expected_parts);
        assert!(!path.exists(), "original should be removed");
        assert_eq!(
            parts[0],
            dir.path().join("converted_images_part1.zip"),
            "parts are 1-indexed"
        );
        let mut rebuilt = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            let bytes = fs::read(part).unwrap();
            if i + 1 < parts.len() {
                assert_eq!(bytes.len() as u64, max_bytes);
            }
            rebuilt.extend(bytes);
        }
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn join_parts_restores_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.zip");
        let original = sample_bytes(1234);
        fs::write(&path, &original).unwrap();
        let parts = split_archive_bytes(&path, 500).unwrap();

        let joined = dir.path().join("joined.zip");
        let written = join_parts(&parts, &joined).unwrap();

        assert_eq!(written, 1234);
        assert_eq!(fs::read(&joined).unwrap(), original);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        fs::write(&path, b"abc").unwrap();
        assert!(matches!(
            split_archive_bytes(&path, 0),
            Err(Error::InvalidInput { .. })
        ));
        assert!(path.exists());
    }

    #[test]
    fn part_names_strip_zip_extension() {
        assert_eq!(
            part_path(Path::new("/tmp/out/converted_images.zip"), 3),
            PathBuf::from("/tmp/out/converted_images_part3.zip")
        );
        assert_eq!(
            part_path(Path::new("/tmp/out/blob"), 1),
            PathBuf::from("/tmp/out/blob_part1.zip")
        );
    }
}
