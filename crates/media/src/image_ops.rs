//! HEIC to PNG conversion of a flat directory of images.
//!
//! Only the top level of the source directory is scanned. Every file whose
//! name ends in `.heic` (any case) is decoded and written as
//! `<stem>.png`; everything else is skipped. The first failure aborts the
//! batch.

use std::{
    fs,
    path::{Path, PathBuf},
};

use {
    image::ImageFormat,
    tracing::{debug, info},
};

use crate::{
    Error, Result,
    heic::{DecodedImage, HeicDecoder, is_heic_name},
};

/// Extension given to converted images.
pub const PNG_EXTENSION: &str = "png";

/// Outcome of converting one directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    /// Written PNG files, in source file-name order.
    pub converted: Vec<PathBuf>,
    /// Entries that were not HEIC files.
    pub skipped: usize,
}

/// Convert every HEIC file directly inside `src` into a PNG under `dst`.
pub fn convert_heic_dir(
    src: &Path,
    dst: &Path,
    decoder: &dyn HeicDecoder,
) -> Result<ConversionReport> {
    fs::create_dir_all(dst).map_err(|e| Error::io_at("create", dst, e))?;

    let mut entries = fs::read_dir(src)
        .map_err(|e| Error::io_at("read directory", src, e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::io_at("read directory", src, e))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut report = ConversionReport::default();
    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        let is_file = entry
            .file_type()
            .map_err(|e| Error::io_at("stat", &path, e))?
            .is_file();

        if !is_file || !is_heic_name(&name.to_string_lossy()) {
            debug!(path = %path.display(), "skipping non-HEIC entry");
            report.skipped += 1;
            continue;
        }

        let output = dst.join(png_file_name(&path));
        decoder
            .decode(&path)
            .and_then(|decoded| write_png(decoded, &output))
            .map_err(|e| Error::conversion(name.to_string_lossy(), e))?;
        debug!(input = %path.display(), output = %output.display(), "converted image");
        report.converted.push(output);
    }

    info!(
        src = %src.display(),
        converted = report.converted.len(),
        skipped = report.skipped,
        "HEIC conversion finished"
    );
    Ok(report)
}

/// `IMG_0001.HEIC` -> `IMG_0001.png`.
#[must_use]
pub fn png_file_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}.{PNG_EXTENSION}")
}

/// Encode a decoded buffer as PNG at `output`.
pub fn write_png(decoded: DecodedImage, output: &Path) -> Result<()> {
    let image = decoded.into_dynamic_image()?;
    image
        .save_with_format(output, ImageFormat::Png)
        .map_err(|e| Error::external(format!("failed to encode {}", output.display()), e))
}
