//! The archive conversion pipeline: extract, convert, repack, split.
//!
//! Each stage reports its own failure so callers can decide what to tell
//! the user and whether to continue.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    Error, archive,
    heic::HeicDecoder,
    image_ops,
    split::{self, DEFAULT_MAX_PART_SIZE_MB},
    workspace::RunWorkspace,
};

/// Base name of the archive sent back to users.
pub const DEFAULT_ARCHIVE_NAME: &str = "converted_images";

/// Pipeline stage, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Convert,
    Archive,
    Split,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extract => "extract",
            Self::Convert => "convert",
            Self::Archive => "archive",
            Self::Split => "split",
        };
        f.write_str(name)
    }
}

/// A stage failure together with its cause.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl PipelineError {
    fn at(stage: Stage) -> impl FnOnce(Error) -> Self {
        move |source| Self { stage, source }
    }

    /// Whether the failure was caused by the uploaded content rather than
    /// by the host.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self.stage, Stage::Extract | Stage::Convert)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Output archive base name, without `.zip`.
    pub archive_name: String,
    /// Split threshold in megabytes.
    pub max_part_size_mb: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            archive_name: DEFAULT_ARCHIVE_NAME.into(),
            max_part_size_mb: DEFAULT_MAX_PART_SIZE_MB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    /// Files to deliver, in order. Empty when nothing was converted.
    pub parts: Vec<PathBuf>,
    pub converted: usize,
    pub skipped: usize,
    /// True when `parts` are byte ranges of one archive.
    pub split: bool,
}

/// Run every stage on `input`, keeping all intermediate files in `workspace`.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn process_archive(
    input: &Path,
    workspace: &RunWorkspace,
    decoder: &dyn HeicDecoder,
    options: &PipelineOptions,
) -> Result<PipelineOutput, PipelineError> {
    let run_id = workspace.id();
    let extract_dir = workspace.extract_dir();
    let converted_dir = workspace.converted_dir();

    archive::extract_archive(input, &extract_dir).map_err(PipelineError::at(Stage::Extract))?;

    let report = image_ops::convert_heic_dir(&extract_dir, &converted_dir, decoder)
        .map_err(PipelineError::at(Stage::Convert))?;
    if report.converted.is_empty() {
        warn!(%run_id, skipped = report.skipped, "no HEIC images found in archive");
        return Ok(PipelineOutput {
            parts: Vec::new(),
            converted: 0,
            skipped: report.skipped,
            split: false,
        });
    }

    let base = workspace.output_base(&options.archive_name);
    let output = archive::build_archive(&converted_dir, &base)
        .map_err(PipelineError::at(Stage::Archive))?;

    let parts = split::split_archive(&output, options.max_part_size_mb)
        .map_err(PipelineError::at(Stage::Split))?;
    let split = parts.len() > 1;

    info!(
        %run_id,
        converted = report.converted.len(),
        skipped = report.skipped,
        parts = parts.len(),
        split,
        "pipeline finished"
    );
    Ok(PipelineOutput {
        parts,
        converted: report.converted.len(),
        skipped: report.skipped,
        split,
    })
}
