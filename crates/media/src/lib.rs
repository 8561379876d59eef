//! Archive pipeline: extract a ZIP, convert its HEIC images to PNG, repack,
//! and split oversized output into byte-range parts.

pub mod archive;
pub mod error;
pub mod heic;
pub mod image_ops;
pub mod pipeline;
pub mod split;
pub mod workspace;

pub use {
    error::{Error, Result},
    heic::{DecodedImage, HeicDecoder, PixelMode, default_decoder},
    pipeline::{PipelineError, PipelineOptions, PipelineOutput, Stage, process_archive},
    workspace::RunWorkspace,
};
