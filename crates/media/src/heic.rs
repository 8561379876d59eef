//! HEIC decoding behind a small trait so the converter can be driven by any
//! decoder (libheif in production, synthetic decoders in tests).

use std::{path::Path, sync::Arc};

use image::{DynamicImage, RgbImage, RgbaImage};

use crate::{Error, Result};

/// File extension recognised as HEIC, compared case-insensitively.
pub const HEIC_EXTENSION: &str = ".heic";

/// Pixel layout of a decoded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelMode {
    Rgb8,
    Rgba8,
}

impl PixelMode {
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// Tightly packed, interleaved pixels of the primary image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub mode: PixelMode,
    pub data: Vec<u8>,
}

impl DecodedImage {
    /// Build an `image` buffer from the raw pixels.
    pub fn into_dynamic_image(self) -> Result<DynamicImage> {
        let Self {
            width,
            height,
            mode,
            data,
        } = self;
        let expected = width as usize * height as usize * mode.channels();
        if data.len() != expected {
            return Err(Error::invalid_input(format!(
                "pixel buffer holds {} bytes, expected {expected} for {width}x{height} {mode:?}",
                data.len()
            )));
        }

        let image = match mode {
            PixelMode::Rgb8 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
            PixelMode::Rgba8 => {
                RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8)
            },
        };
        image.ok_or_else(|| Error::invalid_input("pixel buffer does not match image dimensions"))
    }
}

/// Decodes the primary image of a HEIC file.
pub trait HeicDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedImage>;
}

/// Case-insensitive check for the HEIC extension.
#[must_use]
pub fn is_heic_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(HEIC_EXTENSION)
}

/// The decoder this build ships with.
#[must_use]
pub fn default_decoder() -> Arc<dyn HeicDecoder> {
    #[cfg(feature = "libheif")]
    {
        Arc::new(LibheifDecoder::new())
    }
    #[cfg(not(feature = "libheif"))]
    {
        Arc::new(UnsupportedDecoder)
    }
}

/// Placeholder used when the crate is built without the `libheif` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedDecoder;

impl HeicDecoder for UnsupportedDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        Err(Error::invalid_input(format!(
            "cannot decode {}: built without libheif support",
            path.display()
        )))
    }
}

#[cfg(feature = "libheif")]
pub use libheif::LibheifDecoder;

#[cfg(feature = "libheif")]
mod libheif {
    use std::path::Path;

    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    use super::{DecodedImage, HeicDecoder, PixelMode};
    use crate::{Error, Result};

    /// Decoder backed by the system libheif.
    pub struct LibheifDecoder {
        lib: LibHeif,
    }

    impl LibheifDecoder {
        #[must_use]
        pub fn new() -> Self {
            Self { lib: LibHeif::new() }
        }
    }

    impl Default for LibheifDecoder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HeicDecoder for LibheifDecoder {
        fn decode(&self, path: &Path) -> Result<DecodedImage> {
            let path_str = path.to_str().ok_or_else(|| {
                Error::invalid_input(format!("non UTF-8 path: {}", path.display()))
            })?;
            let ctx = HeifContext::read_from_file(path_str)
                .map_err(|e| Error::external(format!("failed to read {}", path.display()), e))?;
            let handle = ctx.primary_image_handle().map_err(|e| {
                Error::external(format!("no primary image in {}", path.display()), e)
            })?;

            let (chroma, mode) = if handle.has_alpha_channel() {
                (RgbChroma::Rgba, PixelMode::Rgba8)
            } else {
                (RgbChroma::Rgb, PixelMode::Rgb8)
            };
            let image = self
                .lib
                .decode(&handle, ColorSpace::Rgb(chroma), None)
                .map_err(|e| Error::external(format!("failed to decode {}", path.display()), e))?;

            let planes = image.planes();
            let plane = planes.interleaved.ok_or_else(|| {
                Error::invalid_input(format!(
                    "{} decoded without an interleaved plane",
                    path.display()
                ))
            })?;

            // Rows may carry stride padding; copy only the visible pixels.
            let row_len = plane.width as usize * mode.channels();
            let mut data = Vec::with_capacity(row_len * plane.height as usize);
            for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
                data.extend_from_slice(&row[..row_len]);
            }

            Ok(DecodedImage {
                width: plane.width,
                height: plane.height,
                mode,
                data,
            })
        }
    }
}
