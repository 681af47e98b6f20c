//! Pure Rust codec backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` + `ImageDecoder::icc_profile` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality-aware) |
//! | Encode → PNG / TIFF | `PngEncoder` / `TiffEncoder` |
//! | Encode → WebP | `WebPEncoder::new_lossless` (the crate has no lossy WebP) |
//! | Encode → AVIF | `AvifEncoder` (rav1e, speed 6) |

use super::backend::{ImageBackend, ImagingError};
use super::handle::ImageHandle;
use super::params::{EncodeOptions, OutputFormat, Quality};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ColorType, DynamicImage, ImageDecoder, ImageEncoder, ImageReader};
use std::borrow::Cow;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Codec backend using the `image` crate ecosystem.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(path: &Path, e: impl std::fmt::Display) -> ImagingError {
    ImagingError::Decode {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn encode_error(path: &Path, e: impl std::fmt::Display) -> ImagingError {
    ImagingError::Encode {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// Decode an image from disk, sniffing the format from content.
fn load_image(path: &Path) -> Result<ImageHandle, ImagingError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format().and_then(OutputFormat::from_image_format);
    let mut decoder = reader.into_decoder().map_err(|e| decode_error(path, e))?;
    let icc_profile = decoder.icc_profile().unwrap_or_else(|e| {
        log::debug!("ignoring unreadable ICC profile in {}: {e}", path.display());
        None
    });
    let image = DynamicImage::from_decoder(decoder).map_err(|e| decode_error(path, e))?;

    Ok(ImageHandle::new(image)
        .with_source_format(format)
        .with_icc_profile(icc_profile))
}

/// Convert pixels into a layout the target encoder accepts.
fn encodable(image: &DynamicImage, format: OutputFormat) -> Cow<'_, DynamicImage> {
    let color = image.color();
    match format {
        OutputFormat::Jpeg => match color {
            ColorType::L8 | ColorType::Rgb8 => Cow::Borrowed(image),
            ColorType::L16 | ColorType::La8 | ColorType::La16 => {
                Cow::Owned(DynamicImage::ImageLuma8(image.to_luma8()))
            }
            _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        },
        OutputFormat::WebP | OutputFormat::Avif => match color {
            ColorType::Rgb8 | ColorType::Rgba8 => Cow::Borrowed(image),
            _ if color.has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
            _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        },
        OutputFormat::Png | OutputFormat::Tiff => match color {
            ColorType::Rgb32F | ColorType::Rgba32F => {
                Cow::Owned(DynamicImage::ImageRgba16(image.to_rgba16()))
            }
            _ => Cow::Borrowed(image),
        },
    }
}

fn write_with(
    mut encoder: impl ImageEncoder,
    handle: &ImageHandle,
    image: &DynamicImage,
    path: &Path,
) -> Result<(), ImagingError> {
    if let Some(profile) = handle.icc_profile() {
        if encoder.set_icc_profile(profile.to_vec()).is_err() {
            log::debug!("encoder for {} cannot embed ICC profile", path.display());
        }
    }
    image
        .write_with_encoder(encoder)
        .map_err(|e| encode_error(path, e))
}

impl ImageBackend for RustBackend {
    fn open(&self, path: &Path) -> Result<ImageHandle, ImagingError> {
        load_image(path)
    }

    fn save(
        &self,
        handle: &ImageHandle,
        path: &Path,
        options: &EncodeOptions,
    ) -> Result<(), ImagingError> {
        let image = encodable(handle.image(), options.format);
        let writer = BufWriter::new(File::create(path)?);

        match options.format {
            OutputFormat::Jpeg => {
                let encoder = match options.quality {
                    Some(q) => JpegEncoder::new_with_quality(writer, q.value() as u8),
                    None => JpegEncoder::new(writer),
                };
                write_with(encoder, handle, &image, path)
            }
            OutputFormat::Png => write_with(PngEncoder::new(writer), handle, &image, path),
            OutputFormat::WebP => {
                write_with(WebPEncoder::new_lossless(writer), handle, &image, path)
            }
            OutputFormat::Tiff => write_with(TiffEncoder::new(writer), handle, &image, path),
            OutputFormat::Avif => {
                let quality = options.quality.unwrap_or_default().value() as u8;
                let encoder = AvifEncoder::new_with_speed_quality(writer, 6, quality);
                write_with(encoder, handle, &image, path)
            }
        }
    }
}
