//! Shared test utilities for the image-worker test suite.
//!
//! Synthetic images only: every helper builds its pixels from coordinates,
//! so tests never depend on fixture files.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let handle = gradient_handle(640, 480);
//! let out = thumbnail(handle, &Params::default()).unwrap();
//! assert_eq!(out.dimensions(), (150, 150));
//! ```

use crate::imaging::ImageHandle;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;

// =========================================================================
// Pixel buffers
// =========================================================================

fn gradient_pixel(x: u32, y: u32, width: u32, height: u32) -> [u8; 3] {
    [
        (x * 255 / width.max(1)) as u8,
        (y * 255 / height.max(1)) as u8,
        ((x + y) % 256) as u8,
    ]
}

/// Opaque RGB gradient: red follows x, green follows y, blue wraps on x+y.
pub fn gradient_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb(gradient_pixel(x, y, width, height)))
}

/// RGBA gradient whose alpha fades from opaque at the top.
pub fn gradient_rgba(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, b] = gradient_pixel(x, y, width, height);
        let a = 255 - (y * 128 / height.max(1)) as u8;
        Rgba([r, g, b, a])
    })
}

// =========================================================================
// Handles
// =========================================================================

pub fn gradient_handle(width: u32, height: u32) -> ImageHandle {
    ImageHandle::new(DynamicImage::ImageRgb8(gradient_rgb(width, height)))
}

/// Single-color RGB handle.
pub fn solid_handle(width: u32, height: u32, color: [u8; 3]) -> ImageHandle {
    ImageHandle::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
        width,
        height,
        Rgb(color),
    )))
}

// =========================================================================
// Files
// =========================================================================

/// Write a gradient JPEG to `path`, whatever its extension.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    gradient_rgb(width, height)
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
}
