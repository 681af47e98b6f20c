//! Image I/O backend trait and shared error type.
//!
//! The [`ImageBackend`] trait covers the two operations the pipeline needs
//! from an image codec layer: decode a file into an [`ImageHandle`] and
//! encode a handle to a file. Everything between those two points is pure
//! pixel work in [`transforms`](super::transforms) and
//! [`tiling`](super::tiling).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the
//! `MockBackend` below, which serves in-memory images and records writes.

use super::handle::ImageHandle;
use super::params::EncodeOptions;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },
    #[error("Failed to encode {path}: {message}")]
    Encode { path: String, message: String },
}

/// Trait for image codec backends.
pub trait ImageBackend: Sync {
    /// Decode an image file, keeping its embedded ICC profile if any.
    fn open(&self, path: &Path) -> Result<ImageHandle, ImagingError>;

    /// Encode `handle` to `path` using the requested format and quality.
    fn save(
        &self,
        handle: &ImageHandle,
        path: &Path,
        options: &EncodeOptions,
    ) -> Result<(), ImagingError>;
}
