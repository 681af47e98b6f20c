//! Image processing in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode / encode** | `image` codecs (JPEG, PNG, TIFF, WebP; AVIF encode) |
//! | **Resize, cover-crop** | `resize_exact` (Lanczos3) + `imageops::overlay` |
//! | **Edges, blur** | `filter3x3`, `imageproc::gradients`, `imageproc::filter` |
//! | **Tone curves** | 8-bit lookup tables from [`calculations`] |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for geometry and tone math (unit testable)
//! - **Parameters**: Operation parameters and encode options
//! - **Handle**: [`ImageHandle`], the owned value every transform consumes
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Transforms / Registry**: the named catalog and its dispatch table
//! - **Tiling**: grid split and merge

pub mod backend;
mod calculations;
pub mod handle;
pub mod params;
pub mod registry;
pub mod rust_backend;
pub mod tiling;
pub mod transforms;

pub use backend::{ImageBackend, ImagingError};
pub use calculations::TileGeometry;
pub use handle::ImageHandle;
pub use params::{Background, EncodeOptions, OutputFormat, Params, Quality};
pub use registry::TransformRegistry;
pub use rust_backend::RustBackend;
pub use tiling::{TileGrid, TileOutput, merge, tile, tile_filename, write_tiles};
pub use transforms::{TransformError, TransformFn};
