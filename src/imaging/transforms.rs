//! The catalog of named image transforms.
//!
//! Every transform has the same shape, [`TransformFn`]: it consumes an
//! [`ImageHandle`], reads whatever it needs from the operation's full
//! [`Params`], and returns a new handle. Defaults are resolved here, at call
//! time, so `resize` and `original` see the dimensions of the handle they
//! were given rather than anything fixed in configuration.
//!
//! | Name | Defaults | Geometry |
//! |---|---|---|
//! | `original` | — | unchanged |
//! | `resize` | current width × height | exactly `width × height` |
//! | `thumbnail` | 150 × 150, `#232323` | exactly `width × height` |
//! | `sketch` | — | unchanged, grayscale |
//! | `offerize` | 115/175/100, γ 1.125, 350 × 350, `#232323` | exactly `width × height` |
//! | `normalize` | — | unchanged |
//! | `charcoal` | — | unchanged, grayscale |
//! | `level` | none: all three points required | unchanged |

use super::calculations::{
    Modulation, calculate_cover_dimensions, calculate_stretch_bounds, center_offset, gamma_lut,
    level_lut, stretch_lut,
};
use super::handle::ImageHandle;
use super::params::{Background, Params};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbaImage};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),
    #[error("Operation '{operation}' requires parameter '{parameter}'")]
    MissingParameter {
        operation: &'static str,
        parameter: &'static str,
    },
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },
    #[error("Invalid tile grid {columns}x{rows} for a {width}x{height} image")]
    InvalidGridDimensions {
        columns: i64,
        rows: i64,
        width: u32,
        height: u32,
    },
    #[error("Tile grid incomplete: no tile at column {column}, row {row}")]
    IncompleteGrid { column: u32, row: u32 },
}

/// Signature shared by every catalog entry.
pub type TransformFn = fn(ImageHandle, &Params) -> Result<ImageHandle, TransformError>;

/// Largest edge any transform will produce.
const MAX_DIMENSION: f64 = 65_535.0;
/// Largest image area any transform will allocate (1 GiB as RGBA8).
const MAX_PIXELS: u64 = 1 << 28;

/// Strength of the `charcoal` stylization.
const CHARCOAL_STRENGTH: f32 = 1.0;
/// Blur applied as the last step of `sketch`.
const SKETCH_BLUR_SIGMA: f32 = 0.5;

const THUMBNAIL_SIZE: u32 = 150;
const OFFERIZE_SIZE: u32 = 350;

fn invalid(parameter: &'static str, reason: impl Into<String>) -> TransformError {
    TransformError::InvalidParameter {
        parameter,
        reason: reason.into(),
    }
}

/// Resolve a pixel dimension, falling back to `default` when absent.
fn dimension(value: Option<f64>, default: u32, parameter: &'static str) -> Result<u32, TransformError> {
    let Some(v) = value else {
        return Ok(default);
    };
    if !v.is_finite() || v < 1.0 || v > MAX_DIMENSION {
        return Err(invalid(parameter, format!("{v} is not a pixel size in 1..=65535")));
    }
    Ok(v.round() as u32)
}

/// Reject a `width × height` allocation above [`MAX_PIXELS`].
fn within_budget(width: u32, height: u32, parameter: &'static str) -> Result<(u32, u32), TransformError> {
    if width as u64 * height as u64 > MAX_PIXELS {
        return Err(invalid(
            parameter,
            format!("{width}x{height} exceeds the {MAX_PIXELS}-pixel limit"),
        ));
    }
    Ok((width, height))
}

/// Target box plus the intermediate cover size, both within budget.
fn cover_plan(source: (u32, u32), width: u32, height: u32) -> Result<CoverPlan, TransformError> {
    let target = within_budget(width, height, "width")?;
    let cover = calculate_cover_dimensions(source, target);
    let parameter = if cover.0 > target.0 { "width" } else { "height" };
    let cover = within_budget(cover.0, cover.1, parameter)?;
    Ok(CoverPlan { target, cover })
}

#[derive(Debug, Clone, Copy)]
struct CoverPlan {
    target: (u32, u32),
    cover: (u32, u32),
}

fn required(
    value: Option<f64>,
    operation: &'static str,
    parameter: &'static str,
) -> Result<f64, TransformError> {
    let v = value.ok_or(TransformError::MissingParameter {
        operation,
        parameter,
    })?;
    if !v.is_finite() {
        return Err(invalid(parameter, format!("{v} is not a finite number")));
    }
    Ok(v)
}

fn positive_gamma(gamma: f64) -> Result<f64, TransformError> {
    if gamma.is_finite() && gamma > 0.0 {
        Ok(gamma)
    } else {
        Err(invalid("gamma", format!("{gamma} must be greater than zero")))
    }
}

fn non_negative(value: f64, parameter: &'static str) -> Result<f64, TransformError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(invalid(parameter, format!("{value} must not be negative")))
    }
}

fn background(params: &Params) -> Result<Background, TransformError> {
    match &params.background_color {
        None => Ok(Background::DEFAULT),
        Some(color) => color.parse().map_err(|e: String| invalid("background_color", e)),
    }
}

// ============================================================================
// Pixel helpers
// ============================================================================

/// Map every color sample (alpha excluded) through `lut`.
fn apply_lut(image: DynamicImage, lut: &[u8; 256]) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(mut gray) => {
            gray.pixels_mut().for_each(|p| p.0[0] = lut[p.0[0] as usize]);
            DynamicImage::ImageLuma8(gray)
        }
        DynamicImage::ImageRgb8(mut rgb) => {
            for c in rgb.iter_mut() {
                *c = lut[*c as usize];
            }
            DynamicImage::ImageRgb8(rgb)
        }
        other => {
            let had_alpha = other.color().has_alpha();
            let mut rgba = other.to_rgba8();
            for p in rgba.pixels_mut() {
                for c in &mut p.0[..3] {
                    *c = lut[*c as usize];
                }
            }
            opaque_unless(rgba, had_alpha)
        }
    }
}

fn opaque_unless(rgba: RgbaImage, keep_alpha: bool) -> DynamicImage {
    let image = DynamicImage::ImageRgba8(rgba);
    if keep_alpha {
        image
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}

/// Histogram over all color samples, channels linked.
fn sample_histogram(image: &DynamicImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    match image {
        DynamicImage::ImageLuma8(gray) => gray.iter().for_each(|&c| hist[c as usize] += 1),
        DynamicImage::ImageRgb8(rgb) => rgb.iter().for_each(|&c| hist[c as usize] += 1),
        other => other
            .to_rgba8()
            .pixels()
            .flat_map(|p| [p.0[0], p.0[1], p.0[2]])
            .for_each(|c| hist[c as usize] += 1),
    }
    hist
}

/// Linked-channel contrast stretch; flat images pass through unchanged.
fn stretch_contrast(image: DynamicImage) -> DynamicImage {
    match calculate_stretch_bounds(&sample_histogram(&image)) {
        Some((low, high)) => apply_lut(image, &stretch_lut(low, high)),
        None => image,
    }
}

/// Cover-resize to the planned box, center-crop, and flatten over `bg`.
fn cover_box(image: &DynamicImage, plan: CoverPlan, bg: Background) -> DynamicImage {
    let (width, height) = plan.target;
    let (cover_w, cover_h) = plan.cover;
    let covered = image.resize_exact(cover_w, cover_h, FilterType::Lanczos3).to_rgba8();
    let mut canvas = RgbaImage::from_pixel(width, height, bg.rgba());
    imageops::overlay(
        &mut canvas,
        &covered,
        center_offset(width, cover_w),
        center_offset(height, cover_h),
    );
    opaque_unless(canvas, false)
}

// ============================================================================
// Catalog
// ============================================================================

/// Strip metadata and re-sample at the current size.
pub fn original(handle: ImageHandle, _params: &Params) -> Result<ImageHandle, TransformError> {
    let (w, h) = handle.dimensions();
    Ok(handle
        .strip()
        .map_image(|img| img.resize_exact(w, h, FilterType::Lanczos3)))
}

/// Scale to exactly `width × height`, ignoring aspect ratio.
pub fn resize(handle: ImageHandle, params: &Params) -> Result<ImageHandle, TransformError> {
    let (cur_w, cur_h) = handle.dimensions();
    let width = dimension(params.width, cur_w, "width")?;
    let height = dimension(params.height, cur_h, "height")?;
    let (width, height) = within_budget(width, height, "width")?;
    if (width, height) == (cur_w, cur_h) {
        return Ok(handle);
    }
    Ok(handle.map_image(|img| img.resize_exact(width, height, FilterType::Lanczos3)))
}

pub fn thumbnail(handle: ImageHandle, params: &Params) -> Result<ImageHandle, TransformError> {
    let width = dimension(params.width, THUMBNAIL_SIZE, "width")?;
    let height = dimension(params.height, THUMBNAIL_SIZE, "height")?;
    let plan = cover_plan(handle.dimensions(), width, height)?;
    let bg = background(params)?;
    Ok(handle.map_image(|img| cover_box(&img, plan, bg)))
}

/// Pencil-sketch look: edges, inverted, stretched, gray, softened.
pub fn sketch(handle: ImageHandle, _params: &Params) -> Result<ImageHandle, TransformError> {
    Ok(handle.map_image(|img| {
        let mut edges = DynamicImage::ImageRgb8(img.to_rgb8())
            .filter3x3(&[-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0]);
        edges.invert();
        let gray = stretch_contrast(edges).to_luma8();
        DynamicImage::ImageLuma8(imageproc::filter::gaussian_blur_f32(&gray, SKETCH_BLUR_SIGMA))
    }))
}

/// Brand look for offer posters: modulate, gamma, then fill the box.
pub fn offerize(handle: ImageHandle, params: &Params) -> Result<ImageHandle, TransformError> {
    let modulation = Modulation {
        brightness: non_negative(params.brightness.unwrap_or(115.0), "brightness")?,
        saturation: non_negative(params.saturation.unwrap_or(175.0), "saturation")?,
        hue: params.hue.unwrap_or(100.0),
    };
    if !modulation.hue.is_finite() {
        return Err(invalid("hue", "must be a finite number"));
    }
    let gamma = positive_gamma(params.gamma.unwrap_or(1.125))?;
    let width = dimension(params.width, OFFERIZE_SIZE, "width")?;
    let height = dimension(params.height, OFFERIZE_SIZE, "height")?;
    let plan = cover_plan(handle.dimensions(), width, height)?;
    let bg = background(params)?;

    Ok(handle.map_image(|img| {
        let had_alpha = img.color().has_alpha();
        let mut rgba = img.to_rgba8();
        for p in rgba.pixels_mut() {
            let [r, g, b] = modulation.apply([p.0[0], p.0[1], p.0[2]]);
            p.0[..3].copy_from_slice(&[r, g, b]);
        }
        let toned = apply_lut(opaque_unless(rgba, had_alpha), &gamma_lut(gamma));
        cover_box(&toned, plan, bg)
    }))
}

pub fn normalize(handle: ImageHandle, _params: &Params) -> Result<ImageHandle, TransformError> {
    Ok(handle.map_image(stretch_contrast))
}

/// Charcoal drawing: Sobel edges on luma, softened, stretched, inverted.
pub fn charcoal(handle: ImageHandle, _params: &Params) -> Result<ImageHandle, TransformError> {
    Ok(handle.map_image(|img| {
        let gray = img.to_luma8();
        let gradients = imageproc::gradients::sobel_gradients(&gray);
        let edges = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let magnitude = gradients.get_pixel(x, y).0[0] as f32 * CHARCOAL_STRENGTH;
            Luma([magnitude.min(255.0) as u8])
        });
        let soft = imageproc::filter::gaussian_blur_f32(&edges, CHARCOAL_STRENGTH * 0.5);
        let mut drawn = stretch_contrast(DynamicImage::ImageLuma8(soft));
        drawn.invert();
        drawn
    }))
}

/// Linear levels between `black_point` and `white_point` (8-bit units), then gamma.
pub fn level(handle: ImageHandle, params: &Params) -> Result<ImageHandle, TransformError> {
    let black = required(params.black_point, "level", "black_point")?;
    let white = required(params.white_point, "level", "white_point")?;
    let gamma = positive_gamma(required(params.gamma, "level", "gamma")?)?;
    if white <= black {
        return Err(invalid(
            "white_point",
            format!("{white} must be greater than black_point {black}"),
        ));
    }
    let lut = level_lut(black, white, gamma);
    Ok(handle.map_image(|img| apply_lut(img, &lut)))
}
