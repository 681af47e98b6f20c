//! Pure calculation functions for image geometry and tone curves.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate dimensions needed to cover a target box (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension matches exactly, the other may exceed.
/// Neither is ever smaller than the target, so the following center crop
/// never needs padding for an opaque source. Extreme aspect ratios saturate
/// at `u32::MAX`; callers bound the area before allocating.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `target` - Target box dimensions (width, height)
pub fn calculate_cover_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height matches, width exceeds
        let w = (tgt_h as f64 * src_aspect).round() as u32;
        (w.max(tgt_w), tgt_h)
    } else {
        // Source is taller: width matches, height exceeds
        let h = (tgt_w as f64 / src_aspect).round() as u32;
        (tgt_w, h.max(tgt_h))
    }
}

/// Offset that centers an `inner` extent inside an `outer` one.
///
/// Negative when `inner` is larger (the excess is cropped evenly).
pub fn center_offset(outer: u32, inner: u32) -> i64 {
    (outer as i64 - inner as i64) / 2
}

/// Geometry of a tile grid laid over a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub columns: u32,
    pub rows: u32,
    pub slice_width: u32,
    pub slice_height: u32,
}

impl TileGeometry {
    /// Top-left corner of the tile at `(col, row)` in source coordinates.
    pub fn origin(&self, col: u32, row: u32) -> (u32, u32) {
        (col * self.slice_width, row * self.slice_height)
    }

    /// Dimensions of the image a full merge produces.
    pub fn merged_dimensions(&self) -> (u32, u32) {
        (
            self.columns * self.slice_width,
            self.rows * self.slice_height,
        )
    }
}

/// Calculate the slice size for a `columns × rows` grid.
///
/// Integer division: remainder pixels at the right and bottom edges are not
/// covered by any tile. Returns `None` for a non-positive grid dimension or a
/// grid finer than the image (which would yield zero-sized slices).
pub fn calculate_tile_geometry(source: (u32, u32), columns: i64, rows: i64) -> Option<TileGeometry> {
    if columns <= 0 || rows <= 0 {
        return None;
    }
    let columns = u32::try_from(columns).ok()?;
    let rows = u32::try_from(rows).ok()?;
    let slice_width = source.0 / columns;
    let slice_height = source.1 / rows;
    if slice_width == 0 || slice_height == 0 {
        return None;
    }
    Some(TileGeometry {
        columns,
        rows,
        slice_width,
        slice_height,
    })
}

// ============================================================================
// Tone curves
// ============================================================================

/// Lookup table applying `out = in^(1/gamma)` on 8-bit samples.
pub fn gamma_lut(gamma: f64) -> [u8; 256] {
    let exponent = 1.0 / gamma;
    std::array::from_fn(|i| {
        let v = (i as f64 / 255.0).powf(exponent);
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    })
}

/// Lookup table for a level adjustment.
///
/// Samples at or below `black` map to 0, at or above `white` to 255, and the
/// range between is stretched linearly then gamma-corrected.
pub fn level_lut(black: f64, white: f64, gamma: f64) -> [u8; 256] {
    let exponent = 1.0 / gamma;
    let span = white - black;
    std::array::from_fn(|i| {
        let t = ((i as f64 - black) / span).clamp(0.0, 1.0);
        (t.powf(exponent) * 255.0).round() as u8
    })
}

/// Fraction of darkest samples clipped to black by a contrast stretch.
pub const STRETCH_BLACK_CLIP: f64 = 0.02;
/// Fraction of lightest samples clipped to white by a contrast stretch.
pub const STRETCH_WHITE_CLIP: f64 = 0.01;

/// Find the `(low, high)` sample values a contrast stretch maps to 0 and 255.
///
/// Returns `None` when the histogram is empty or flat after clipping, in
/// which case the image should be left untouched.
pub fn calculate_stretch_bounds(histogram: &[u64; 256]) -> Option<(u8, u8)> {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return None;
    }
    let black_limit = (total as f64 * STRETCH_BLACK_CLIP) as u64;
    let white_limit = (total as f64 * STRETCH_WHITE_CLIP) as u64;

    let mut seen = 0;
    let mut low = 0;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > black_limit {
            low = value;
            break;
        }
    }

    seen = 0;
    let mut high = 255;
    for (value, count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > white_limit {
            high = value;
            break;
        }
    }

    (high > low).then_some((low as u8, high as u8))
}

/// Lookup table mapping `low..=high` linearly onto `0..=255`.
pub fn stretch_lut(low: u8, high: u8) -> [u8; 256] {
    level_lut(low as f64, high as f64, 1.0)
}

// ============================================================================
// Color modulation
// ============================================================================

/// Convert RGB in `0.0..=1.0` to HSL with hue as a fraction of a full turn.
pub fn rgb_to_hsl(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let delta = max - min;
    if delta <= f64::EPSILON {
        return (0.0, 0.0, l);
    }
    let s = if l <= 0.5 {
        delta / (max + min)
    } else {
        delta / (2.0 - max - min)
    };
    let h = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    (h / 6.0, s, l)
}

pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    if s <= f64::EPSILON {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |t: f64| {
        let t = t.rem_euclid(1.0);
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}

/// Brightness, saturation and hue adjustment, all in percent.
///
/// 100 leaves a component unchanged. Hue is a rotation where each percent
/// away from 100 turns the hue wheel by 1.8 degrees (0 and 200 are both a
/// half turn).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modulation {
    pub brightness: f64,
    pub saturation: f64,
    pub hue: f64,
}

impl Modulation {
    pub fn apply(&self, rgb: [u8; 3]) -> [u8; 3] {
        let [r, g, b] = rgb.map(|c| c as f64 / 255.0);
        let (h, s, l) = rgb_to_hsl(r, g, b);
        let h = h + (self.hue - 100.0) / 200.0;
        let s = (s * self.saturation / 100.0).clamp(0.0, 1.0);
        let l = (l * self.brightness / 100.0).clamp(0.0, 1.0);
        let (r, g, b) = hsl_to_rgb(h, s, l);
        [r, g, b].map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8)
    }
}
