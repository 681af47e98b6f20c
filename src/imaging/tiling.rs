//! Split an image into a grid of tiles and reassemble it.
//!
//! ## Geometry
//!
//! A `columns × rows` grid over a `W × H` source uses slices of
//! `floor(W / columns) × floor(H / rows)`. Remainder pixels at the right and
//! bottom edges belong to no tile, so [`merge`] of a full grid yields exactly
//! `columns * slice_w × rows * slice_h`, which can be smaller than the source:
//!
//! ```text
//! 301×301 source, 3×3 grid → 100×100 slices → 300×300 merged
//! ```
//!
//! ## Concurrency
//!
//! Each tile is a read-only crop of the untouched source, so crops run on the
//! rayon pool. The grid is only assembled once every crop has been collected.
//!
//! ## Naming
//!
//! Persisted tiles are named `<basename>_<row>_<col>.<ext>`.

use super::backend::{ImageBackend, ImagingError};
use super::calculations::calculate_tile_geometry;
use super::handle::ImageHandle;
use super::params::EncodeOptions;
use super::transforms::TransformError;
use image::{DynamicImage, RgbaImage, imageops};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// `columns × rows` cells of image handles, stored column-major.
#[derive(Debug, Clone)]
pub struct TileGrid {
    columns: u32,
    rows: u32,
    cells: Vec<Option<ImageHandle>>,
}

impl TileGrid {
    /// A grid with every cell unpopulated, or `None` when `columns × rows`
    /// cells cannot be allocated.
    pub fn empty(columns: u32, rows: u32) -> Option<Self> {
        let len = (columns as usize).checked_mul(rows as usize)?;
        let mut cells = Vec::new();
        cells.try_reserve_exact(len).ok()?;
        cells.resize_with(len, || None);
        Some(Self {
            columns,
            rows,
            cells,
        })
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    fn index(&self, column: u32, row: u32) -> Option<usize> {
        (column < self.columns && row < self.rows)
            .then(|| column as usize * self.rows as usize + row as usize)
    }

    pub fn get(&self, column: u32, row: u32) -> Option<&ImageHandle> {
        self.index(column, row)
            .and_then(|i| self.cells[i].as_ref())
    }

    /// Place a tile. Out-of-range positions are ignored and return `false`.
    pub fn set(&mut self, column: u32, row: u32, tile: ImageHandle) -> bool {
        match self.index(column, row) {
            Some(i) => {
                self.cells[i] = Some(tile);
                true
            }
            None => false,
        }
    }

    /// Remove and return a tile.
    pub fn take(&mut self, column: u32, row: u32) -> Option<ImageHandle> {
        self.index(column, row).and_then(|i| self.cells[i].take())
    }

    /// First empty cell in column-major order, if any.
    pub fn first_missing(&self) -> Option<(u32, u32)> {
        self.cells
            .iter()
            .position(Option::is_none)
            .map(|i| self.position(i))
    }

    /// `(column, row)` of the cell at `index`.
    fn position(&self, index: usize) -> (u32, u32) {
        let rows = self.rows as usize;
        ((index / rows) as u32, (index % rows) as u32)
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing().is_none()
    }

    /// Populated cells as `(column, row, tile)`, column-major.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, &ImageHandle)> {
        self.cells.iter().enumerate().filter_map(move |(i, cell)| {
            cell.as_ref().map(|tile| {
                let (column, row) = self.position(i);
                (column, row, tile)
            })
        })
    }
}

/// File name of the tile at `(row, col)`.
pub fn tile_filename(basename: &str, row: u32, column: u32, extension: &str) -> String {
    format!("{basename}_{row}_{column}.{extension}")
}

/// Crop `source` into a `columns × rows` grid.
///
/// `source` is only read, so every tile starts from the same untouched pixels.
pub fn tile(source: &ImageHandle, columns: i64, rows: i64) -> Result<TileGrid, TransformError> {
    let (width, height) = source.dimensions();
    let geometry = calculate_tile_geometry((width, height), columns, rows).ok_or(
        TransformError::InvalidGridDimensions {
            columns,
            rows,
            width,
            height,
        },
    )?;

    let image = source.image();
    let crops: Vec<(u32, u32, DynamicImage)> = (0..geometry.columns)
        .flat_map(|col| (0..geometry.rows).map(move |row| (col, row)))
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(col, row)| {
            let (x, y) = geometry.origin(col, row);
            let crop = image.crop_imm(x, y, geometry.slice_width, geometry.slice_height);
            (col, row, crop)
        })
        .collect();

    let mut grid = TileGrid::empty(geometry.columns, geometry.rows).ok_or(
        TransformError::InvalidGridDimensions {
            columns,
            rows,
            width,
            height,
        },
    )?;
    for (col, row, crop) in crops {
        let tile = ImageHandle::new(crop)
            .with_source_format(source.source_format())
            .with_icc_profile(source.icc_profile().map(<[u8]>::to_vec));
        grid.set(col, row, tile);
    }
    Ok(grid)
}

/// Reassemble a complete grid: each column stacked top-to-bottom into a
/// strip, then the strips joined left-to-right.
pub fn merge(columns: i64, rows: i64, grid: &TileGrid) -> Result<ImageHandle, TransformError> {
    let invalid = || TransformError::InvalidGridDimensions {
        columns,
        rows,
        width: 0,
        height: 0,
    };
    let columns = u32::try_from(columns).ok().filter(|&c| c > 0).ok_or_else(invalid)?;
    let rows = u32::try_from(rows).ok().filter(|&r| r > 0).ok_or_else(invalid)?;
    // A larger request fails below as IncompleteGrid.
    if columns < grid.columns() || rows < grid.rows() {
        return Err(invalid());
    }

    let mut strips = Vec::with_capacity(columns as usize);
    for col in 0..columns {
        let tiles = (0..rows)
            .map(|row| {
                grid.get(col, row)
                    .ok_or(TransformError::IncompleteGrid { column: col, row })
            })
            .collect::<Result<Vec<_>, _>>()?;
        strips.push(tiles);
    }

    let strip_widths: Vec<u32> = strips
        .iter()
        .map(|tiles| tiles.iter().map(|t| t.width()).max().unwrap_or(0))
        .collect();
    let width: u32 = strip_widths.iter().sum();
    let height = strips
        .iter()
        .map(|tiles| tiles.iter().map(|t| t.height()).sum::<u32>())
        .max()
        .unwrap_or(0);

    let mut canvas = RgbaImage::new(width, height);
    let mut has_alpha = false;
    let mut x = 0i64;
    for (tiles, strip_width) in strips.iter().zip(&strip_widths) {
        let mut y = 0i64;
        for tile in tiles {
            has_alpha |= tile.color().has_alpha();
            imageops::replace(&mut canvas, &tile.image().to_rgba8(), x, y);
            y += tile.height() as i64;
        }
        x += *strip_width as i64;
    }

    let merged = DynamicImage::ImageRgba8(canvas);
    let merged = if has_alpha {
        merged
    } else {
        DynamicImage::ImageRgb8(merged.to_rgb8())
    };
    let first = strips.first().and_then(|tiles| tiles.first());
    Ok(ImageHandle::new(merged)
        .with_source_format(first.and_then(|t| t.source_format()))
        .with_icc_profile(first.and_then(|t| t.icc_profile()).map(<[u8]>::to_vec)))
}

/// A tile written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct TileOutput {
    pub column: u32,
    pub row: u32,
    pub path: PathBuf,
}

/// Encode every tile of `grid` into `dir` and return the written files in
/// column-major order.
pub fn write_tiles(
    backend: &impl ImageBackend,
    grid: &TileGrid,
    dir: &Path,
    basename: &str,
    options: &EncodeOptions,
) -> Result<Vec<TileOutput>, ImagingError> {
    let cells: Vec<_> = grid.iter().collect();
    cells
        .into_par_iter()
        .map(|(column, row, tile)| {
            let path = dir.join(tile_filename(
                basename,
                row,
                column,
                options.format.extension(),
            ));
            backend.save(tile, &path, options)?;
            Ok(TileOutput { column, row, path })
        })
        .collect()
}
