//! Tile extraction: from a raster address and an XYZ tile to a resampled pixel block.
//!
//! Every output pixel center is projected into the source CRS, mapped to a
//! fractional pixel of the best overview, and sampled either from one window
//! read that covers all of them or, when that window dwarfs the tile, from
//! only the source pixels the samples touch.

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

use super::geotiff::{GeoTiff, GeoTransform, PixelWindow};
use super::range::open_range_reader;
use super::{RasterTile, ReadOptions, SourceInfo, TileReader};
use crate::error::{Result, TilerError};
use crate::mercator::{
    mercator_to_lon_lat, zoom_for_resolution, BoundingBox, CrsTransform, TileCoordinate,
};
use crate::resampling::common::clamp_index;
use crate::resampling::{ResamplingMethod, Sampler};

/// Zoom estimates in `/bounds` use the 256 px web convention
const ZOOM_TILE_SIZE: usize = 256;

/// Largest covering window, in multiples of the tile's pixel count, read densely
const DENSE_WINDOW_FACTOR: usize = 4;

/// Production [`TileReader`] for GeoTIFF / COG sources.
#[derive(Clone)]
pub struct CogReader {
    client: reqwest::Client,
    block_size: usize,
    allow_local: bool,
}

impl CogReader {
    /// A reader for remote sources only
    pub fn new(client: reqwest::Client, block_size: usize) -> Self {
        Self {
            client,
            block_size,
            allow_local: false,
        }
    }

    /// Also accept `file://` URLs and bare paths
    pub fn allow_local(mut self, allow: bool) -> Self {
        self.allow_local = allow;
        self
    }

    /// Open the GeoTIFF at `address`
    pub fn open(&self, address: &str) -> Result<GeoTiff> {
        let reader = open_range_reader(address, &self.client, self.allow_local)?;
        GeoTiff::open(reader, self.block_size)
    }
}

impl TileReader for CogReader {
    fn info(&self, address: &str) -> Result<SourceInfo> {
        let source = self.open(address)?;
        source_info(&source, address)
    }

    fn tile(
        &self,
        address: &str,
        tile: TileCoordinate,
        options: &ReadOptions,
    ) -> Result<RasterTile> {
        let start = Instant::now();
        tile.validate()?;
        let source = self.open(address)?;
        let result = extract_tile(&source, tile, options)?;
        debug!(
            source = address,
            tile = %tile,
            valid_pixels = result.valid_count(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Extracted tile"
        );
        Ok(result)
    }
}

/// Footprint and zoom range of an opened source.
pub fn source_info(source: &GeoTiff, address: &str) -> Result<SourceInfo> {
    let crs = source.crs()?;
    let native = source.native_bounds();
    let mercator = crs.bbox_to_mercator(&native)?;

    let bounds = match crs {
        CrsTransform::Geographic => native.to_array(),
        _ => {
            let (west, south) = mercator_to_lon_lat(mercator.minx, mercator.miny);
            let (east, north) = mercator_to_lon_lat(mercator.maxx, mercator.maxy);
            [west, south, east, north]
        }
    };

    let levels = source.levels();
    let full_res = mercator.width() / source.width() as f64;
    let coarsest = &levels[levels.len() - 1];
    let coarse_res = mercator.width() / coarsest.width as f64;
    let maxzoom = zoom_for_resolution(full_res, ZOOM_TILE_SIZE);
    let minzoom = zoom_for_resolution(coarse_res, ZOOM_TILE_SIZE).min(maxzoom);

    Ok(SourceInfo {
        url: address.to_string(),
        bounds,
        minzoom,
        maxzoom,
        band_count: source.band_count(),
        width: source.width(),
        height: source.height(),
        epsg: source.epsg(),
        nodata: source.nodata().filter(|v| !v.is_nan()),
        overviews: levels.len() - 1,
    })
}

/// Read `tile` from an opened source.
///
/// Fails with `TileOutOfBounds` when the tile is off the grid or misses the
/// source extent. Pixels inside the tile but outside the raster come back
/// invalid.
pub fn extract_tile(
    source: &GeoTiff,
    tile: TileCoordinate,
    options: &ReadOptions,
) -> Result<RasterTile> {
    tile.validate()?;
    let size = options.tile_size;
    if size == 0 {
        return Err(TilerError::invalid("tile", "tile size must be positive"));
    }

    let crs = source.crs()?;
    let source_bounds = crs.bbox_to_mercator(&source.native_bounds())?;
    let tile_bounds = tile.mercator_bounds();
    if !tile_bounds.intersects(&source_bounds) {
        return Err(tile.out_of_bounds("tile does not intersect the source extent"));
    }

    let samples = band_samples(source, options.indexes.as_deref())?;
    let level = select_level(source, &source_bounds, &tile_bounds, size);
    let positions = pixel_positions(
        &crs,
        source.transform(),
        &tile_bounds,
        size,
        source.level_scale(level),
    );
    let plan = SamplePlan::new(source, positions, samples, options);

    let mut data = Array3::<f32>::zeros((plan.bands, size, size));
    let mut mask = Array2::from_elem((size, size), false);
    let level_info = &source.levels()[level];
    let window = match covering_window(&plan.positions, level_info.width, level_info.height) {
        Some(window) => window,
        None => return RasterTile::new(data, mask),
    };

    if window.rows.saturating_mul(window.cols) <= DENSE_WINDOW_FACTOR * size * size {
        sample_dense(source, level, window, &plan, &mut data, &mut mask)?;
    } else {
        debug!(
            level = level,
            window_rows = window.rows,
            window_cols = window.cols,
            "Window too large for a dense read, gathering sampled pixels"
        );
        sample_sparse(source, level, &plan, &mut data, &mut mask)?;
    }

    RasterTile::new(data, mask)
}

/// Everything the samplers need besides the source pixels
struct SamplePlan {
    /// Fractional level pixel of every output pixel, row-major
    positions: Vec<(f64, f64)>,
    /// Data samples first, then the alpha sample when present
    to_read: Vec<usize>,
    bands: usize,
    has_alpha: bool,
    nodata: Option<f64>,
    method: ResamplingMethod,
    size: usize,
}

impl SamplePlan {
    fn new(
        source: &GeoTiff,
        positions: Vec<(f64, f64)>,
        samples: Vec<usize>,
        options: &ReadOptions,
    ) -> Self {
        let bands = samples.len();
        let mut to_read = samples;
        if let Some(alpha) = source.alpha_band() {
            to_read.push(alpha);
        }
        Self {
            positions,
            to_read,
            bands,
            has_alpha: source.alpha_band().is_some(),
            nodata: options.nodata.or(source.nodata()),
            method: options.resampling,
            size: options.tile_size,
        }
    }
}

/// Read the whole covering window once and sample from it.
fn sample_dense(
    source: &GeoTiff,
    level: usize,
    window: PixelWindow,
    plan: &SamplePlan,
    data: &mut Array3<f32>,
    mask: &mut Array2<bool>,
) -> Result<()> {
    let planes = source.read_window(level, window, &plan.to_read)?;
    let values = planes.slice(s![..plan.bands, .., ..]);
    let alpha = plan
        .has_alpha
        .then(|| planes.index_axis(Axis(0), plan.bands));
    let valid = validity_mask(values, alpha, plan.nodata);

    let sampler = plan.method.sampler();
    let mut pixel = vec![0f32; plan.bands];
    for (i, &(row, col)) in plan.positions.iter().enumerate() {
        let local = (row - window.row_start as f64, col - window.col_start as f64);
        if sample_pixel(sampler.as_ref(), values, valid.view(), local, &mut pixel) {
            write_pixel(data, mask, i, plan.size, &pixel);
        }
    }
    Ok(())
}

/// Gather only the source pixels each sample touches.
///
/// Every output pixel gets its own small patch (the sampler footprint,
/// edge-clamped like a window read), so memory follows the tile size rather
/// than the source extent the tile covers.
fn sample_sparse(
    source: &GeoTiff,
    level: usize,
    plan: &SamplePlan,
    data: &mut Array3<f32>,
    mask: &mut Array2<bool>,
) -> Result<()> {
    let (height, width) = {
        let info = &source.levels()[level];
        (info.height, info.width)
    };
    let (side, offset) = plan.method.footprint();
    let cells = side * side;

    let mut pixels: Vec<(usize, usize)> = Vec::new();
    let mut slots: HashMap<(usize, usize), usize> = HashMap::new();
    let mut patch_slots: Vec<usize> = Vec::new();
    // (output index, row and col inside the patch)
    let mut targets: Vec<(usize, f64, f64)> = Vec::new();

    for (i, &(row, col)) in plan.positions.iter().enumerate() {
        if !(row.is_finite() && col.is_finite())
            || row < 0.0
            || col < 0.0
            || row >= height as f64
            || col >= width as f64
        {
            continue;
        }
        let origin_row = (row - offset).floor();
        let origin_col = (col - offset).floor();
        for dr in 0..side {
            let r = clamp_index(origin_row as isize + dr as isize, height);
            for dc in 0..side {
                let c = clamp_index(origin_col as isize + dc as isize, width);
                let next = pixels.len();
                let slot = *slots.entry((r, c)).or_insert_with(|| {
                    pixels.push((r, c));
                    next
                });
                patch_slots.push(slot);
            }
        }
        targets.push((i, row - origin_row, col - origin_col));
    }
    if targets.is_empty() {
        return Ok(());
    }

    let gathered = source.read_pixels(level, &pixels, &plan.to_read)?;
    let valid: Vec<bool> = gathered
        .outer_iter()
        .map(|values| {
            pixel_is_valid(
                values.iter().take(plan.bands).copied(),
                plan.has_alpha.then(|| values[plan.bands]),
                plan.nodata,
            )
        })
        .collect();

    let sampler = plan.method.sampler();
    let mut patch = Array3::<f32>::zeros((plan.bands, side, side));
    let mut patch_valid = Array2::from_elem((side, side), false);
    let mut pixel = vec![0f32; plan.bands];
    for (t, &(i, local_row, local_col)) in targets.iter().enumerate() {
        for (k, &slot) in patch_slots[t * cells..(t + 1) * cells].iter().enumerate() {
            let (r, c) = (k / side, k % side);
            patch_valid[[r, c]] = valid[slot];
            for b in 0..plan.bands {
                patch[[b, r, c]] = gathered[[slot, b]];
            }
        }
        let local = (local_row, local_col);
        if sample_pixel(sampler.as_ref(), patch.view(), patch_valid.view(), local, &mut pixel) {
            write_pixel(data, mask, i, plan.size, &pixel);
        }
    }
    Ok(())
}

/// Sample every band at `(row, col)`; false when any band is invalid there
fn sample_pixel(
    sampler: &dyn Sampler,
    values: ArrayView3<f32>,
    valid: ArrayView2<bool>,
    (row, col): (f64, f64),
    pixel: &mut [f32],
) -> bool {
    for (b, out) in pixel.iter_mut().enumerate() {
        match sampler.sample(values.index_axis(Axis(0), b), valid, row, col) {
            Some(value) => *out = value,
            None => return false,
        }
    }
    true
}

fn write_pixel(
    data: &mut Array3<f32>,
    mask: &mut Array2<bool>,
    index: usize,
    size: usize,
    pixel: &[f32],
) {
    let (r, c) = (index / size, index % size);
    for (b, &value) in pixel.iter().enumerate() {
        data[[b, r, c]] = value;
    }
    mask[[r, c]] = true;
}

/// Map 1-based band indexes to TIFF sample positions, skipping the alpha sample.
fn band_samples(source: &GeoTiff, indexes: Option<&[usize]>) -> Result<Vec<usize>> {
    let data_samples: Vec<usize> = (0..source.samples_per_pixel())
        .filter(|&s| Some(s) != source.alpha_band())
        .collect();

    match indexes {
        None => Ok(data_samples),
        Some(indexes) => indexes
            .iter()
            .map(|&index| {
                index
                    .checked_sub(1)
                    .and_then(|i| data_samples.get(i).copied())
                    .ok_or_else(|| {
                        TilerError::invalid(
                            "indexes",
                            format!(
                                "band {} does not exist; the source has {} bands",
                                index,
                                data_samples.len()
                            ),
                        )
                    })
            })
            .collect(),
    }
}

/// Coarsest level whose pixels are still at least as fine as the output.
fn select_level(
    source: &GeoTiff,
    source_bounds: &BoundingBox,
    tile_bounds: &BoundingBox,
    tile_size: usize,
) -> usize {
    let target = tile_bounds.width() / tile_size as f64;
    let full_res = source_bounds.width() / source.width() as f64;

    let mut chosen = 0;
    for level in 1..source.levels().len() {
        let (scale_x, _) = source.level_scale(level);
        if full_res * scale_x <= target * (1.0 + 1e-9) {
            chosen = level;
        }
    }
    chosen
}

/// Fractional level pixel `(row, col)` of every output pixel center, row-major.
fn pixel_positions(
    crs: &CrsTransform,
    transform: &GeoTransform,
    tile_bounds: &BoundingBox,
    size: usize,
    (scale_x, scale_y): (f64, f64),
) -> Vec<(f64, f64)> {
    let res_x = tile_bounds.width() / size as f64;
    let res_y = tile_bounds.height() / size as f64;
    let xs: Vec<f64> = (0..size)
        .map(|c| tile_bounds.minx + (c as f64 + 0.5) * res_x)
        .collect();
    let ys: Vec<f64> = (0..size)
        .map(|r| tile_bounds.maxy - (r as f64 + 0.5) * res_y)
        .collect();

    let mut positions = Vec::with_capacity(size * size);
    match crs {
        // Separable: source x depends only on mercator x, source y only on mercator y
        CrsTransform::Identity | CrsTransform::Geographic => {
            let cols: Vec<f64> = xs
                .iter()
                .map(|&x| {
                    let (sx, _) = crs.to_source(x, 0.0).unwrap_or((f64::NAN, f64::NAN));
                    transform.to_pixel(sx, transform.origin_y, scale_x, scale_y).1
                })
                .collect();
            let rows: Vec<f64> = ys
                .iter()
                .map(|&y| {
                    let (_, sy) = crs.to_source(0.0, y).unwrap_or((f64::NAN, f64::NAN));
                    transform.to_pixel(transform.origin_x, sy, scale_x, scale_y).0
                })
                .collect();
            for &row in &rows {
                for &col in &cols {
                    positions.push((row, col));
                }
            }
        }
        CrsTransform::Projected { .. } => {
            for &y in &ys {
                for &x in &xs {
                    let position = match crs.to_source(x, y) {
                        Ok((sx, sy)) => transform.to_pixel(sx, sy, scale_x, scale_y),
                        Err(_) => (f64::NAN, f64::NAN),
                    };
                    positions.push(position);
                }
            }
        }
    }
    positions
}

/// Smallest level window holding every in-range position plus a one-pixel margin.
fn covering_window(positions: &[(f64, f64)], width: usize, height: usize) -> Option<PixelWindow> {
    let mut min_row = f64::INFINITY;
    let mut max_row = f64::NEG_INFINITY;
    let mut min_col = f64::INFINITY;
    let mut max_col = f64::NEG_INFINITY;

    for &(row, col) in positions {
        if !(row.is_finite() && col.is_finite()) {
            continue;
        }
        if row < 0.0 || col < 0.0 || row >= height as f64 || col >= width as f64 {
            continue;
        }
        min_row = min_row.min(row);
        max_row = max_row.max(row);
        min_col = min_col.min(col);
        max_col = max_col.max(col);
    }
    if !min_row.is_finite() {
        return None;
    }

    let row_start = (min_row - 1.0).floor().max(0.0) as usize;
    let col_start = (min_col - 1.0).floor().max(0.0) as usize;
    let row_end = ((max_row + 1.0).ceil() as usize + 1).min(height);
    let col_end = ((max_col + 1.0).ceil() as usize + 1).min(width);

    Some(PixelWindow {
        row_start,
        col_start,
        rows: row_end - row_start,
        cols: col_end - col_start,
    })
}

/// Validity of each window pixel.
///
/// A pixel is invalid when any band is NaN, when every band equals nodata,
/// or when the alpha plane is zero.
pub fn validity_mask(
    planes: ArrayView3<f32>,
    alpha: Option<ArrayView2<f32>>,
    nodata: Option<f64>,
) -> Array2<bool> {
    let (bands, rows, cols) = planes.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        pixel_is_valid(
            (0..bands).map(|b| planes[[b, r, c]]),
            alpha.as_ref().map(|alpha| alpha[[r, c]]),
            nodata,
        )
    })
}

/// Validity of one pixel from its band values and optional alpha
fn pixel_is_valid(
    values: impl Iterator<Item = f32>,
    alpha: Option<f32>,
    nodata: Option<f64>,
) -> bool {
    if alpha == Some(0.0) {
        return false;
    }
    let mut any = false;
    let mut all_nodata = true;
    for value in values {
        if value.is_nan() {
            return false;
        }
        any = true;
        all_nodata &= match nodata {
            Some(nd) if !nd.is_nan() => f64::from(value) == nd,
            _ => false,
        };
    }
    !(any && all_nodata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mercator::HALF_EARTH;
    use crate::raster::range::LocalRangeReader;
    use std::fs::File;
    use std::io::BufWriter;
    use std::path::Path;
    use std::sync::Arc;
    use tiff::encoder::{colortype, TiffEncoder};
    use tiff::tags::Tag;

    const SIZE: u32 = 64;

    /// Single-band EPSG:3857 raster covering tile 1/0/0, plus a half-size overview.
    fn write_fixture(path: &Path, nodata: Option<&str>) {
        let file = File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(BufWriter::new(file)).unwrap();

        let full: Vec<f32> = (0..SIZE * SIZE).map(|i| i as f32).collect();
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(SIZE, SIZE)
            .unwrap();
        let res = HALF_EARTH / SIZE as f64;
        let scale = [res, res, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, -HALF_EARTH, HALF_EARTH, 0.0];
        let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 3857];
        image.encoder().write_tag(Tag::Unknown(33550), &scale[..]).unwrap();
        image.encoder().write_tag(Tag::Unknown(33922), &tiepoint[..]).unwrap();
        image.encoder().write_tag(Tag::Unknown(34735), &geokeys[..]).unwrap();
        if let Some(nodata) = nodata {
            image.encoder().write_tag(Tag::Unknown(42113), nodata).unwrap();
        }
        image.write_data(&full).unwrap();

        let half = SIZE / 2;
        let overview: Vec<f32> = (0..half * half).map(|i| 10_000.0 + i as f32).collect();
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(half, half)
            .unwrap();
        image.encoder().write_tag(Tag::Unknown(254), 1u32).unwrap();
        image.write_data(&overview).unwrap();
    }

    fn open_fixture(nodata: Option<&str>) -> (tempfile::TempDir, GeoTiff) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.tif");
        write_fixture(&path, nodata);
        let reader = Arc::new(LocalRangeReader::new(&path).unwrap());
        let source = GeoTiff::open(reader, 4096).unwrap();
        (dir, source)
    }

    fn options(tile_size: usize) -> ReadOptions {
        ReadOptions {
            tile_size,
            ..ReadOptions::default()
        }
    }

    #[test]
    fn test_open_reads_levels_and_georeferencing() {
        let (_dir, source) = open_fixture(Some("-9999"));
        assert_eq!(source.width(), 64);
        assert_eq!(source.levels().len(), 2);
        assert_eq!(source.levels()[1].width, 32);
        assert_eq!(source.epsg(), 3857);
        assert_eq!(source.nodata(), Some(-9999.0));
        assert_eq!(source.band_count(), 1);
    }

    #[test]
    fn test_aligned_tile_matches_source() {
        let (_dir, source) = open_fixture(None);
        let tile = extract_tile(&source, TileCoordinate::new(1, 0, 0), &options(64)).unwrap();

        assert_eq!(tile.data.dim(), (1, 64, 64));
        assert_eq!(tile.data[[0, 0, 0]], 0.0);
        assert_eq!(tile.data[[0, 0, 5]], 5.0);
        assert_eq!(tile.data[[0, 3, 7]], (3 * 64 + 7) as f32);
        assert_eq!(tile.valid_count(), 64 * 64);
    }

    #[test]
    fn test_upsampled_tile() {
        let (_dir, source) = open_fixture(None);
        let tile = extract_tile(&source, TileCoordinate::new(2, 0, 0), &options(64)).unwrap();
        assert_eq!(tile.data[[0, 0, 0]], 0.0);
        assert_eq!(tile.data[[0, 0, 1]], 0.0);
        assert_eq!(tile.data[[0, 0, 2]], 1.0);
        assert_eq!(tile.data[[0, 2, 0]], 64.0);
    }

    #[test]
    fn test_zoomed_out_tile_uses_overview_and_masks_outside() {
        let (_dir, source) = open_fixture(None);
        let tile = extract_tile(&source, TileCoordinate::new(0, 0, 0), &options(64)).unwrap();

        assert_eq!(tile.data[[0, 0, 5]], 10_005.0);
        assert!(tile.mask[[10, 10]]);
        assert!(!tile.mask[[40, 40]]);
        assert!(!tile.mask[[10, 40]]);
        assert_eq!(tile.valid_count(), 32 * 32);
    }

    #[test]
    fn test_non_intersecting_tile_is_out_of_bounds() {
        let (_dir, source) = open_fixture(None);
        let result = extract_tile(&source, TileCoordinate::new(1, 1, 1), &options(64));
        assert!(matches!(result, Err(TilerError::TileOutOfBounds { .. })));

        let result = extract_tile(&source, TileCoordinate::new(1, 0, 2), &options(64));
        assert!(matches!(result, Err(TilerError::TileOutOfBounds { .. })));
    }

    #[test]
    fn test_nodata_override_and_bad_indexes() {
        let (_dir, source) = open_fixture(None);
        let read = ReadOptions {
            nodata: Some(0.0),
            ..options(64)
        };
        let tile = extract_tile(&source, TileCoordinate::new(1, 0, 0), &read).unwrap();
        assert!(!tile.mask[[0, 0]]);
        assert!(tile.mask[[0, 1]]);

        let read = ReadOptions {
            indexes: Some(vec![2]),
            ..options(64)
        };
        let result = extract_tile(&source, TileCoordinate::new(1, 0, 0), &read);
        assert!(matches!(
            result,
            Err(TilerError::InvalidParameter { ref param, .. }) if param == "indexes"
        ));
    }

    #[test]
    fn test_bilinear_matches_nearest_on_aligned_grid() {
        let (_dir, source) = open_fixture(None);
        let read = ReadOptions {
            resampling: ResamplingMethod::Bilinear,
            ..options(64)
        };
        let tile = extract_tile(&source, TileCoordinate::new(1, 0, 0), &read).unwrap();
        assert!((tile.data[[0, 10, 10]] - 650.0).abs() < 1e-3);
    }

    #[test]
    fn test_large_window_is_gathered_pixel_by_pixel() {
        let (_dir, source) = open_fixture(None);
        // 8 output pixels over 32 overview pixels: far more than the tile reads densely
        let tile = extract_tile(&source, TileCoordinate::new(1, 0, 0), &options(8)).unwrap();

        assert_eq!(tile.data.dim(), (1, 8, 8));
        assert_eq!(tile.data[[0, 0, 0]], 10_000.0 + (2 * 32 + 2) as f32);
        assert_eq!(tile.data[[0, 1, 3]], 10_000.0 + (6 * 32 + 14) as f32);
        assert_eq!(tile.valid_count(), 64);
    }

    /// Run both sampling paths over the same plan
    fn both_paths(
        source: &GeoTiff,
        tile: TileCoordinate,
        read: &ReadOptions,
    ) -> (RasterTile, RasterTile) {
        let crs = source.crs().unwrap();
        let source_bounds = crs.bbox_to_mercator(&source.native_bounds()).unwrap();
        let tile_bounds = tile.mercator_bounds();
        let size = read.tile_size;
        let level = select_level(source, &source_bounds, &tile_bounds, size);
        let positions = pixel_positions(
            &crs,
            source.transform(),
            &tile_bounds,
            size,
            source.level_scale(level),
        );
        let plan = SamplePlan::new(source, positions, band_samples(source, None).unwrap(), read);
        let info = &source.levels()[level];
        let window = covering_window(&plan.positions, info.width, info.height).unwrap();

        let run = |dense: bool| {
            let mut data = Array3::zeros((plan.bands, size, size));
            let mut mask = Array2::from_elem((size, size), false);
            if dense {
                sample_dense(source, level, window, &plan, &mut data, &mut mask).unwrap();
            } else {
                sample_sparse(source, level, &plan, &mut data, &mut mask).unwrap();
            }
            RasterTile::new(data, mask).unwrap()
        };
        (run(true), run(false))
    }

    #[test]
    fn test_gathered_read_matches_window_read() {
        let (_dir, source) = open_fixture(Some("10010"));
        for tile in [TileCoordinate::new(1, 0, 0), TileCoordinate::new(0, 0, 0)] {
            for method in [ResamplingMethod::Nearest, ResamplingMethod::Bilinear] {
                let read = ReadOptions {
                    resampling: method,
                    ..options(8)
                };
                let (dense, sparse) = both_paths(&source, tile, &read);
                assert_eq!(dense.mask, sparse.mask, "{} {:?}", tile, method);
                assert!(dense.valid_count() > 0);
                for (a, b) in dense.data.iter().zip(sparse.data.iter()) {
                    assert!((a - b).abs() < 1e-3, "{} {:?}: {} != {}", tile, method, a, b);
                }
            }
        }
    }

    #[test]
    fn test_source_info() {
        let (_dir, source) = open_fixture(None);
        let info = source_info(&source, "fixture.tif").unwrap();
        assert!((info.bounds[0] + 180.0).abs() < 1e-6);
        assert!(info.bounds[1].abs() < 1e-6);
        assert!(info.bounds[2].abs() < 1e-6);
        assert_eq!(info.band_count, 1);
        assert_eq!(info.overviews, 1);
        assert!(info.minzoom <= info.maxzoom);
    }

    #[test]
    fn test_validity_mask() {
        let mut planes = Array3::<f32>::ones((2, 2, 2));
        planes[[0, 0, 0]] = -1.0;
        planes[[1, 0, 0]] = -1.0;
        planes[[0, 0, 1]] = -1.0;
        planes[[1, 1, 1]] = f32::NAN;
        let mask = validity_mask(planes.view(), None, Some(-1.0));
        assert!(!mask[[0, 0]]);
        assert!(mask[[0, 1]]);
        assert!(mask[[1, 0]]);
        assert!(!mask[[1, 1]]);

        let alpha = Array2::from_shape_vec((2, 2), vec![255.0, 0.0, 255.0, 255.0]).unwrap();
        let mask = validity_mask(planes.view(), Some(alpha.view()), None);
        assert!(!mask[[0, 1]]);
    }
}
