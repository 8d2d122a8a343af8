//! GeoTIFF structure: overview levels, georeferencing, CRS and nodata.
//!
//! The decoder is rebuilt for every level it visits, on top of a shared
//! [`BlockCursor`], so a tile request only pulls the header blocks and the
//! chunks it actually samples.

use ndarray::{Array2, Array3};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::debug;

use super::range::{BlockCursor, RangeReader};
use crate::error::{Result, TilerError};
use crate::mercator::{BoundingBox, CrsTransform};
use std::collections::BTreeMap;
use std::sync::Arc;

const TAG_NEW_SUBFILE_TYPE: u16 = 254;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_EXTRA_SAMPLES: u16 = 338;
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const USER_DEFINED: u16 = 32767;

/// NewSubfileType bit marking a transparency mask
const SUBFILE_MASK: u32 = 4;

fn tiff_error(context: &str, error: tiff::TiffError) -> TilerError {
    TilerError::raster(format!("{}: {}", context, error))
}

/// North-up affine transform of the full-resolution image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    /// Pixel width in CRS units
    pub res_x: f64,
    /// Pixel height in CRS units, positive for north-up images
    pub res_y: f64,
}

impl GeoTransform {
    /// From ModelPixelScale + ModelTiepoint
    pub fn from_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 || scale[0] == 0.0 || scale[1] == 0.0 {
            return None;
        }
        Some(Self {
            origin_x: tiepoint[3] - tiepoint[0] * scale[0],
            origin_y: tiepoint[4] + tiepoint[1] * scale[1],
            res_x: scale[0],
            res_y: scale[1],
        })
    }

    /// From a 4x4 ModelTransformation matrix; rotated grids are rejected
    pub fn from_matrix(matrix: &[f64]) -> Option<Self> {
        if matrix.len() < 16 || matrix[1] != 0.0 || matrix[4] != 0.0 {
            return None;
        }
        if matrix[0] == 0.0 || matrix[5] == 0.0 {
            return None;
        }
        Some(Self {
            origin_x: matrix[3],
            origin_y: matrix[7],
            res_x: matrix[0],
            res_y: -matrix[5],
        })
    }

    /// Fractional (row, col) of a CRS position, scaled for a level
    pub fn to_pixel(&self, x: f64, y: f64, scale_x: f64, scale_y: f64) -> (f64, f64) {
        let col = (x - self.origin_x) / (self.res_x * scale_x);
        let row = (self.origin_y - y) / (self.res_y * scale_y);
        (row, col)
    }

    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let x1 = self.origin_x + self.res_x * width as f64;
        let y1 = self.origin_y - self.res_y * height as f64;
        BoundingBox::new(
            self.origin_x.min(x1),
            self.origin_y.min(y1),
            self.origin_x.max(x1),
            self.origin_y.max(y1),
        )
    }
}

/// One image directory holding raster data (full resolution or overview).
#[derive(Debug, Clone)]
pub struct Level {
    pub ifd_index: usize,
    pub width: usize,
    pub height: usize,
    pub chunk_width: usize,
    pub chunk_height: usize,
}

impl Level {
    fn chunks_across(&self) -> usize {
        self.width.div_ceil(self.chunk_width)
    }

    fn chunks_down(&self) -> usize {
        self.height.div_ceil(self.chunk_height)
    }
}

/// Rectangle of level pixels, half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row_start: usize,
    pub col_start: usize,
    pub rows: usize,
    pub cols: usize,
}

/// One decoded strip or tile, samples interleaved.
struct DecodedChunk {
    row0: usize,
    col0: usize,
    rows: usize,
    cols: usize,
    row_len: usize,
    values: Vec<f32>,
}

impl DecodedChunk {
    /// Index of the first sample of level pixel `(row, col)`
    fn offset(&self, row: usize, col: usize, samples_per_pixel: usize) -> usize {
        (row - self.row0) * self.row_len + (col - self.col0) * samples_per_pixel
    }
}

/// An opened GeoTIFF.
pub struct GeoTiff {
    cursor: BlockCursor,
    levels: Vec<Level>,
    samples_per_pixel: usize,
    alpha_band: Option<usize>,
    transform: GeoTransform,
    epsg: u16,
    nodata: Option<f64>,
}

impl GeoTiff {
    /// Parse the header and every image directory of a source.
    pub fn open(reader: Arc<dyn RangeReader>, block_size: usize) -> Result<Self> {
        let identifier = reader.identifier().to_string();
        let cursor = BlockCursor::new(reader, block_size);
        let mut decoder = Decoder::new(cursor.clone())
            .map_err(|e| tiff_error(&format!("cannot decode {}", identifier), e))?
            .with_limits(Limits::unlimited());

        let samples_per_pixel = decoder
            .get_tag_u32(Tag::from_u16_exhaustive(TAG_SAMPLES_PER_PIXEL))
            .unwrap_or(1)
            .max(1) as usize;

        let extra_samples = decoder
            .get_tag_u16_vec(Tag::from_u16_exhaustive(TAG_EXTRA_SAMPLES))
            .unwrap_or_default();
        let alpha_band = alpha_band_index(samples_per_pixel, &extra_samples);

        let transform = read_transform(&mut decoder).ok_or_else(|| {
            TilerError::raster(format!("{} is not georeferenced", identifier))
        })?;

        let geokeys = decoder
            .get_tag_u16_vec(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))
            .unwrap_or_default();
        let epsg = epsg_from_geokeys(&geokeys).ok_or_else(|| {
            TilerError::raster(format!("{} has no EPSG coordinate system", identifier))
        })?;

        let nodata = decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))
            .ok()
            .and_then(|raw| parse_gdal_nodata(&raw));

        let mut levels = Vec::new();
        let mut ifd_index = 0;
        loop {
            let subfile = decoder
                .get_tag_u32(Tag::from_u16_exhaustive(TAG_NEW_SUBFILE_TYPE))
                .unwrap_or(0);
            if subfile & SUBFILE_MASK == 0 {
                let (width, height) = decoder
                    .dimensions()
                    .map_err(|e| tiff_error("cannot read dimensions", e))?;
                let (chunk_width, chunk_height) = decoder.chunk_dimensions();
                levels.push(Level {
                    ifd_index,
                    width: width as usize,
                    height: height as usize,
                    chunk_width: chunk_width.max(1) as usize,
                    chunk_height: chunk_height.max(1) as usize,
                });
            }

            if !decoder.more_images() {
                break;
            }
            decoder
                .next_image()
                .map_err(|e| tiff_error("cannot read overview directory", e))?;
            ifd_index += 1;
        }

        if levels.is_empty() {
            return Err(TilerError::raster(format!(
                "{} contains no image data",
                identifier
            )));
        }
        // Full resolution first, then coarser overviews
        levels.sort_by(|a, b| b.width.cmp(&a.width));

        debug!(
            source = %identifier,
            levels = levels.len(),
            bands = samples_per_pixel,
            epsg = epsg,
            "Opened GeoTIFF"
        );

        Ok(Self {
            cursor,
            levels,
            samples_per_pixel,
            alpha_band,
            transform,
            epsg,
            nodata,
        })
    }

    pub fn width(&self) -> usize {
        self.levels[0].width
    }

    pub fn height(&self) -> usize {
        self.levels[0].height
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Number of data bands, not counting an alpha band
    pub fn band_count(&self) -> usize {
        match self.alpha_band {
            Some(_) => self.samples_per_pixel - 1,
            None => self.samples_per_pixel,
        }
    }

    pub fn samples_per_pixel(&self) -> usize {
        self.samples_per_pixel
    }

    pub fn alpha_band(&self) -> Option<usize> {
        self.alpha_band
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn epsg(&self) -> u16 {
        self.epsg
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn crs(&self) -> Result<CrsTransform> {
        CrsTransform::for_epsg(self.epsg)
    }

    /// Footprint in the native CRS
    pub fn native_bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width(), self.height())
    }

    /// Ratio between full-resolution and level pixel sizes along (x, y)
    pub fn level_scale(&self, level: usize) -> (f64, f64) {
        let full = &self.levels[0];
        let level = &self.levels[level];
        (
            full.width as f64 / level.width as f64,
            full.height as f64 / level.height as f64,
        )
    }

    /// Read a window of a level for the given 0-based samples.
    ///
    /// Returns one plane per requested sample, shaped (samples, rows, cols).
    pub fn read_window(
        &self,
        level_index: usize,
        window: PixelWindow,
        samples: &[usize],
    ) -> Result<Array3<f32>> {
        let level = self.levels.get(level_index).ok_or_else(|| {
            TilerError::raster(format!("overview level {} does not exist", level_index))
        })?;
        self.check_samples(samples)?;

        let mut out = Array3::<f32>::zeros((samples.len(), window.rows, window.cols));
        if window.rows == 0 || window.cols == 0 {
            return Ok(out);
        }

        let mut decoder = self.decoder_at(level.ifd_index)?;
        let row_end = (window.row_start + window.rows).min(level.height);
        let col_end = (window.col_start + window.cols).min(level.width);
        if window.row_start >= row_end || window.col_start >= col_end {
            return Ok(out);
        }

        let first_chunk_row = window.row_start / level.chunk_height;
        let last_chunk_row = (row_end - 1) / level.chunk_height;
        let first_chunk_col = window.col_start / level.chunk_width;
        let last_chunk_col = (col_end - 1) / level.chunk_width;
        let chunks_across = level.chunks_across();
        let chunks_down = level.chunks_down();

        for chunk_row in first_chunk_row..=last_chunk_row.min(chunks_down - 1) {
            for chunk_col in first_chunk_col..=last_chunk_col.min(chunks_across - 1) {
                let chunk_index = chunk_row * chunks_across + chunk_col;
                let chunk = self.decode_chunk(&mut decoder, level, chunk_index)?;

                let y_from = window.row_start.max(chunk.row0);
                let y_to = row_end.min(chunk.row0 + chunk.rows);
                let x_from = window.col_start.max(chunk.col0);
                let x_to = col_end.min(chunk.col0 + chunk.cols);

                for y in y_from..y_to {
                    for x in x_from..x_to {
                        let pixel = chunk.offset(y, x, self.samples_per_pixel);
                        for (plane, &sample) in samples.iter().enumerate() {
                            out[[plane, y - window.row_start, x - window.col_start]] =
                                chunk.values[pixel + sample];
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// Read scattered level pixels `(row, col)` for the given 0-based samples.
    ///
    /// Returns one row per pixel, shaped (pixels, samples). Only chunks
    /// holding at least one requested pixel are decoded, one at a time.
    pub fn read_pixels(
        &self,
        level_index: usize,
        pixels: &[(usize, usize)],
        samples: &[usize],
    ) -> Result<Array2<f32>> {
        let level = self.levels.get(level_index).ok_or_else(|| {
            TilerError::raster(format!("overview level {} does not exist", level_index))
        })?;
        self.check_samples(samples)?;

        let mut out = Array2::<f32>::zeros((pixels.len(), samples.len()));
        let chunks_across = level.chunks_across();
        let mut by_chunk: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, &(row, col)) in pixels.iter().enumerate() {
            if row >= level.height || col >= level.width {
                return Err(TilerError::raster(format!(
                    "pixel ({}, {}) outside {}x{} level",
                    row, col, level.width, level.height
                )));
            }
            let chunk_index =
                (row / level.chunk_height) * chunks_across + col / level.chunk_width;
            by_chunk.entry(chunk_index).or_default().push(i);
        }
        if by_chunk.is_empty() {
            return Ok(out);
        }

        let mut decoder = self.decoder_at(level.ifd_index)?;
        for (chunk_index, members) in by_chunk {
            let chunk = self.decode_chunk(&mut decoder, level, chunk_index)?;
            for i in members {
                let (row, col) = pixels[i];
                if row >= chunk.row0 + chunk.rows || col >= chunk.col0 + chunk.cols {
                    continue;
                }
                let pixel = chunk.offset(row, col, self.samples_per_pixel);
                for (plane, &sample) in samples.iter().enumerate() {
                    out[[i, plane]] = chunk.values[pixel + sample];
                }
            }
        }
        Ok(out)
    }

    fn check_samples(&self, samples: &[usize]) -> Result<()> {
        match samples.iter().find(|&&sample| sample >= self.samples_per_pixel) {
            Some(sample) => Err(TilerError::raster(format!(
                "sample {} out of range for {} samples per pixel",
                sample, self.samples_per_pixel
            ))),
            None => Ok(()),
        }
    }

    fn decode_chunk(
        &self,
        decoder: &mut Decoder<BlockCursor>,
        level: &Level,
        chunk_index: usize,
    ) -> Result<DecodedChunk> {
        let index = chunk_index as u32;
        let (data_width, data_height) = decoder.chunk_data_dimensions(index);
        let values = decoding_to_f32(
            decoder
                .read_chunk(index)
                .map_err(|e| tiff_error("cannot decode chunk", e))?,
        )?;

        let rows = data_height as usize;
        let row_len = values.len() / rows.max(1);
        let stride = row_len / self.samples_per_pixel;
        let chunks_across = level.chunks_across();
        Ok(DecodedChunk {
            row0: (chunk_index / chunks_across) * level.chunk_height,
            col0: (chunk_index % chunks_across) * level.chunk_width,
            rows,
            cols: (data_width as usize).min(stride),
            row_len,
            values,
        })
    }

    fn decoder_at(&self, ifd_index: usize) -> Result<Decoder<BlockCursor>> {
        let mut decoder = Decoder::new(self.cursor.clone())
            .map_err(|e| tiff_error("cannot decode source", e))?
            .with_limits(Limits::unlimited());
        for _ in 0..ifd_index {
            decoder
                .next_image()
                .map_err(|e| tiff_error("cannot seek to overview", e))?;
        }
        Ok(decoder)
    }
}

fn read_transform(decoder: &mut Decoder<BlockCursor>) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE))
        .ok();
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT))
        .ok();
    if let (Some(scale), Some(tiepoint)) = (scale, tiepoint) {
        if let Some(transform) = GeoTransform::from_tiepoint(&scale, &tiepoint) {
            return Some(transform);
        }
    }
    decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_TRANSFORMATION))
        .ok()
        .and_then(|matrix| GeoTransform::from_matrix(&matrix))
}

/// EPSG code from a GeoKeyDirectory; projected CS wins over geographic.
pub fn epsg_from_geokeys(keys: &[u16]) -> Option<u16> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;
    let mut model_type = None;
    let mut projected = None;
    let mut geographic = None;

    for entry in keys[4..].chunks_exact(4).take(count) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        // Only inline SHORT values carry codes
        if location != 0 {
            continue;
        }
        match key {
            GT_MODEL_TYPE_GEO_KEY => model_type = Some(value),
            PROJECTED_CS_TYPE_GEO_KEY if value != USER_DEFINED => projected = Some(value),
            GEOGRAPHIC_TYPE_GEO_KEY if value != USER_DEFINED => geographic = Some(value),
            _ => {}
        }
    }

    projected.or(geographic).or(match model_type {
        Some(MODEL_TYPE_GEOGRAPHIC) => Some(4326),
        _ => None,
    })
}

/// Parse the ASCII GDAL_NODATA tag
pub fn parse_gdal_nodata(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_matches(char::from(0)).trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    trimmed.parse::<f64>().ok()
}

/// Index of the alpha sample declared in ExtraSamples (1 = associated, 2 = unassociated)
fn alpha_band_index(samples_per_pixel: usize, extra_samples: &[u16]) -> Option<usize> {
    let first_extra = samples_per_pixel.checked_sub(extra_samples.len())?;
    extra_samples
        .iter()
        .position(|&kind| kind == 1 || kind == 2)
        .map(|i| first_extra + i)
}

fn decoding_to_f32(result: DecodingResult) -> Result<Vec<f32>> {
    #[allow(unreachable_patterns)]
    let values = match result {
        DecodingResult::U8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        _ => return Err(TilerError::raster("unsupported sample format")),
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_from_tiepoint() {
        let transform =
            GeoTransform::from_tiepoint(&[10.0, 10.0, 0.0], &[0.0, 0.0, 0.0, 500000.0, 4000000.0, 0.0])
                .unwrap();
        assert_eq!(transform.origin_x, 500000.0);
        assert_eq!(transform.res_y, 10.0);

        let (row, col) = transform.to_pixel(500015.0, 3999975.0, 1.0, 1.0);
        assert_eq!((row, col), (2.5, 1.5));

        let (row, col) = transform.to_pixel(500015.0, 3999975.0, 2.0, 2.0);
        assert_eq!((row, col), (1.25, 0.75));

        let bounds = transform.bounds(100, 50);
        assert_eq!(bounds.to_array(), [500000.0, 3999500.0, 501000.0, 4000000.0]);
    }

    #[test]
    fn test_transform_from_matrix() {
        let matrix = [
            2.0, 0.0, 0.0, 100.0, //
            0.0, -2.0, 0.0, 50.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let transform = GeoTransform::from_matrix(&matrix).unwrap();
        assert_eq!(transform.res_y, 2.0);
        assert_eq!(transform.origin_y, 50.0);

        let mut rotated = matrix;
        rotated[1] = 0.5;
        assert!(GeoTransform::from_matrix(&rotated).is_none());
    }

    #[test]
    fn test_epsg_from_geokeys() {
        let projected = [1, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, 32633];
        assert_eq!(epsg_from_geokeys(&projected), Some(32633));

        let geographic = [1, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326];
        assert_eq!(epsg_from_geokeys(&geographic), Some(4326));

        let user_defined = [1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 32767];
        assert_eq!(epsg_from_geokeys(&user_defined), None);

        assert_eq!(epsg_from_geokeys(&[]), None);
    }

    #[test]
    fn test_nodata_and_alpha_parsing() {
        assert_eq!(parse_gdal_nodata("-9999\0"), Some(-9999.0));
        assert!(parse_gdal_nodata("nan").unwrap().is_nan());
        assert_eq!(parse_gdal_nodata("none"), None);

        assert_eq!(alpha_band_index(4, &[2]), Some(3));
        assert_eq!(alpha_band_index(4, &[0]), None);
        assert_eq!(alpha_band_index(1, &[]), None);
    }
}
