//! Raster access: windowed, resampled tile reads from GeoTIFF sources.
//!
//! Handlers only see the [`TileReader`] trait; [`extract::CogReader`] is the
//! production implementation over local files and HTTP range requests.

pub mod extract;
pub mod geotiff;
pub mod range;

use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::Serialize;

use crate::error::{Result, TilerError};
use crate::mercator::TileCoordinate;
use crate::resampling::ResamplingMethod;

pub use extract::CogReader;

/// Pixel block of one tile, always shaped `(bands, height, width)`, with its validity mask.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTile {
    pub data: Array3<f32>,
    pub mask: Array2<bool>,
}

impl RasterTile {
    pub fn new(data: Array3<f32>, mask: Array2<bool>) -> Result<Self> {
        let (_, height, width) = data.dim();
        if mask.dim() != (height, width) {
            return Err(TilerError::raster(format!(
                "mask shape {:?} does not match data shape {:?}",
                mask.dim(),
                data.dim()
            )));
        }
        Ok(Self { data, mask })
    }

    /// Wrap a single 2-D band, adding the band axis
    pub fn from_band(band: Array2<f32>, mask: Array2<bool>) -> Result<Self> {
        Self::new(band.insert_axis(Axis(0)), mask)
    }

    pub fn bands(&self) -> usize {
        self.data.dim().0
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn band(&self, index: usize) -> ArrayView2<f32> {
        self.data.index_axis(Axis(0), index)
    }

    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&v| v).count()
    }
}

/// Extraction parameters for one tile read
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    /// 1-based band indexes; `None` reads every data band
    pub indexes: Option<Vec<usize>>,
    pub tile_size: usize,
    /// Overrides the source's own nodata value
    pub nodata: Option<f64>,
    pub resampling: ResamplingMethod,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            indexes: None,
            tile_size: crate::params::DEFAULT_TILE_SIZE,
            nodata: None,
            resampling: ResamplingMethod::Nearest,
        }
    }
}

/// Footprint and layout of a raster source, served by `/bounds`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceInfo {
    pub url: String,
    /// `[west, south, east, north]` in EPSG:4326
    pub bounds: [f64; 4],
    pub minzoom: u8,
    pub maxzoom: u8,
    pub band_count: usize,
    pub width: usize,
    pub height: usize,
    pub epsg: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
    pub overviews: usize,
}

/// Windowed read/resample of a raster address onto the Web Mercator grid.
///
/// Implementations block; callers run them on the blocking pool.
pub trait TileReader: Send + Sync {
    /// Describe the source at `address`
    fn info(&self, address: &str) -> Result<SourceInfo>;

    /// Read one tile, resampled to `options.tile_size` square
    fn tile(&self, address: &str, tile: TileCoordinate, options: &ReadOptions)
        -> Result<RasterTile>;
}
