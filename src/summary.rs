//! Threshold summary product.
//!
//! The first band of a tile is binarized against the asset's threshold, the
//! foreground pixels are counted and every connected region of the binary
//! raster is vectorized. The result is the asset's own metadata extended
//! with the three derived fields.

use ndarray::{Array2, ArrayView2};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::catalog::Asset;
use crate::error::{Result, TilerError};
use crate::raster::RasterTile;
use crate::vectorize::{shapes, Connectivity, Polygon};

/// Tile size whose pixel count is reported at half weight, so that a
/// 512-pixel tile counts like the 256-pixel tile it upsamples
pub const HALF_WEIGHT_TILE_SIZE: usize = 512;

/// Summary of one tile against one asset
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    /// Asset fields as found in the catalog, derived keys excluded
    pub asset: Map<String, Value>,
    pub pixel_count: f64,
    pub object_list: Vec<Polygon>,
}

impl ObjectSummary {
    pub fn object_count(&self) -> usize {
        self.object_list.len()
    }
}

impl Serialize for ObjectSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let derived = ["pixelCount", "objectCount", "objectList"];
        let passthrough: Vec<(&String, &Value)> = self
            .asset
            .iter()
            .filter(|(key, _)| !derived.contains(&key.as_str()))
            .collect();

        let mut map = serializer.serialize_map(Some(passthrough.len() + derived.len()))?;
        for (key, value) in passthrough {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("pixelCount", &self.pixel_count)?;
        map.serialize_entry("objectCount", &self.object_count())?;
        map.serialize_entry("objectList", &self.object_list)?;
        map.end()
    }
}

/// 1 where `band >= threshold`, 0 elsewhere (NaN compares false)
pub fn threshold_band(band: ArrayView2<f32>, threshold: f64) -> Array2<u8> {
    band.mapv(|v| u8::from(f64::from(v) >= threshold))
}

/// Count foreground pixels, at half weight for 512-pixel tiles.
///
/// The validity mask is not applied here; it only shapes the polygons.
pub fn pixel_count(binary: &Array2<u8>, tile_size: usize) -> f64 {
    let count = binary.iter().filter(|&&value| value == 1).count() as f64;
    if tile_size == HALF_WEIGHT_TILE_SIZE {
        count / 2.0
    } else {
        count
    }
}

/// Build the summary of `tile` for `asset`.
///
/// Only the first band is used. Every region of the binary raster is
/// returned, background regions included; invalid pixels belong to none.
pub fn summarize(tile: &RasterTile, asset: &Asset, tile_size: usize) -> Result<ObjectSummary> {
    if tile.bands() == 0 {
        return Err(TilerError::raster("tile has no bands to summarize"));
    }
    let threshold = asset.binary_threshold()?;
    let binary = threshold_band(tile.band(0), threshold);

    let object_list = shapes(binary.view(), tile.mask.view(), Connectivity::Four)
        .into_iter()
        .map(|shape| shape.polygon)
        .collect();

    Ok(ObjectSummary {
        asset: asset.fields.clone(),
        pixel_count: pixel_count(&binary, tile_size),
        object_list,
    })
}
