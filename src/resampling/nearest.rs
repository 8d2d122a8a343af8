//! Nearest neighbor resampling.
//!
//! Takes the value of the source pixel containing the sample position.
//! Fastest method, and the only one that never invents values, which makes
//! it the default for categorical rasters such as segmentation masks.

use ndarray::ArrayView2;

use super::common;
use super::Sampler;

/// Nearest neighbor sampler
pub struct NearestSampler;

impl Sampler for NearestSampler {
    fn sample(
        &self,
        band: ArrayView2<f32>,
        valid: ArrayView2<bool>,
        row: f64,
        col: f64,
    ) -> Option<f32> {
        let (height, width) = band.dim();
        let r = common::pixel_index(row, height)?;
        let c = common::pixel_index(col, width)?;
        common::valid_value(&band, &valid, r, c)
    }

    fn name(&self) -> &str {
        "nearest"
    }
}
