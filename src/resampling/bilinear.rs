//! Bilinear resampling.
//!
//! Blends the four source pixel centers around the sample position.
//! Invalid neighbors are dropped and the remaining weights renormalized.

use ndarray::ArrayView2;

use super::common;
use super::Sampler;

/// Bilinear sampler
pub struct BilinearSampler;

impl Sampler for BilinearSampler {
    fn sample(
        &self,
        band: ArrayView2<f32>,
        valid: ArrayView2<bool>,
        row: f64,
        col: f64,
    ) -> Option<f32> {
        let (height, width) = band.dim();

        // The containing pixel decides validity
        let r = common::pixel_index(row, height)?;
        let c = common::pixel_index(col, width)?;
        common::valid_value(&band, &valid, r, c)?;

        // Work in pixel-center coordinates
        let y = row - 0.5;
        let x = col - 0.5;
        let y0 = y.floor();
        let x0 = x.floor();
        let (wy0, wy1) = common::linear_weight(y - y0);
        let (wx0, wx1) = common::linear_weight(x - x0);

        let mut total = 0.0f64;
        let mut weight_sum = 0.0f64;
        for (dy, wy) in [(0isize, wy0), (1, wy1)] {
            for (dx, wx) in [(0isize, wx0), (1, wx1)] {
                let weight = wy * wx;
                if weight <= 0.0 {
                    continue;
                }
                let rr = common::clamp_index(y0 as isize + dy, height);
                let cc = common::clamp_index(x0 as isize + dx, width);
                if let Some(value) = common::valid_value(&band, &valid, rr, cc) {
                    total += f64::from(value) * weight;
                    weight_sum += weight;
                }
            }
        }

        (weight_sum > 0.0).then(|| (total / weight_sum) as f32)
    }

    fn name(&self) -> &str {
        "bilinear"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_bilinear_midpoint() {
        let data = array![[0.0f32, 10.0], [20.0, 30.0]];
        let valid = array![[true, true], [true, true]];
        let value = BilinearSampler
            .sample(data.view(), valid.view(), 1.0, 1.0)
            .unwrap();
        assert!((value - 15.0).abs() < 1e-5);
    }

    #[test]
    fn test_bilinear_at_pixel_center_is_exact() {
        let data = array![[0.0f32, 10.0], [20.0, 30.0]];
        let valid = array![[true, true], [true, true]];
        let value = BilinearSampler
            .sample(data.view(), valid.view(), 1.5, 0.5)
            .unwrap();
        assert!((value - 20.0).abs() < 1e-5);
    }

    #[test]
    fn test_bilinear_skips_invalid_neighbors() {
        let data = array![[0.0f32, 1000.0], [20.0, 30.0]];
        let valid = array![[true, false], [true, true]];
        let value = BilinearSampler
            .sample(data.view(), valid.view(), 1.0, 0.9)
            .unwrap();
        assert!(value < 100.0);
        assert_eq!(BilinearSampler.sample(data.view(), valid.view(), 0.5, 1.5), None);
    }
}
