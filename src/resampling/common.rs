//! Shared helpers for the samplers.

use ndarray::ArrayView2;

/// Integer pixel containing a fractional position, if inside `size`
pub fn pixel_index(position: f64, size: usize) -> Option<usize> {
    if !position.is_finite() || position < 0.0 {
        return None;
    }
    let index = position.floor() as usize;
    (index < size).then_some(index)
}

/// Clamp an index to valid bounds
pub fn clamp_index(index: isize, size: usize) -> usize {
    index.clamp(0, size as isize - 1) as usize
}

/// Get the weight for linear interpolation
pub fn linear_weight(fraction: f64) -> (f64, f64) {
    (1.0 - fraction, fraction)
}

/// Value at `(row, col)` when the pixel is valid and finite
pub fn valid_value(
    band: &ArrayView2<f32>,
    valid: &ArrayView2<bool>,
    row: usize,
    col: usize,
) -> Option<f32> {
    let value = band[[row, col]];
    (valid[[row, col]] && value.is_finite()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_index() {
        assert_eq!(pixel_index(0.0, 4), Some(0));
        assert_eq!(pixel_index(3.99, 4), Some(3));
        assert_eq!(pixel_index(4.0, 4), None);
        assert_eq!(pixel_index(-0.01, 4), None);
        assert_eq!(pixel_index(f64::NAN, 4), None);
    }

    #[test]
    fn test_clamp_index() {
        assert_eq!(clamp_index(-1, 10), 0);
        assert_eq!(clamp_index(5, 10), 5);
        assert_eq!(clamp_index(15, 10), 9);
    }

    #[test]
    fn test_linear_weight() {
        let (w0, w1) = linear_weight(0.3);
        assert!((w0 - 0.7).abs() < 1e-10);
        assert!((w1 - 0.3).abs() < 1e-10);
        assert!((w0 + w1 - 1.0).abs() < 1e-10);
    }
}
