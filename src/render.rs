//! Rendering pipeline: radiometric transforms, color tables and image encoding.
//!
//! The tile product optionally stretches the tile's own value range and hands
//! the result to the encoder; the processing product rescales a derived band
//! into color-table indices first.

use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, RgbImage, RgbaImage};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use std::io::Cursor;
use std::time::Instant;
use tracing::debug;

use crate::colormaps::Colormap;
use crate::error::{Result, TilerError};
use crate::params::OutputFormat;
use crate::raster::RasterTile;

/// Output range of the linear stretch
pub const STRETCH_RANGE: (f64, f64) = (1.0, 255.0);

/// Output range of the band-math rescale
pub const INDEX_RANGE: (f64, f64) = (0.0, 255.0);

/// Clip `value` to `in_range` and map it affinely onto `out_range`.
///
/// A degenerate input range maps everything to the low end of the output.
pub fn linear_rescale(value: f32, in_range: (f64, f64), out_range: (f64, f64)) -> f32 {
    let (imin, imax) = in_range;
    let (omin, omax) = out_range;
    if imax == imin {
        return omin as f32;
    }
    let (lo, hi) = if imin < imax { (imin, imax) } else { (imax, imin) };
    let clipped = f64::from(value).clamp(lo, hi);
    ((clipped - imin) / (imax - imin) * (omax - omin) + omin) as f32
}

/// Min and max over every finite value of every band
pub fn value_range(data: &Array3<f32>) -> Option<(f64, f64)> {
    data.iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| {
            let v = f64::from(v);
            Some(match acc {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            })
        })
}

/// Stretch the tile's observed `[min, max]` onto [`STRETCH_RANGE`].
///
/// The statistics come from this tile alone, so neighbouring tiles of the
/// same source may stretch differently.
pub fn linear_stretch(tile: &RasterTile) -> RasterTile {
    let data = match value_range(&tile.data) {
        Some(range) => tile.data.mapv(|v| linear_rescale(v, range, STRETCH_RANGE)),
        None => tile.data.clone(),
    };
    RasterTile {
        data,
        mask: tile.mask.clone(),
    }
}

/// Rescale a derived band from `range` to 8-bit indices; masked pixels become 0.
pub fn rescale_to_indices(
    band: ArrayView2<f32>,
    mask: &Array2<bool>,
    range: (f64, f64),
) -> Array2<u8> {
    Array2::from_shape_fn(band.dim(), |(r, c)| {
        if mask[[r, c]] {
            to_u8(linear_rescale(band[[r, c]], range, INDEX_RANGE))
        } else {
            0
        }
    })
}

/// Expand color-table indices to an RGB array shaped `(3, height, width)`
pub fn apply_colormap(indices: &Array2<u8>, colormap: &dyn Colormap) -> Array3<f32> {
    let (height, width) = indices.dim();
    let mut rgb = Array3::<f32>::zeros((3, height, width));
    for ((r, c), &index) in indices.indexed_iter() {
        let color = colormap.lookup(index);
        for band in 0..3 {
            rgb[[band, r, c]] = f32::from(color[band]);
        }
    }
    rgb
}

/// Clamp to `[0, 255]` and truncate, NaN to 0
#[inline]
fn to_u8(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

/// Encode `(bands, height, width)` samples plus mask into `format`.
///
/// One band encodes as grayscale, three as RGB, four as RGBA with the fourth
/// band combined with the mask. Formats that support alpha carry the mask
/// (255 valid, 0 invalid); JPEG drops it.
pub fn encode(data: &Array3<f32>, mask: &Array2<bool>, format: &OutputFormat) -> Result<Vec<u8>> {
    let start = Instant::now();
    let (bands, height, width) = data.dim();
    if mask.dim() != (height, width) {
        return Err(TilerError::Encoding {
            message: "mask does not match the image size".to_string(),
        });
    }
    let image_format = match format {
        OutputFormat::Png => ImageFormat::Png,
        OutputFormat::Jpeg => ImageFormat::Jpeg,
        OutputFormat::Tiff => ImageFormat::Tiff,
        OutputFormat::Other(name) => {
            return Err(TilerError::Encoding {
                message: format!("unsupported output format '{}'", name),
            })
        }
    };

    let (w, h) = (width as u32, height as u32);
    let sample = |b: usize, x: u32, y: u32| to_u8(data[[b, y as usize, x as usize]]);
    let alpha = |x: u32, y: u32, extra: Option<u8>| {
        let valid = mask[[y as usize, x as usize]];
        match (valid, extra) {
            (false, _) => 0,
            (true, Some(a)) => a,
            (true, None) => 255,
        }
    };

    let image = match (bands, format.supports_alpha()) {
        (1, false) => DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| {
            image::Luma([sample(0, x, y)])
        })),
        (1, true) if *format == OutputFormat::Png => {
            DynamicImage::ImageLumaA8(ImageBuffer::from_fn(w, h, |x, y| {
                image::LumaA([sample(0, x, y), alpha(x, y, None)])
            }))
        }
        (1, true) => DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            let v = sample(0, x, y);
            image::Rgba([v, v, v, alpha(x, y, None)])
        })),
        (3 | 4, false) => DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([sample(0, x, y), sample(1, x, y), sample(2, x, y)])
        })),
        (3 | 4, true) => DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            let extra = (bands == 4).then(|| sample(3, x, y));
            image::Rgba([
                sample(0, x, y),
                sample(1, x, y),
                sample(2, x, y),
                alpha(x, y, extra),
            ])
        })),
        (other, _) => {
            return Err(TilerError::Encoding {
                message: format!(
                    "cannot encode {} bands as {}; expected 1, 3 or 4",
                    other, format
                ),
            })
        }
    };

    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image_format)
        .map_err(|e| TilerError::Encoding {
            message: format!("Failed to encode {}: {}", format, e),
        })?;

    debug!(
        format = %format,
        bands = bands,
        encoding_duration_ms = start.elapsed().as_millis() as u64,
        "Image encoded successfully"
    );
    Ok(buffer.into_inner())
}

/// The tile product: optional linear stretch, then encode.
pub fn render_tile(tile: &RasterTile, stretch: bool, format: &OutputFormat) -> Result<Vec<u8>> {
    if stretch {
        let stretched = linear_stretch(tile);
        encode(&stretched.data, &stretched.mask, format)
    } else {
        encode(&tile.data, &tile.mask, format)
    }
}

/// The processing product: rescale derived bands from `range` to 8 bits,
/// color single-band results, then encode.
pub fn render_processing(
    derived: &RasterTile,
    range: (f64, f64),
    colormap: &dyn Colormap,
    format: &OutputFormat,
) -> Result<Vec<u8>> {
    let indices: Vec<Array2<u8>> = derived
        .data
        .axis_iter(Axis(0))
        .map(|band| rescale_to_indices(band, &derived.mask, range))
        .collect();

    let data = if indices.len() == 1 {
        apply_colormap(&indices[0], colormap)
    } else {
        let (height, width) = derived.mask.dim();
        let mut stacked = Array3::<f32>::zeros((indices.len(), height, width));
        for (b, band) in indices.iter().enumerate() {
            stacked
                .index_axis_mut(Axis(0), b)
                .assign(&band.mapv(f32::from));
        }
        stacked
    };
    encode(&data, &derived.mask, format)
}
