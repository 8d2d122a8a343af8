//! Diverging colormaps (two-hue progression with center).
//!
//! These colormaps are suitable for data that diverges from a central value,
//! such as normalized difference indices in `[-1, 1]`.

use once_cell::sync::Lazy;

use super::colormap::{table_from_anchors, ColorTable, TableColormap};

/// Fastie NDVI table: grey ramp for negative values, then blue through
/// green, yellow and red to magenta for increasingly positive ones.
static CFASTIE: Lazy<ColorTable> = Lazy::new(|| {
    let mut table = table_from_anchors(&[
        (0, [255, 255, 255]),
        (1, [250, 250, 250]),
        (100, [46, 46, 46]),
        (101, [0, 0, 0]),
        (127, [0, 0, 0]),
        (128, [0, 0, 255]),
        (150, [0, 128, 255]),
        (165, [0, 255, 255]),
        (180, [0, 255, 0]),
        (195, [128, 255, 0]),
        (210, [255, 255, 0]),
        (225, [255, 128, 0]),
        (240, [255, 0, 0]),
        (255, [255, 0, 255]),
    ]);
    // Index 0 is the masked value after rescaling
    table[0] = [0, 0, 0, 255];
    table
});

/// The default colormap of the processing product
pub fn cfastie() -> TableColormap {
    TableColormap::new("cfastie", *CFASTIE)
}

/// Red-yellow-green, the usual vegetation index palette
pub fn rdylgn() -> TableColormap {
    TableColormap::from_gradient("rdylgn", &colorgrad::rd_yl_gn())
}

/// RdBu colormap - red to blue through white
pub fn rdbu() -> TableColormap {
    TableColormap::from_gradient("rdbu", &colorgrad::rd_bu())
}

pub fn spectral() -> TableColormap {
    TableColormap::from_gradient("spectral", &colorgrad::spectral())
}
