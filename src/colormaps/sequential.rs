//! Sequential colormaps (single-hue progression).
//!
//! These colormaps are suitable for data that progresses from low to high.

use super::colormap::TableColormap;

/// Viridis colormap - perceptually uniform, colorblind-friendly
pub fn viridis() -> TableColormap {
    TableColormap::from_gradient("viridis", &colorgrad::viridis())
}

pub fn plasma() -> TableColormap {
    TableColormap::from_gradient("plasma", &colorgrad::plasma())
}

pub fn inferno() -> TableColormap {
    TableColormap::from_gradient("inferno", &colorgrad::inferno())
}

pub fn magma() -> TableColormap {
    TableColormap::from_gradient("magma", &colorgrad::magma())
}

/// Cividis colormap - colorblind-friendly alternative to viridis
pub fn cividis() -> TableColormap {
    TableColormap::from_gradient("cividis", &colorgrad::cividis())
}
