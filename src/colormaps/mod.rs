//! Colormap implementations for image generation.
//!
//! Color tables applied to single-band products before encoding.

pub mod colormap;
pub mod diverging;
pub mod sequential;

pub use colormap::{get_colormap, ColorTable, Colormap, TableColormap, COLORMAP_NAMES};
