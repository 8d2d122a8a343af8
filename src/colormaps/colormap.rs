//! Colormap trait and utilities.
//!
//! Rendering looks colors up by 8-bit index, so every colormap exposes a
//! 256-entry table; `map_normalized` is a convenience over that table.

use crate::error::{Result, TilerError};

/// A 256-entry RGBA lookup table
pub type ColorTable = [[u8; 4]; 256];

/// Trait for color mapping implementations
pub trait Colormap: Send + Sync {
    /// RGBA color for an 8-bit index
    fn lookup(&self, index: u8) -> [u8; 4];

    /// Map a normalized value (0.0 to 1.0) to an RGBA color
    fn map_normalized(&self, value: f32) -> [u8; 4] {
        let index = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        self.lookup(index)
    }

    /// Map a value to an RGBA color given the data range
    fn map(&self, value: f32, min: f32, max: f32) -> [u8; 4] {
        let normalized = if max > min {
            ((value - min) / (max - min)).clamp(0.0, 1.0)
        } else {
            0.5
        };
        self.map_normalized(normalized)
    }

    /// Get the name of this colormap
    fn name(&self) -> &str;
}

/// Colormap backed by a precomputed table
pub struct TableColormap {
    name: &'static str,
    table: ColorTable,
}

impl TableColormap {
    pub fn new(name: &'static str, table: ColorTable) -> Self {
        Self { name, table }
    }

    /// Sample a `colorgrad` gradient at 256 evenly spaced points
    pub fn from_gradient(name: &'static str, gradient: &colorgrad::Gradient) -> Self {
        let (start, end) = gradient.domain();
        let mut table = [[0u8; 4]; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let t = start + (end - start) * i as f64 / 255.0;
            *entry = gradient.at(t).to_rgba8();
        }
        Self { name, table }
    }

    pub fn table(&self) -> &ColorTable {
        &self.table
    }
}

impl Colormap for TableColormap {
    fn lookup(&self, index: u8) -> [u8; 4] {
        self.table[index as usize]
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Names accepted by [`get_colormap`]
pub const COLORMAP_NAMES: [&str; 9] = [
    "cfastie", "viridis", "plasma", "inferno", "magma", "cividis", "rdylgn", "rdbu", "spectral",
];

/// Get a colormap by name
pub fn get_colormap(name: &str) -> Result<Box<dyn Colormap>> {
    use super::{diverging, sequential};

    let colormap = match name.to_lowercase().as_str() {
        "cfastie" => diverging::cfastie(),
        "viridis" => sequential::viridis(),
        "plasma" => sequential::plasma(),
        "inferno" => sequential::inferno(),
        "magma" => sequential::magma(),
        "cividis" => sequential::cividis(),
        "rdylgn" => diverging::rdylgn(),
        "rdbu" => diverging::rdbu(),
        "spectral" => diverging::spectral(),
        _ => {
            return Err(TilerError::invalid(
                "color_map",
                format!(
                    "Unknown colormap: {} (available: {})",
                    name,
                    COLORMAP_NAMES.join(", ")
                ),
            ))
        }
    };
    Ok(Box::new(colormap))
}

/// Linear interpolation between two colors
pub fn lerp_color(c1: [u8; 3], c2: [u8; 3], t: f32) -> [u8; 3] {
    [
        (c1[0] as f32 * (1.0 - t) + c2[0] as f32 * t) as u8,
        (c1[1] as f32 * (1.0 - t) + c2[1] as f32 * t) as u8,
        (c1[2] as f32 * (1.0 - t) + c2[2] as f32 * t) as u8,
    ]
}

/// Expand `(index, color)` anchors into a full table by linear interpolation.
///
/// Anchors must be sorted by index and start at 0 and end at 255.
pub fn table_from_anchors(anchors: &[(u8, [u8; 3])]) -> ColorTable {
    let mut table = [[0u8, 0, 0, 255]; 256];
    for pair in anchors.windows(2) {
        let (i0, c0) = pair[0];
        let (i1, c1) = pair[1];
        let span = (i1 - i0).max(1) as f32;
        for i in i0..=i1 {
            let rgb = lerp_color(c0, c1, (i - i0) as f32 / span);
            table[i as usize] = [rgb[0], rgb[1], rgb[2], 255];
        }
    }
    table
}
