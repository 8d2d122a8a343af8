//! Test data generation utilities.
//!
//! Writes small GeoTIFFs and catalog items with known pixel patterns into a
//! temporary directory. Every raster covers the whole Web Mercator square,
//! so tile 0/0/0 maps exactly onto the image.

use serde_json::{json, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tiff::encoder::{colortype, DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

/// Half the side of the Web Mercator square, in meters
pub const HALF_EARTH: f64 = 20_037_508.342_789_244;

/// Side of the RGB scene in pixels
pub const SCENE_SIZE: u32 = 256;

/// Side of the single-band water raster in pixels
pub const WATER_SIZE: u32 = 64;

/// The square of ones in the water raster: `[start, end)` on both axes
pub const WATER_SQUARE: (u32, u32) = (16, 32);

/// Threshold stored on the catalog's water asset
pub const WATER_THRESHOLD: f64 = 0.5;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Temporary directory holding every fixture of one test
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub scene: PathBuf,
    pub water: PathBuf,
    pub catalog: PathBuf,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let scene = dir.path().join("scene.tif");
        let water = dir.path().join("water.tif");
        let catalog = dir.path().join("item.json");

        create_rgb_scene(&scene)?;
        create_water_mask(&water)?;
        std::fs::write(&catalog, serde_json::to_vec_pretty(&catalog_item())?)?;

        Ok(Self {
            dir,
            scene,
            water,
            catalog,
        })
    }

    pub fn scene_url(&self) -> String {
        self.scene.to_string_lossy().into_owned()
    }

    pub fn catalog_url(&self) -> String {
        self.catalog.to_string_lossy().into_owned()
    }

    /// Path of a file that does not exist inside the fixture directory
    pub fn missing_url(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().into_owned()
    }
}

/// A catalog item whose assets point at the fixture rasters by relative href
pub fn catalog_item() -> Value {
    json!({
        "type": "Feature",
        "stac_version": "1.0.0",
        "id": "fixture-scene",
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [-180.0, -85.0511], [180.0, -85.0511], [180.0, 85.0511],
                [-180.0, 85.0511], [-180.0, -85.0511]
            ]]
        },
        "properties": {"datetime": "2020-01-01T00:00:00Z"},
        "assets": {
            "raster": {
                "href": "water.tif",
                "type": "image/tiff; application=geotiff",
                "title": "Water mask",
                "binary_threshold": WATER_THRESHOLD
            },
            "visual": {
                "href": "scene.tif",
                "type": "image/tiff; application=geotiff"
            }
        }
    })
}

/// GeoKey directory declaring a projected EPSG:3857 raster
fn mercator_geokeys() -> [u16; 12] {
    [1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 3857]
}

/// Three-band 8-bit scene: red follows the column, green the row, blue is flat.
pub fn create_rgb_scene(path: &Path) -> Result<()> {
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut pixels = Vec::with_capacity((SCENE_SIZE * SCENE_SIZE * 3) as usize);
    for row in 0..SCENE_SIZE {
        for col in 0..SCENE_SIZE {
            pixels.extend_from_slice(&[col as u8, row as u8, 128]);
        }
    }

    let mut image = encoder.new_image::<colortype::RGB8>(SCENE_SIZE, SCENE_SIZE)?;
    write_georeference(image.encoder(), SCENE_SIZE)?;
    image.write_data(&pixels)?;
    Ok(())
}

/// Single-band float raster: ones inside [`WATER_SQUARE`], zeros elsewhere.
pub fn create_water_mask(path: &Path) -> Result<()> {
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let (start, end) = WATER_SQUARE;
    let pixels: Vec<f32> = (0..WATER_SIZE * WATER_SIZE)
        .map(|i| {
            let (row, col) = (i / WATER_SIZE, i % WATER_SIZE);
            if (start..end).contains(&row) && (start..end).contains(&col) {
                1.0
            } else {
                0.0
            }
        })
        .collect();

    let mut image = encoder.new_image::<colortype::Gray32Float>(WATER_SIZE, WATER_SIZE)?;
    write_georeference(image.encoder(), WATER_SIZE)?;
    image.write_data(&pixels)?;
    Ok(())
}

fn write_georeference<W, K>(directory: &mut DirectoryEncoder<'_, W, K>, size: u32) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
    K: TiffKind,
{
    let res = 2.0 * HALF_EARTH / f64::from(size);
    let scale = [res, res, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, -HALF_EARTH, HALF_EARTH, 0.0];
    directory.write_tag(Tag::Unknown(33550), &scale[..])?;
    directory.write_tag(Tag::Unknown(33922), &tiepoint[..])?;
    directory.write_tag(Tag::Unknown(34735), &mercator_geokeys()[..])?;
    Ok(())
}

/// Foreground pixel count of the water raster rendered at `tile_size`
pub fn expected_water_pixels(tile_size: u32) -> f64 {
    let scale = tile_size / WATER_SIZE;
    let side = (WATER_SQUARE.1 - WATER_SQUARE.0) * scale;
    f64::from(side * side)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_files_exist() {
        let fixture = Fixture::new().unwrap();
        assert!(fixture.scene.exists());
        assert!(fixture.water.exists());
        assert!(fixture.catalog.exists());
    }

    #[test]
    fn test_expected_water_pixels() {
        assert_eq!(expected_water_pixels(256), 64.0 * 64.0);
        assert_eq!(expected_water_pixels(512), 128.0 * 128.0);
    }
}
