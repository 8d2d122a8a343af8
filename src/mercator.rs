//! Web-Mercator tile grid math and coordinate transforms.
//!
//! Tiles are addressed on the standard XYZ quad-tree: zoom `z` splits the
//! EPSG:3857 square into `2^z x 2^z` tiles with `y` growing southwards.
//! Sources in other CRSs are reached through [`CrsTransform`].

use std::f64::consts::PI;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::error::{Result, TilerError};

/// Half the earth's circumference in Web Mercator meters
pub const HALF_EARTH: f64 = 20_037_508.342_789_244;

/// Deepest zoom level accepted on the tile routes
pub const MAX_ZOOM: u8 = 30;

/// An XYZ tile address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoordinate {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoordinate {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at this zoom
    pub fn grid_size(&self) -> u64 {
        1u64 << self.z
    }

    /// Check that x and y fall inside `[0, 2^z)`
    pub fn validate(&self) -> Result<()> {
        if self.z > MAX_ZOOM {
            return Err(TilerError::invalid(
                "z",
                format!("zoom {} exceeds the maximum of {}", self.z, MAX_ZOOM),
            ));
        }
        let n = self.grid_size();
        if u64::from(self.x) >= n || u64::from(self.y) >= n {
            return Err(self.out_of_bounds(format!(
                "x and y must lie in [0, {}) at zoom {}",
                n, self.z
            )));
        }
        Ok(())
    }

    /// Build a [`TilerError::TileOutOfBounds`] for this tile
    pub fn out_of_bounds(&self, message: impl Into<String>) -> TilerError {
        TilerError::TileOutOfBounds {
            z: self.z,
            x: self.x,
            y: self.y,
            message: message.into(),
        }
    }

    /// Tile extent in EPSG:3857 meters
    pub fn mercator_bounds(&self) -> BoundingBox {
        let n = self.grid_size() as f64;
        let tile_span = 2.0 * HALF_EARTH / n;

        let minx = -HALF_EARTH + f64::from(self.x) * tile_span;
        let maxy = HALF_EARTH - f64::from(self.y) * tile_span;
        BoundingBox::new(minx, maxy - tile_span, minx + tile_span, maxy)
    }

    /// Tile extent in longitude/latitude degrees
    pub fn lon_lat_bounds(&self) -> BoundingBox {
        let merc = self.mercator_bounds();
        let (west, south) = mercator_to_lon_lat(merc.minx, merc.miny);
        let (east, north) = mercator_to_lon_lat(merc.maxx, merc.maxy);
        BoundingBox::new(west, south, east, north)
    }
}

impl std::fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl BoundingBox {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self {
            minx,
            miny,
            maxx,
            maxy,
        }
    }

    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }

    /// True when the two boxes share a region of non-zero area
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.minx < other.maxx
            && other.minx < self.maxx
            && self.miny < other.maxy
            && other.miny < self.maxy
    }

    /// Smallest box containing every point
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        let mut iter = points.iter().filter(|(x, y)| x.is_finite() && y.is_finite());
        let &(x0, y0) = iter.next()?;
        let mut bbox = BoundingBox::new(x0, y0, x0, y0);
        for &(x, y) in iter {
            bbox.minx = bbox.minx.min(x);
            bbox.miny = bbox.miny.min(y);
            bbox.maxx = bbox.maxx.max(x);
            bbox.maxy = bbox.maxy.max(y);
        }
        Some(bbox)
    }

    /// `[minx, miny, maxx, maxy]`
    pub fn to_array(&self) -> [f64; 4] {
        [self.minx, self.miny, self.maxx, self.maxy]
    }
}

/// Web Mercator X/Y to longitude/latitude
#[inline]
pub fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = x * 180.0 / HALF_EARTH;
    let lat = (2.0 * (y * PI / HALF_EARTH).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Longitude/latitude to Web Mercator X/Y
#[inline]
pub fn lon_lat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-85.051_128_78, 85.051_128_78);
    let x = lon * HALF_EARTH / 180.0;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * HALF_EARTH / PI;
    (x, y)
}

/// Transformation between Web Mercator and a source CRS
pub enum CrsTransform {
    /// Source is already EPSG:3857
    Identity,
    /// Source is EPSG:4326, handled with closed-form math
    Geographic,
    /// Any other EPSG code, handled by proj4rs
    Projected {
        epsg: u16,
        mercator: Box<Proj>,
        source: Box<Proj>,
        source_is_geographic: bool,
    },
}

impl CrsTransform {
    /// Pick the transform strategy for an EPSG code
    pub fn for_epsg(epsg: u16) -> Result<Self> {
        match epsg {
            3857 => Ok(CrsTransform::Identity),
            4326 => Ok(CrsTransform::Geographic),
            _ => {
                let source_def = crs_definitions::from_code(epsg).ok_or_else(|| {
                    TilerError::raster(format!("EPSG:{} is not a supported CRS", epsg))
                })?;
                let mercator_def = crs_definitions::from_code(3857).ok_or_else(|| {
                    TilerError::raster("EPSG:3857 definition is unavailable".to_string())
                })?;
                let source = Proj::from_proj_string(source_def.proj4).map_err(|e| {
                    TilerError::raster(format!("Invalid projection EPSG:{}: {:?}", epsg, e))
                })?;
                let mercator = Proj::from_proj_string(mercator_def.proj4).map_err(|e| {
                    TilerError::raster(format!("Invalid projection EPSG:3857: {:?}", e))
                })?;
                Ok(CrsTransform::Projected {
                    epsg,
                    mercator: Box::new(mercator),
                    source: Box::new(source),
                    source_is_geographic: source_def.proj4.contains("+proj=longlat"),
                })
            }
        }
    }

    /// EPSG code of the source side
    pub fn epsg(&self) -> u16 {
        match self {
            CrsTransform::Identity => 3857,
            CrsTransform::Geographic => 4326,
            CrsTransform::Projected { epsg, .. } => *epsg,
        }
    }

    /// Web Mercator to source CRS
    pub fn to_source(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match self {
            CrsTransform::Identity => Ok((x, y)),
            CrsTransform::Geographic => Ok(mercator_to_lon_lat(x, y)),
            CrsTransform::Projected {
                mercator,
                source,
                source_is_geographic,
                ..
            } => {
                let mut point = (x, y, 0.0);
                transform(mercator, source, &mut point)
                    .map_err(|e| TilerError::raster(format!("Transform failed: {:?}", e)))?;
                if *source_is_geographic {
                    Ok((point.0.to_degrees(), point.1.to_degrees()))
                } else {
                    Ok((point.0, point.1))
                }
            }
        }
    }

    /// Source CRS to Web Mercator
    pub fn to_mercator(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match self {
            CrsTransform::Identity => Ok((x, y)),
            CrsTransform::Geographic => Ok(lon_lat_to_mercator(x, y)),
            CrsTransform::Projected {
                mercator,
                source,
                source_is_geographic,
                ..
            } => {
                let mut point = if *source_is_geographic {
                    (x.to_radians(), y.to_radians(), 0.0)
                } else {
                    (x, y, 0.0)
                };
                transform(source, mercator, &mut point)
                    .map_err(|e| TilerError::raster(format!("Transform failed: {:?}", e)))?;
                Ok((point.0, point.1))
            }
        }
    }

    /// Project a source-CRS box into Web Mercator by sampling its edges
    pub fn bbox_to_mercator(&self, bbox: &BoundingBox) -> Result<BoundingBox> {
        let points = edge_samples(bbox, 8)
            .into_iter()
            .map(|(x, y)| self.to_mercator(x, y))
            .collect::<Result<Vec<_>>>()?;
        BoundingBox::from_points(&points)
            .ok_or_else(|| TilerError::raster("Source bounds could not be projected"))
    }
}

/// Points spread along the four edges of a box
fn edge_samples(bbox: &BoundingBox, per_edge: usize) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(per_edge * 4);
    for i in 0..=per_edge {
        let t = i as f64 / per_edge as f64;
        let x = bbox.minx + t * bbox.width();
        let y = bbox.miny + t * bbox.height();
        points.push((x, bbox.miny));
        points.push((x, bbox.maxy));
        points.push((bbox.minx, y));
        points.push((bbox.maxx, y));
    }
    points
}

/// Ground resolution (meters per pixel) of a zoom level at the equator
pub fn zoom_resolution(zoom: u8, tile_size: usize) -> f64 {
    2.0 * HALF_EARTH / (tile_size as f64 * (1u64 << zoom) as f64)
}

/// Zoom level whose resolution best matches a Web Mercator pixel size
pub fn zoom_for_resolution(resolution: f64, tile_size: usize) -> u8 {
    if !(resolution.is_finite() && resolution > 0.0) {
        return 0;
    }
    (0..=MAX_ZOOM)
        .find(|&z| zoom_resolution(z, tile_size) <= resolution)
        .unwrap_or(MAX_ZOOM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_tile_bounds() {
        let bbox = TileCoordinate::new(0, 0, 0).mercator_bounds();
        assert!((bbox.minx + HALF_EARTH).abs() < 1e-6);
        assert!((bbox.maxx - HALF_EARTH).abs() < 1e-6);
        assert!((bbox.maxy - HALF_EARTH).abs() < 1e-6);
        assert!((bbox.miny + HALF_EARTH).abs() < 1e-6);
    }

    #[test]
    fn test_adjacent_tiles_share_edges() {
        let west = TileCoordinate::new(1, 0, 0).mercator_bounds();
        let east = TileCoordinate::new(1, 1, 0).mercator_bounds();
        assert!((west.maxx - east.minx).abs() < 1e-6);

        let north = TileCoordinate::new(1, 0, 0).mercator_bounds();
        let south = TileCoordinate::new(1, 0, 1).mercator_bounds();
        assert!((north.miny - south.maxy).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_out_of_grid() {
        assert!(TileCoordinate::new(2, 3, 3).validate().is_ok());
        assert!(matches!(
            TileCoordinate::new(2, 4, 0).validate(),
            Err(TilerError::TileOutOfBounds { .. })
        ));
        assert!(matches!(
            TileCoordinate::new(17, 23576, 131072).validate(),
            Err(TilerError::TileOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_validate_caps_zoom() {
        assert!(TileCoordinate::new(MAX_ZOOM, 0, 0).validate().is_ok());
        assert!(matches!(
            TileCoordinate::new(MAX_ZOOM + 1, 0, 0).validate(),
            Err(TilerError::InvalidParameter { ref param, .. }) if param == "z"
        ));
    }

    #[test]
    fn test_lon_lat_round_trip() {
        let (x, y) = lon_lat_to_mercator(-77.03, 38.9);
        let (lon, lat) = mercator_to_lon_lat(x, y);
        assert!((lon + 77.03).abs() < 1e-9);
        assert!((lat - 38.9).abs() < 1e-9);
    }

    #[test]
    fn test_lon_lat_bounds_of_world() {
        let bbox = TileCoordinate::new(0, 0, 0).lon_lat_bounds();
        assert!((bbox.minx + 180.0).abs() < 1e-9);
        assert!((bbox.maxx - 180.0).abs() < 1e-9);
        assert!((bbox.maxy - 85.051_128_78).abs() < 1e-6);
    }

    #[test]
    fn test_intersects() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&BoundingBox::new(5.0, 5.0, 15.0, 15.0)));
        assert!(!a.intersects(&BoundingBox::new(10.0, 0.0, 20.0, 10.0)));
        assert!(!a.intersects(&BoundingBox::new(-5.0, 11.0, 5.0, 20.0)));
    }

    #[test]
    fn test_geographic_transform_matches_closed_form() {
        let transform = CrsTransform::for_epsg(4326).unwrap();
        let (lon, lat) = transform.to_source(1_000_000.0, 2_000_000.0).unwrap();
        let (x, y) = transform.to_mercator(lon, lat).unwrap();
        assert!((x - 1_000_000.0).abs() < 1e-3);
        assert!((y - 2_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_zoom_for_resolution() {
        assert_eq!(zoom_for_resolution(zoom_resolution(12, 256), 256), 12);
        assert_eq!(zoom_for_resolution(f64::NAN, 256), 0);
    }
}
