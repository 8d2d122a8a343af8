//! Query parameter parsing and validation.
//!
//! Every route receives its query string as a plain string map. This module
//! turns that map into a [`TileRequestParams`] with named fields and
//! documented defaults, so no handler deals with raw strings. Parsing never
//! touches the network or the raster source.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TilerError};
use crate::raster::ReadOptions;
use crate::resampling::ResamplingMethod;

/// Default output tile size in pixels
pub const DEFAULT_TILE_SIZE: usize = 512;

/// Largest tile size accepted from clients
pub const MAX_TILE_SIZE: usize = 4096;

/// Default asset key looked up in catalog items
pub const DEFAULT_ASSET_KEY: &str = "raster";

/// Default input range for band-math rescaling
pub const DEFAULT_RESCALE_RANGE: (f64, f64) = (-1.0, 1.0);

/// Default colormap for the processing product
pub const DEFAULT_PROCESSING_COLORMAP: &str = "cfastie";

/// Band indexes used by composite RGB routes when none are given
pub const RGB_INDEXES: [usize; 3] = [1, 2, 3];

/// Raw query values as received on the wire
pub type RawQuery = HashMap<String, String>;

/// Which route family is being parsed; decides defaults and required keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `/tiles` and `/stac/tiles`: indexes left to the source
    Tiles,
    /// Composite RGB tiling: indexes default to `(1, 2, 3)`
    Composite,
    /// `/processing`: band-math expression required
    Processing,
    /// `/stac/summary`
    Summary,
    /// `/bounds`, `/stac/bounds`, `/stac/info`
    Bounds,
}

/// Validated request descriptor, built once per request
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequestParams {
    /// Raster URL (direct routes) or catalog URL (`/stac` routes)
    pub source_url: String,
    /// Asset looked up in the catalog item
    pub asset_key: String,
    /// 1-based band indexes; `None` lets the source decide
    pub band_indexes: Option<Vec<usize>>,
    /// Output tile edge in pixels
    pub tile_size: usize,
    /// Nodata override; `None` uses the source's own nodata
    pub nodata: Option<f64>,
    /// Stretch the tile's observed min/max before encoding
    pub linear_stretch: bool,
    /// Input range for the band-math rescale
    pub rescale_range: (f64, f64),
    /// Band-math expression (processing product only)
    pub expression: Option<String>,
    /// Resampling used when reading the window
    pub resampling: ResamplingMethod,
    /// Colormap for the processing product
    pub color_map: String,
}

impl TileRequestParams {
    /// Parse the raw query map for the given route family
    pub fn parse(query: &RawQuery, endpoint: Endpoint) -> Result<Self> {
        let source_url = required(query, "url")?.to_string();

        let band_indexes = match optional(query, "indexes") {
            Some(raw) => parse_indexes(raw)?,
            None => None,
        }
        .or_else(|| (endpoint == Endpoint::Composite).then(|| RGB_INDEXES.to_vec()));

        let tile_size = optional(query, "tile")
            .map(parse_tile_size)
            .transpose()?
            .unwrap_or(DEFAULT_TILE_SIZE);

        let nodata = optional(query, "nodata").map(parse_nodata).transpose()?;

        let linear_stretch = optional(query, "linearStretch")
            .map(|raw| parse_bool("linearStretch", raw))
            .transpose()?
            .unwrap_or(false);

        let rescale_range = optional(query, "range")
            .map(parse_range)
            .transpose()?
            .unwrap_or(DEFAULT_RESCALE_RANGE);

        let expression = optional(query, "ratio")
            .or_else(|| optional(query, "expression"))
            .map(str::to_string);
        if endpoint == Endpoint::Processing && expression.is_none() {
            return Err(TilerError::MissingParameter {
                param: "ratio".to_string(),
            });
        }

        let resampling = optional(query, "resampling")
            .map(ResamplingMethod::from_str)
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            source_url,
            asset_key: optional(query, "asset_key")
                .unwrap_or(DEFAULT_ASSET_KEY)
                .to_string(),
            band_indexes,
            tile_size,
            nodata,
            linear_stretch,
            rescale_range,
            expression,
            resampling,
            color_map: optional(query, "color_map")
                .unwrap_or(DEFAULT_PROCESSING_COLORMAP)
                .to_lowercase(),
        })
    }
}

impl TileRequestParams {
    /// Read options for the tile extractor
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            indexes: self.band_indexes.clone(),
            tile_size: self.tile_size,
            nodata: self.nodata,
            resampling: self.resampling,
        }
    }
}

/// Fetch a required key, treating empty values as absent
fn required<'a>(query: &'a RawQuery, key: &str) -> Result<&'a str> {
    optional(query, key).ok_or_else(|| TilerError::MissingParameter {
        param: key.to_string(),
    })
}

fn optional<'a>(query: &'a RawQuery, key: &str) -> Option<&'a str> {
    query
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Extract every run of digits as a 1-based band index.
///
/// `"1,2,3"`, `"(1, 2, 3)"` and `"b1b2b3"` all give `[1, 2, 3]`; a value
/// with no digits at all is treated as absent.
pub fn parse_indexes(raw: &str) -> Result<Option<Vec<usize>>> {
    let mut indexes = Vec::new();
    for run in raw.split(|c: char| !c.is_ascii_digit()).filter(|s| !s.is_empty()) {
        let index: usize = run
            .parse()
            .map_err(|_| TilerError::invalid("indexes", format!("'{}' is too large", run)))?;
        if index == 0 {
            return Err(TilerError::invalid("indexes", "band indexes are 1-based"));
        }
        indexes.push(index);
    }
    Ok((!indexes.is_empty()).then_some(indexes))
}

/// Parse the output tile size
pub fn parse_tile_size(raw: &str) -> Result<usize> {
    let size: usize = raw
        .parse()
        .map_err(|_| TilerError::invalid("tile", format!("'{}' is not a positive integer", raw)))?;
    if size == 0 || size > MAX_TILE_SIZE {
        return Err(TilerError::invalid(
            "tile",
            format!("must be between 1 and {}", MAX_TILE_SIZE),
        ));
    }
    Ok(size)
}

/// Parse a nodata override: an integer, or `nan`
pub fn parse_nodata(raw: &str) -> Result<f64> {
    if raw.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    raw.parse::<i64>()
        .map(|v| v as f64)
        .map_err(|_| TilerError::invalid("nodata", format!("'{}' is not an integer", raw)))
}

/// Tolerant boolean grammar (`yes/no`, `true/false`, `on/off`, `1/0`, ...)
pub fn parse_bool(param: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        _ => Err(TilerError::invalid(
            param,
            format!("'{}' is not a boolean value", raw),
        )),
    }
}

/// Parse a two-number range such as `-1,1` or `[0, 0.5]`
pub fn parse_range(raw: &str) -> Result<(f64, f64)> {
    let values = raw
        .split(|c: char| c == ',' || c == '[' || c == ']' || c == '(' || c == ')' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| TilerError::invalid("range", format!("'{}' is not a number", s)))
        })
        .collect::<Result<Vec<f64>>>()?;

    match values.as_slice() {
        [min, max] if min.is_finite() && max.is_finite() && min != max => Ok((*min, *max)),
        [_, _] => Err(TilerError::invalid(
            "range",
            "range bounds must be finite and distinct",
        )),
        _ => Err(TilerError::invalid(
            "range",
            format!("expected two numbers, got {}", values.len()),
        )),
    }
}

/// Output image format derived from the path extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Tiff,
    /// Any other extension; rejected by the encoder
    Other(String),
}

impl OutputFormat {
    /// Map a path extension to a format (`jpg` is an alias for `jpeg`)
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "png" => OutputFormat::Png,
            "jpg" | "jpeg" => OutputFormat::Jpeg,
            "tif" | "tiff" => OutputFormat::Tiff,
            other => OutputFormat::Other(other.to_string()),
        }
    }

    /// Encoder identifier (`jpeg`, `png`, ...)
    pub fn name(&self) -> &str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Other(name) => name,
        }
    }

    /// Content type of the encoded image
    pub fn content_type(&self) -> String {
        format!("image/{}", self.name())
    }

    /// Whether the format can carry the validity mask as alpha
    pub fn supports_alpha(&self) -> bool {
        matches!(self, OutputFormat::Png | OutputFormat::Tiff)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
