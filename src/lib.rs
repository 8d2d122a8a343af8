//! # stac-tiler
//!
//! On-demand map tiles from Cloud-Optimized GeoTIFFs, addressed directly or
//! through the assets of a STAC catalog item.
//!
//! ## Products
//!
//! - **Tiles**: a Web Mercator tile of selected bands, optionally stretched
//!   to the tile's own value range, encoded as JPEG, PNG or TIFF
//! - **Processing**: band-math expressions rescaled to 8 bits and colored
//! - **Summary**: a tile thresholded against the asset's `binary_threshold`,
//!   reported as a pixel count plus the polygons of every connected region
//!
//! ## Architecture
//!
//! Query parsing (`params`) feeds source resolution (`catalog`), then the
//! windowed reader (`raster`) and one of the output pipelines (`render`,
//! `summary`). Handlers keep no state between requests.

pub mod catalog;
pub mod colormaps;
pub mod config;
pub mod error;
pub mod expression;
pub mod handlers;
pub mod logging;
pub mod mercator;
pub mod params;
pub mod raster;
pub mod render;
pub mod resampling;
pub mod router;
pub mod state;
pub mod summary;
pub mod vectorize;

pub use config::Config;
pub use error::{Result, TilerError};
pub use logging::{
    create_http_trace_layer, generate_request_id, init_tracing, log_operation_end,
    log_operation_start, log_request_error,
};
pub use router::build_router;
pub use state::AppState;
