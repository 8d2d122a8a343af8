//! HTTP request handlers for the stac-tiler API.
//!
//! Every handler follows the same shape: generate a request id, parse the
//! query, run the pipeline, then log and answer. Raster work blocks, so it
//! runs on the blocking pool.

pub mod bounds;
pub mod heartbeat;
pub mod misc;
pub mod processing;
pub mod stac;
pub mod tiles;

pub use bounds::bounds_handler;
pub use heartbeat::heartbeat_handler;
pub use misc::{favicon_handler, fallback_handler};
pub use processing::processing_handler;
pub use stac::{stac_bounds_handler, stac_info_handler, stac_summary_handler, stac_tiles_handler};
pub use tiles::tile_handler;

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::info;

use crate::error::{Result, TilerError};
use crate::logging::log_request_error;
use crate::mercator::TileCoordinate;
use crate::params::OutputFormat;

/// Tile address and output format parsed from `/{z}/{x}/{y}.{ext}`
#[derive(Debug, Clone, PartialEq)]
pub struct TilePath {
    pub tile: TileCoordinate,
    pub format: OutputFormat,
}

impl TilePath {
    /// Parse the three path segments; the last one carries the extension
    pub fn parse(z: &str, x: &str, y_ext: &str) -> Result<Self> {
        let (y, ext) = y_ext
            .rsplit_once('.')
            .ok_or_else(|| TilerError::invalid("y", format!("'{}' has no extension", y_ext)))?;
        let tile = TileCoordinate::new(
            parse_segment("z", z)?,
            parse_segment("x", x)?,
            parse_segment("y", y)?,
        );
        Ok(Self {
            tile,
            format: OutputFormat::from_extension(ext),
        })
    }
}

fn parse_segment<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| TilerError::invalid(name, format!("'{}' is not a valid tile index", raw)))
}

/// Run blocking raster work off the async executor
pub async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| TilerError::Server {
            message: format!("Worker task failed: {}", e),
        })?
}

/// Encoded image bytes with the matching content type
pub fn image_response(bytes: Vec<u8>, format: &OutputFormat) -> Response {
    ([(header::CONTENT_TYPE, format.content_type())], bytes).into_response()
}

/// Log the outcome of a request and turn it into a response
pub fn finish<T: IntoResponse>(
    endpoint: &str,
    request_id: &str,
    start_time: Instant,
    params: Option<&str>,
    result: Result<T>,
) -> Response {
    match result {
        Ok(response) => {
            info!(
                endpoint = endpoint,
                request_id = %request_id,
                duration_ms = start_time.elapsed().as_millis() as u64,
                "Request successful"
            );
            response.into_response()
        }
        Err(error) => {
            log_request_error(&error, endpoint, request_id, params);
            error.into_response_with_id(request_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::Json;

    #[test]
    fn test_tile_path() {
        let path = TilePath::parse("10", "512", "340.jpg").unwrap();
        assert_eq!(path.tile, TileCoordinate::new(10, 512, 340));
        assert_eq!(path.format, OutputFormat::Jpeg);

        let path = TilePath::parse("3", "1", "2.webp").unwrap();
        assert_eq!(path.format, OutputFormat::Other("webp".to_string()));
    }

    #[test]
    fn test_tile_path_errors() {
        assert!(matches!(
            TilePath::parse("10", "512", "340"),
            Err(TilerError::InvalidParameter { .. })
        ));
        assert!(matches!(
            TilePath::parse("ten", "1", "1.png"),
            Err(TilerError::InvalidParameter { .. })
        ));
        assert!(matches!(
            TilePath::parse("1", "-1", "1.png"),
            Err(TilerError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_image_response_content_type() {
        let response = image_response(vec![1, 2, 3], &OutputFormat::Jpeg);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/jpeg"
        );
    }

    #[test]
    fn test_finish_maps_errors() {
        let result: Result<Json<u8>> = Err(TilerError::MissingParameter {
            param: "url".to_string(),
        });
        let response = finish("/tiles", "abc", Instant::now(), None, result);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        assert_eq!(run_blocking(|| Ok(7)).await.unwrap(), 7);
        let error = run_blocking::<u8, _>(|| Err(TilerError::raster("boom")))
            .await
            .unwrap_err();
        assert!(matches!(error, TilerError::RasterRead { .. }));
    }
}
