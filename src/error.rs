//! Error types for the stac-tiler application.
//!
//! Every stage of the tile pipeline reports failures through [`TilerError`].
//! Nothing is recovered locally: a failed stage aborts the request and the
//! error is turned into an HTTP response by its [`IntoResponse`] impl.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// The main error type for stac-tiler operations.
#[derive(Error, Debug)]
pub enum TilerError {
    /// A required query value is absent
    #[error("Missing parameter: {param}")]
    MissingParameter { param: String },

    /// A query value could not be parsed or is out of range
    #[error("Invalid parameter: {param} - {message}")]
    InvalidParameter { param: String, message: String },

    /// The catalog document could not be fetched or parsed
    #[error("Upstream fetch failed for {url}: {message}")]
    UpstreamFetch { url: String, message: String },

    /// The requested asset key is not in the catalog item
    #[error("Asset not found: {key} (available: {})", .available.join(", "))]
    AssetNotFound { key: String, available: Vec<String> },

    /// The tile coordinate is outside the grid or does not intersect the source
    #[error("Tile {z}/{x}/{y} is out of bounds: {message}")]
    TileOutOfBounds {
        z: u8,
        x: u32,
        y: u32,
        message: String,
    },

    /// Output format unsupported or encoding failed
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// Raster source could not be opened or decoded
    #[error("Raster read error: {message}")]
    RasterRead { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Server errors
    #[error("Server error: {message}")]
    Server { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TilerError {
    /// Shorthand for an [`TilerError::InvalidParameter`]
    pub fn invalid(param: impl Into<String>, message: impl Into<String>) -> Self {
        TilerError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`TilerError::RasterRead`]
    pub fn raster(message: impl Into<String>) -> Self {
        TilerError::RasterRead {
            message: message.into(),
        }
    }

    /// HTTP status reported for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            TilerError::MissingParameter { .. } | TilerError::InvalidParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            TilerError::AssetNotFound { .. } => StatusCode::NOT_FOUND,
            TilerError::UpstreamFetch { .. } => StatusCode::BAD_GATEWAY,
            TilerError::TileOutOfBounds { .. }
            | TilerError::Encoding { .. }
            | TilerError::RasterRead { .. }
            | TilerError::Config { .. }
            | TilerError::Server { .. }
            | TilerError::Io(_)
            | TilerError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            TilerError::MissingParameter { .. } => "MissingParameter",
            TilerError::InvalidParameter { .. } => "InvalidParameter",
            TilerError::UpstreamFetch { .. } => "UpstreamFetchError",
            TilerError::AssetNotFound { .. } => "AssetNotFound",
            TilerError::TileOutOfBounds { .. } => "TileOutOfBounds",
            TilerError::Encoding { .. } => "EncodingError",
            TilerError::RasterRead { .. } => "RasterReadError",
            TilerError::Config { .. } => "ConfigError",
            TilerError::Server { .. } => "ServerError",
            TilerError::Io(_) => "IoError",
            TilerError::Json(_) => "JsonError",
        }
    }

    /// Build the JSON error response, tagged with the request id
    pub fn into_response_with_id(self, request_id: &str) -> Response {
        (
            self.status_code(),
            Json(serde_json::json!({
                "error": self.to_string(),
                "kind": self.kind(),
                "request_id": request_id,
            })),
        )
            .into_response()
    }
}

impl IntoResponse for TilerError {
    fn into_response(self) -> Response {
        let request_id = crate::logging::generate_request_id();
        self.into_response_with_id(&request_id)
    }
}

/// Convenience type alias for Results with TilerError
pub type Result<T> = std::result::Result<T, TilerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            TilerError::MissingParameter {
                param: "url".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TilerError::invalid("tile", "not a number").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TilerError::TileOutOfBounds {
                z: 3,
                x: 1,
                y: 9,
                message: "outside grid".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            TilerError::UpstreamFetch {
                url: "http://x".to_string(),
                message: "refused".to_string()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_asset_not_found_message_lists_keys() {
        let error = TilerError::AssetNotFound {
            key: "mask".to_string(),
            available: vec!["raster".to_string(), "label".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Asset not found: mask (available: raster, label)"
        );
        assert_eq!(error.kind(), "AssetNotFound");
    }
}
