//! Route table of the tile server.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::{
    bounds_handler, fallback_handler, favicon_handler, heartbeat_handler, processing_handler,
    stac_bounds_handler, stac_info_handler, stac_summary_handler, stac_tiles_handler,
    tile_handler,
};
use crate::logging::create_http_trace_layer;
use crate::state::AppState;

/// Build the router; every route is GET with permissive CORS
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/bounds", get(bounds_handler))
        .route("/tiles/:z/:x/:y_ext", get(tile_handler))
        .route("/processing/:z/:x/:y_ext", get(processing_handler))
        .route("/stac/bounds", get(stac_bounds_handler))
        .route("/stac/info", get(stac_info_handler))
        .route("/stac/tiles/:z/:x/:y_ext", get(stac_tiles_handler))
        .route("/stac/summary/:z/:x/:y_ext", get(stac_summary_handler))
        .route("/favicon.ico", get(favicon_handler))
        .route("/heartbeat", get(heartbeat_handler))
        .fallback(fallback_handler)
        .layer(create_http_trace_layer())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router() -> Router {
        build_router(AppState::new_shared(Config::default()).unwrap())
    }

    async fn status_of(uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        router().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_routes_are_mounted() {
        assert_eq!(status_of("/heartbeat").await, StatusCode::OK);
        assert_eq!(status_of("/favicon.ico").await, StatusCode::BAD_REQUEST);
        // Mounted, but the source url is missing
        assert_eq!(status_of("/tiles/0/0/0.png").await, StatusCode::BAD_REQUEST);
        assert_eq!(status_of("/stac/summary/0/0/0.png").await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_path_falls_back() {
        assert_eq!(status_of("/wms").await, StatusCode::NOT_FOUND);
        assert_eq!(status_of("/tiles/0/0").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_only_get_is_routed() {
        let request = Request::builder()
            .method("POST")
            .uri("/heartbeat")
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
