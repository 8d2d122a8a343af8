//! Catalog-item endpoints.
//!
//! All `/stac` routes take the catalog item URL in `url`. The item is
//! fetched once per request; tile routes then read the raster behind
//! `assets[asset_key].href`.

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::tiles::render_source_tile;
use super::{finish, run_blocking, TilePath};
use crate::catalog::fetch_catalog;
use crate::error::TilerError;
use crate::logging::generate_request_id;
use crate::params::{Endpoint, RawQuery, TileRequestParams};
use crate::state::AppState;
use crate::summary::summarize;

/// Handle GET /stac/bounds: `{"geometry": ...}` of the catalog item
pub async fn stac_bounds_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RawQuery>,
) -> Response {
    let request_id = generate_request_id();
    let start_time = Instant::now();

    let result = async {
        let params = TileRequestParams::parse(&query, Endpoint::Bounds)?;
        let item = fetch_catalog(
            &state.client,
            &params.source_url,
            state.config.upstream.allow_local,
        )
        .await?;
        Ok::<_, TilerError>(Json(json!({ "geometry": item.geometry() })))
    }
    .await;

    finish("/stac/bounds", &request_id, start_time, None, result)
}

/// Handle GET /stac/info: the catalog item exactly as fetched
pub async fn stac_info_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RawQuery>,
) -> Response {
    let request_id = generate_request_id();
    let start_time = Instant::now();

    let result = async {
        let params = TileRequestParams::parse(&query, Endpoint::Bounds)?;
        let item = fetch_catalog(
            &state.client,
            &params.source_url,
            state.config.upstream.allow_local,
        )
        .await?;
        Ok::<_, TilerError>(Json(item.document().clone()))
    }
    .await;

    finish("/stac/info", &request_id, start_time, None, result)
}

/// Handle GET /stac/tiles/{z}/{x}/{y}.{ext}
pub async fn stac_tiles_handler(
    State(state): State<Arc<AppState>>,
    Path((z, x, y_ext)): Path<(String, String, String)>,
    Query(query): Query<RawQuery>,
) -> Response {
    let request_id = generate_request_id();
    let start_time = Instant::now();

    debug!(
        endpoint = "/stac/tiles",
        request_id = %request_id,
        z = %z,
        x = %x,
        y = %y_ext,
        asset_key = ?query.get("asset_key"),
        "Processing catalog tile request"
    );

    let result = async {
        let path = TilePath::parse(&z, &x, &y_ext)?;
        let params = TileRequestParams::parse(&query, Endpoint::Tiles)?;
        let item = fetch_catalog(
            &state.client,
            &params.source_url,
            state.config.upstream.allow_local,
        )
        .await?;
        let asset = item.asset(&params.asset_key)?;
        render_source_tile(state.reader.clone(), asset.href, path, params).await
    }
    .await;

    finish("/stac/tiles", &request_id, start_time, None, result)
}

/// Handle GET /stac/summary/{z}/{x}/{y}.{ext}
///
/// The extension is accepted for symmetry with the tile routes; the body is
/// always JSON.
pub async fn stac_summary_handler(
    State(state): State<Arc<AppState>>,
    Path((z, x, y_ext)): Path<(String, String, String)>,
    Query(query): Query<RawQuery>,
) -> Response {
    let request_id = generate_request_id();
    let start_time = Instant::now();

    debug!(
        endpoint = "/stac/summary",
        request_id = %request_id,
        z = %z,
        x = %x,
        y = %y_ext,
        asset_key = ?query.get("asset_key"),
        "Processing summary request"
    );

    let result = async {
        let path = TilePath::parse(&z, &x, &y_ext)?;
        let params = TileRequestParams::parse(&query, Endpoint::Summary)?;
        let item = fetch_catalog(
            &state.client,
            &params.source_url,
            state.config.upstream.allow_local,
        )
        .await?;
        let asset = item.asset(&params.asset_key)?;
        asset.binary_threshold()?;
        path.tile.validate()?;

        let reader = state.reader.clone();
        let summary = run_blocking(move || {
            let tile = reader.tile(&asset.href, path.tile, &params.read_options())?;
            summarize(&tile, &asset, params.tile_size)
        })
        .await?;

        debug!(
            request_id = %request_id,
            pixel_count = summary.pixel_count,
            object_count = summary.object_count(),
            "Summary computed"
        );
        Ok::<_, TilerError>(Json(serde_json::to_value(&summary)?))
    }
    .await;

    finish("/stac/summary", &request_id, start_time, None, result)
}
