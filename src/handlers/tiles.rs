//! Direct tile endpoint.
//!
//! `GET /tiles/{z}/{x}/{y}.{ext}?url=...` reads the raster at `url` and
//! returns the rendered tile.

use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::{finish, image_response, run_blocking, TilePath};
use crate::error::Result;
use crate::logging::generate_request_id;
use crate::params::{Endpoint, RawQuery, TileRequestParams};
use crate::raster::TileReader;
use crate::render::render_tile;
use crate::state::AppState;

/// Handle GET /tiles/{z}/{x}/{y}.{ext}
pub async fn tile_handler(
    State(state): State<Arc<AppState>>,
    Path((z, x, y_ext)): Path<(String, String, String)>,
    Query(query): Query<RawQuery>,
) -> Response {
    let request_id = generate_request_id();
    let start_time = Instant::now();

    debug!(
        endpoint = "/tiles",
        request_id = %request_id,
        z = %z,
        x = %x,
        y = %y_ext,
        query = ?query,
        "Processing tile request"
    );

    let result = async {
        let path = TilePath::parse(&z, &x, &y_ext)?;
        let params = TileRequestParams::parse(&query, Endpoint::Tiles)?;
        let address = params.source_url.clone();
        render_source_tile(state.reader.clone(), address, path, params).await
    }
    .await;

    finish("/tiles", &request_id, start_time, None, result)
}

/// Read `address` at the requested tile and encode it.
///
/// Shared by the direct and catalog tile routes.
pub(crate) async fn render_source_tile(
    reader: Arc<dyn TileReader>,
    address: String,
    path: TilePath,
    params: TileRequestParams,
) -> Result<Response> {
    path.tile.validate()?;
    let format = path.format.clone();
    let bytes = run_blocking(move || {
        let tile = reader.tile(&address, path.tile, &params.read_options())?;
        render_tile(&tile, params.linear_stretch, &path.format)
    })
    .await?;
    Ok(image_response(bytes, &format))
}
