//! Raster bounds endpoint.

use axum::{
    extract::{Query, State},
    response::Response,
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::{finish, run_blocking};
use crate::error::TilerError;
use crate::logging::generate_request_id;
use crate::params::{Endpoint, RawQuery, TileRequestParams};
use crate::state::AppState;

/// Handle GET /bounds: footprint of the raster at `url` in EPSG:4326
pub async fn bounds_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RawQuery>,
) -> Response {
    let request_id = generate_request_id();
    let start_time = Instant::now();

    debug!(
        endpoint = "/bounds",
        request_id = %request_id,
        url = ?query.get("url"),
        "Processing bounds request"
    );

    let result = async {
        let params = TileRequestParams::parse(&query, Endpoint::Bounds)?;
        let reader = state.reader.clone();
        let info = run_blocking(move || reader.info(&params.source_url)).await?;
        Ok::<_, TilerError>(Json(info))
    }
    .await;

    finish("/bounds", &request_id, start_time, None, result)
}
