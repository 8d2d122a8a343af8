//! Band-math endpoint.
//!
//! `GET /processing/{z}/{x}/{y}.{ext}?url=...&ratio=...` evaluates one or
//! more expressions over the source bands, rescales the result from `range`
//! to 8 bits and colors single-band output with `color_map`.

use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::{finish, image_response, run_blocking, TilePath};
use crate::colormaps::get_colormap;
use crate::error::{Result, TilerError};
use crate::expression::BandMath;
use crate::logging::generate_request_id;
use crate::params::{Endpoint, RawQuery, TileRequestParams};
use crate::raster::ReadOptions;
use crate::render::render_processing;
use crate::state::AppState;

/// Handle GET /processing/{z}/{x}/{y}.{ext}
pub async fn processing_handler(
    State(state): State<Arc<AppState>>,
    Path((z, x, y_ext)): Path<(String, String, String)>,
    Query(query): Query<RawQuery>,
) -> Response {
    let request_id = generate_request_id();
    let start_time = Instant::now();

    debug!(
        endpoint = "/processing",
        request_id = %request_id,
        z = %z,
        x = %x,
        y = %y_ext,
        ratio = ?query.get("ratio"),
        "Processing band-math request"
    );

    let ratio = query.get("ratio").cloned();
    let result = async {
        let path = TilePath::parse(&z, &x, &y_ext)?;
        let params = TileRequestParams::parse(&query, Endpoint::Processing)?;
        path.tile.validate()?;

        let expression = params
            .expression
            .as_deref()
            .ok_or_else(|| TilerError::MissingParameter {
                param: "ratio".to_string(),
            })?;
        let math = BandMath::parse(expression)?;
        let colormap = get_colormap(&params.color_map)?;
        let bands = math.bands();
        if bands.is_empty() {
            return Err(TilerError::invalid(
                "ratio",
                "expression does not reference any band",
            ));
        }

        let reader = state.reader.clone();
        let format = path.format.clone();
        let bytes = run_blocking(move || -> Result<Vec<u8>> {
            let options = ReadOptions {
                indexes: Some(bands.clone()),
                ..params.read_options()
            };
            let tile = reader.tile(&params.source_url, path.tile, &options)?;
            let derived = math.evaluate(&tile, &bands)?;
            render_processing(&derived, params.rescale_range, colormap.as_ref(), &path.format)
        })
        .await?;
        Ok::<_, TilerError>(image_response(bytes, &format))
    }
    .await;

    finish(
        "/processing",
        &request_id,
        start_time,
        ratio.as_deref(),
        result,
    )
}
