//! Favicon and fallback routes.

use axum::{
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::logging::generate_request_id;

/// Handle GET /favicon.ico: there is no icon, answer 400 with an empty body
pub async fn favicon_handler() -> Response {
    (
        StatusCode::BAD_REQUEST,
        [(header::CONTENT_TYPE, "text/plain")],
        "",
    )
        .into_response()
}

/// Any unmatched route
pub async fn fallback_handler(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({
            "error": format!("No route for {}", uri.path()),
            "kind": "NotFound",
            "request_id": generate_request_id(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_favicon() {
        let response = favicon_handler().await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
    }

    #[tokio::test]
    async fn test_fallback() {
        let response = fallback_handler(Uri::from_static("/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
