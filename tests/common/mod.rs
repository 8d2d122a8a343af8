//! Common test utilities for stac-tiler.
//!
//! Shared fixtures, HTTP helpers and assertions for the integration tests.

#![allow(dead_code)]

pub mod assertions;
pub mod http_client;
pub mod image_utils;
pub mod test_data;

use std::net::SocketAddr;

/// Start the real router on an ephemeral local port
pub async fn start_test_server() -> SocketAddr {
    let mut config = stac_tiler::Config::default();
    config.upstream.allow_local = true;
    let state = stac_tiler::AppState::new_shared(config).expect("Failed to build state");
    let app = stac_tiler::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test port");
    let addr = listener.local_addr().expect("Listener has no address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server error");
    });
    addr
}
