//! HTTP client utilities for testing.
//!
//! Helpers for making requests to a stac-tiler server started by the tests.

use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;
use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

/// Default timeout for HTTP requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a default test client
pub fn create_test_client() -> Client {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .expect("Failed to build test HTTP client")
}

/// Build a URL for a server endpoint
pub fn build_url(addr: &SocketAddr, path: &str) -> Url {
    format!("http://{}{}", addr, path)
        .parse()
        .expect("Failed to parse URL")
}

/// Make a GET request; query values are percent-encoded
pub async fn get(
    addr: &SocketAddr,
    path: &str,
    query: &[(&str, &str)],
) -> Result<Response, Box<dyn Error>> {
    let url = build_url(addr, path);
    Ok(create_test_client().get(url).query(query).send().await?)
}

/// Make a GET request and parse the JSON response, which must be 200
pub async fn get_json(
    addr: &SocketAddr,
    path: &str,
    query: &[(&str, &str)],
) -> Result<Value, Box<dyn Error>> {
    let response = expect_ok(get(addr, path, query).await?).await?;
    Ok(response.json::<Value>().await?)
}

/// Download an image, which must be served with status 200
pub async fn get_image(
    addr: &SocketAddr,
    path: &str,
    query: &[(&str, &str)],
) -> Result<(String, Vec<u8>), Box<dyn Error>> {
    let response = expect_ok(get(addr, path, query).await?).await?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Ok((content_type, response.bytes().await?.to_vec()))
}

async fn expect_ok(response: Response) -> Result<Response, Box<dyn Error>> {
    if response.status() != StatusCode::OK {
        return Err(format!(
            "Unexpected status code: {}, body: {:?}",
            response.status(),
            response.text().await
        )
        .into());
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let addr: SocketAddr = ([127, 0, 0, 1], 8000).into();
        let url = build_url(&addr, "/tiles/1/0/0.png");
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/tiles/1/0/0.png");
    }
}
