//! Source resolution through catalog items.
//!
//! A catalog item is a JSON document with a footprint `geometry` and an
//! `assets` map whose entries point at rasters through `href`. The document
//! is fetched once per request and never cached.

use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;
use url::Url;

use crate::error::{Result, TilerError};
use crate::raster::range::{check_local_allowed, normalize_address};

/// Keys under which an asset may carry its binary threshold
pub const THRESHOLD_KEYS: [&str; 2] = ["binary_threshold", "binaryThreshold"];

/// A fetched catalog document
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    url: String,
    document: Value,
}

/// One named asset of a catalog item
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub key: String,
    /// Raster address, resolved against the catalog URL
    pub href: String,
    /// Every field of the asset as found in the document
    pub fields: Map<String, Value>,
}

impl Asset {
    /// Threshold used by the summary product
    pub fn binary_threshold(&self) -> Result<f64> {
        let raw = THRESHOLD_KEYS
            .iter()
            .find_map(|key| self.fields.get(*key))
            .ok_or_else(|| {
                TilerError::invalid(
                    "binary_threshold",
                    format!("asset '{}' has no binary threshold", self.key),
                )
            })?;
        match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            TilerError::invalid(
                "binary_threshold",
                format!("asset '{}' has a non-numeric threshold: {}", self.key, raw),
            )
        })
    }
}

impl CatalogItem {
    /// Wrap a parsed document; `url` is used to resolve relative hrefs
    pub fn from_value(url: impl Into<String>, document: Value) -> Result<Self> {
        let url = url.into();
        if !document.is_object() {
            return Err(TilerError::UpstreamFetch {
                url,
                message: "catalog document is not a JSON object".to_string(),
            });
        }
        Ok(Self { url, document })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The document exactly as fetched
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Footprint geometry, `null` when the item has none
    pub fn geometry(&self) -> &Value {
        self.document.get("geometry").unwrap_or(&Value::Null)
    }

    /// Asset keys in document order
    pub fn asset_keys(&self) -> Vec<String> {
        self.document
            .get("assets")
            .and_then(Value::as_object)
            .map(|assets| assets.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up an asset and resolve its href
    pub fn asset(&self, key: &str) -> Result<Asset> {
        let fields = self
            .document
            .get("assets")
            .and_then(|assets| assets.get(key))
            .and_then(Value::as_object)
            .ok_or_else(|| TilerError::AssetNotFound {
                key: key.to_string(),
                available: self.asset_keys(),
            })?;

        let href = fields
            .get("href")
            .and_then(Value::as_str)
            .filter(|href| !href.is_empty())
            .ok_or_else(|| TilerError::UpstreamFetch {
                url: self.url.clone(),
                message: format!("asset '{}' has no href", key),
            })?;

        Ok(Asset {
            key: key.to_string(),
            href: resolve_href(&self.url, href),
            fields: fields.clone(),
        })
    }
}

/// Resolve a possibly relative asset href against the catalog location.
pub fn resolve_href(catalog_url: &str, href: &str) -> String {
    if Url::parse(href).is_ok() || href.starts_with('/') {
        return href.to_string();
    }
    if let Ok(base) = Url::parse(catalog_url) {
        if let Ok(joined) = base.join(href) {
            return joined.to_string();
        }
    }
    match PathBuf::from(catalog_url).parent() {
        Some(parent) => parent.join(href).to_string_lossy().into_owned(),
        None => href.to_string(),
    }
}

/// Fetch and parse a catalog item from http(s), s3, `file://` or a local path.
///
/// Local addresses are refused unless `allow_local` is set.
pub async fn fetch_catalog(
    client: &reqwest::Client,
    url: &str,
    allow_local: bool,
) -> Result<CatalogItem> {
    check_local_allowed(url, allow_local)?;
    let start = Instant::now();
    let address = normalize_address(url);
    let fail = |message: String| TilerError::UpstreamFetch {
        url: url.to_string(),
        message,
    };

    let body = if address.starts_with("http://") || address.starts_with("https://") {
        let response = client
            .get(&address)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("server returned {}", status)));
        }
        response
            .bytes()
            .await
            .map_err(|e| fail(e.to_string()))?
            .to_vec()
    } else {
        let path = match Url::parse(&address) {
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .map_err(|_| fail("invalid file URL".to_string()))?,
            Ok(parsed) if parsed.scheme().len() > 1 => {
                return Err(fail(format!("unsupported scheme '{}'", parsed.scheme())))
            }
            _ => PathBuf::from(&address),
        };
        tokio::fs::read(&path)
            .await
            .map_err(|e| fail(e.to_string()))?
    };

    let document: Value = serde_json::from_slice(&body)
        .map_err(|e| fail(format!("invalid JSON: {}", e)))?;

    debug!(
        url = url,
        bytes = body.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Fetched catalog item"
    );
    CatalogItem::from_value(url, document)
}
