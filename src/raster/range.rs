//! Byte-range access to raster sources.
//!
//! A GeoTIFF is only ever touched through [`RangeReader::read_range`], so the
//! same decoder works over a local file or an HTTP server that honours
//! `Range` requests. [`BlockCursor`] adapts a range reader to `Read + Seek`
//! and keeps fetched blocks for the lifetime of one request.

use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::debug;

use crate::error::{Result, TilerError};

/// Random access to the bytes of a raster source.
pub trait RangeReader: Send + Sync {
    /// Read `length` bytes starting at `offset`
    fn read_range(&self, offset: u64, length: usize) -> Result<Bytes>;

    /// Total size of the source in bytes
    fn size(&self) -> u64;

    /// Address used in log lines and error messages
    fn identifier(&self) -> &str;
}

/// Reads ranges from a file on disk.
pub struct LocalRangeReader {
    path: PathBuf,
    display: String,
    size: u64,
}

impl LocalRangeReader {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)
            .map_err(|e| TilerError::raster(format!("cannot open {}: {}", path.display(), e)))?
            .len();
        let display = path.display().to_string();
        Ok(Self {
            path,
            display,
            size,
        })
    }
}

impl RangeReader for LocalRangeReader {
    fn read_range(&self, offset: u64, length: usize) -> Result<Bytes> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; length];
        file.read_exact(&mut buffer)?;
        Ok(Bytes::from(buffer))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.display
    }
}

/// Reads ranges over HTTP with `Range` requests.
///
/// Must be called from a blocking context; each read drives the async
/// client on the runtime behind `handle`.
pub struct HttpRangeReader {
    url: String,
    size: u64,
    client: reqwest::Client,
    handle: Handle,
}

impl HttpRangeReader {
    pub fn new(url: &str, client: reqwest::Client, handle: Handle) -> Result<Self> {
        let size = handle.block_on(probe_size(&client, url))?;
        debug!(url = url, size = size, "Opened remote raster");
        Ok(Self {
            url: url.to_string(),
            size,
            client,
            handle,
        })
    }
}

impl RangeReader for HttpRangeReader {
    fn read_range(&self, offset: u64, length: usize) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let end = offset + length as u64 - 1;
        let range = format!("bytes={}-{}", offset, end);
        let url = self.url.as_str();

        self.handle.block_on(async {
            let response = self
                .client
                .get(url)
                .header(RANGE, range)
                .send()
                .await
                .map_err(|e| TilerError::raster(format!("range request to {} failed: {}", url, e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(TilerError::raster(format!(
                    "range request to {} returned {}",
                    url, status
                )));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| TilerError::raster(format!("reading {} failed: {}", url, e)))?;

            // A server that ignores Range sends the whole object back
            if status == reqwest::StatusCode::OK && body.len() > length {
                let start = offset as usize;
                if start >= body.len() {
                    return Ok(Bytes::new());
                }
                let stop = (start + length).min(body.len());
                return Ok(body.slice(start..stop));
            }
            Ok(body)
        })
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.url
    }
}

/// Find the object size from HEAD, falling back to a one-byte ranged GET.
async fn probe_size(client: &reqwest::Client, url: &str) -> Result<u64> {
    let fail = |message: String| TilerError::raster(format!("cannot open {}: {}", url, message));

    if let Ok(response) = client.head(url).send().await {
        if response.status().is_success() {
            let length = response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            if let Some(length) = length.filter(|&l| l > 0) {
                return Ok(length);
            }
        }
    }

    let response = client
        .get(url)
        .header(RANGE, "bytes=0-0")
        .send()
        .await
        .map_err(|e| fail(e.to_string()))?;
    if !response.status().is_success() {
        return Err(fail(format!("server returned {}", response.status())));
    }

    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_content_range_total)
        .ok_or_else(|| fail("server did not report a content length".to_string()))
}

/// Total size from a `Content-Range: bytes 0-0/12345` header
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

/// Rewrite `s3://bucket/key` into the public virtual-hosted HTTPS form.
pub fn normalize_address(address: &str) -> String {
    match address.strip_prefix("s3://") {
        Some(rest) => match rest.split_once('/') {
            Some((bucket, key)) => format!("https://{}.s3.amazonaws.com/{}", bucket, key),
            None => format!("https://{}.s3.amazonaws.com/", rest),
        },
        None => address.to_string(),
    }
}

/// Whether an address is fetched over the network (http, https or s3)
pub fn is_remote(address: &str) -> bool {
    let address = normalize_address(address);
    address.starts_with("http://") || address.starts_with("https://")
}

/// Reject local addresses unless local sources are enabled
pub fn check_local_allowed(address: &str, allow_local: bool) -> Result<()> {
    if allow_local || is_remote(address) {
        return Ok(());
    }
    Err(TilerError::invalid(
        "url",
        format!("'{}' is not an http(s) or s3 URL and local sources are disabled", address),
    ))
}

/// Pick a range reader for a raster address: http(s), s3, file:// or a plain path.
///
/// Local addresses are refused unless `allow_local` is set. Remote sources
/// need a Tokio runtime context (the blocking pool has one).
pub fn open_range_reader(
    address: &str,
    client: &reqwest::Client,
    allow_local: bool,
) -> Result<Arc<dyn RangeReader>> {
    check_local_allowed(address, allow_local)?;
    let address = normalize_address(address);
    if is_remote(&address) {
        let handle = Handle::try_current()
            .map_err(|e| TilerError::raster(format!("no runtime for remote reads: {}", e)))?;
        return Ok(Arc::new(HttpRangeReader::new(
            &address,
            client.clone(),
            handle,
        )?));
    }

    let path = match url::Url::parse(&address) {
        Ok(parsed) if parsed.scheme() == "file" => parsed
            .to_file_path()
            .map_err(|_| TilerError::raster(format!("invalid file URL: {}", address)))?,
        _ => PathBuf::from(&address),
    };
    Ok(Arc::new(LocalRangeReader::new(path)?))
}

/// A seekable view over a [`RangeReader`] that fetches aligned blocks.
///
/// Clones share the block cache but keep their own position.
#[derive(Clone)]
pub struct BlockCursor {
    reader: Arc<dyn RangeReader>,
    block_size: u64,
    position: u64,
    blocks: Arc<Mutex<HashMap<u64, Bytes>>>,
}

impl BlockCursor {
    pub fn new(reader: Arc<dyn RangeReader>, block_size: usize) -> Self {
        Self {
            reader,
            block_size: block_size.max(512) as u64,
            position: 0,
            blocks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of blocks fetched so far
    pub fn cached_blocks(&self) -> usize {
        self.blocks.lock().map(|blocks| blocks.len()).unwrap_or(0)
    }

    fn block(&self, index: u64) -> io::Result<Bytes> {
        if let Ok(blocks) = self.blocks.lock() {
            if let Some(block) = blocks.get(&index) {
                return Ok(block.clone());
            }
        }

        let start = index * self.block_size;
        let length = self.block_size.min(self.reader.size().saturating_sub(start)) as usize;
        let block = self
            .reader
            .read_range(start, length)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        if let Ok(mut blocks) = self.blocks.lock() {
            blocks.insert(index, block.clone());
        }
        Ok(block)
    }
}

impl Read for BlockCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let size = self.reader.size();
        if buf.is_empty() || self.position >= size {
            return Ok(0);
        }

        let mut written = 0;
        while written < buf.len() && self.position < size {
            let index = self.position / self.block_size;
            let offset = (self.position % self.block_size) as usize;
            let block = self.block(index)?;
            if offset >= block.len() {
                break;
            }
            let count = (block.len() - offset).min(buf.len() - written);
            buf[written..written + count].copy_from_slice(&block[offset..offset + count]);
            written += count;
            self.position += count as u64;
        }
        Ok(written)
    }
}

impl Seek for BlockCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.reader.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of source",
            )),
        }
    }
}
