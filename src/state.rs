//! Application state shared by all handlers.
//!
//! Nothing in here changes after startup: requests share the HTTP client and
//! the tile reader, and keep every per-request buffer to themselves.

use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, TilerError};
use crate::raster::{CogReader, TileReader};

/// The main application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Client for catalog fetches and raster range reads
    pub client: reqwest::Client,
    pub reader: Arc<dyn TileReader>,
    /// Unique per server instance
    pub server_id: String,
    pub start_time: Instant,
}

impl AppState {
    /// Create the state with an HTTP client built from the upstream settings
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout())
            .user_agent(config.upstream.user_agent.clone())
            .build()
            .map_err(|e| TilerError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        let reader = Arc::new(
            CogReader::new(client.clone(), config.upstream.block_size)
                .allow_local(config.upstream.allow_local),
        );
        Ok(Self::with_reader(config, client, reader))
    }

    /// Create the state around an existing tile reader
    pub fn with_reader(
        config: Config,
        client: reqwest::Client,
        reader: Arc<dyn TileReader>,
    ) -> Self {
        Self {
            config,
            client,
            reader,
            server_id: Uuid::new_v4().to_string(),
            start_time: Instant::now(),
        }
    }

    /// Create a new AppState wrapped in an Arc for shared ownership
    pub fn new_shared(config: Config) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::new(config)?))
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}
