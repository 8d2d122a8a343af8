//! Configuration management for stac-tiler.
//!
//! Settings are layered with the following precedence:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables (`STAC_TILER_*`)
//! 3. JSON config file
//! 4. Default values (lowest priority)

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TilerError};

/// Command-line arguments for stac-tiler
#[derive(Parser, Debug, Default)]
#[command(name = "stac-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host address to bind to
    #[arg(short = 'H', long, env = "STAC_TILER_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "STAC_TILER_PORT")]
    pub port: Option<u16>,

    /// Number of runtime worker threads
    #[arg(short, long, env = "STAC_TILER_WORKERS")]
    pub workers: Option<usize>,

    /// Path to JSON configuration file
    #[arg(short, long, env = "STAC_TILER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Timeout for catalog and raster fetches, in seconds
    #[arg(long, env = "STAC_TILER_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Block size of raster range reads, in bytes
    #[arg(long, env = "STAC_TILER_BLOCK_SIZE")]
    pub block_size: Option<usize>,

    /// Serve `file://` URLs and bare paths from the local disk (true/false)
    #[arg(long, env = "STAC_TILER_ALLOW_LOCAL")]
    pub allow_local: Option<bool>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "STAC_TILER_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads (None = number of CPU cores)
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Settings for everything fetched from outside: catalogs and rasters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Range reads are aligned to blocks of this many bytes
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Whether `url` may name a local file; off by default
    #[serde(default)]
    pub allow_local: bool,
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with proper precedence
    pub fn load() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Build the configuration from already parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load_from_file(path)?,
            None => Config::default(),
        };
        config.apply_args(args);
        Ok(config)
    }

    /// Load configuration from a JSON file
    fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TilerError::Config {
            message: format!("Cannot read config file {}: {}", path.display(), e),
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Overlay every argument that was given on the command line or environment
    fn apply_args(&mut self, args: Args) {
        if let Some(host) = args.host {
            self.server.host = host;
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if args.workers.is_some() {
            self.server.workers = args.workers;
        }
        if let Some(timeout) = args.timeout_secs {
            self.upstream.timeout_secs = timeout;
        }
        if let Some(block_size) = args.block_size {
            self.upstream.block_size = block_size;
        }
        if let Some(allow_local) = args.allow_local {
            self.upstream.allow_local = allow_local;
        }
        if let Some(level) = args.log_level {
            self.log_level = level;
        }
    }

    /// Timeout applied to every upstream request
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(TilerError::Config {
                message: "Server host cannot be empty".to_string(),
            });
        }

        if self.server.port == 0 {
            return Err(TilerError::Config {
                message: "Server port cannot be 0".to_string(),
            });
        }

        if self.server.workers == Some(0) {
            return Err(TilerError::Config {
                message: "Worker count must be at least 1".to_string(),
            });
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(TilerError::Config {
                    message: format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        self.log_level
                    ),
                });
            }
        }

        if self.upstream.timeout_secs == 0 {
            return Err(TilerError::Config {
                message: "Upstream timeout must be at least 1 second".to_string(),
            });
        }

        if self.upstream.block_size == 0 {
            return Err(TilerError::Config {
                message: "Range-read block size cannot be 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            block_size: default_block_size(),
            allow_local: false,
        }
    }
}

// Default value functions for serde
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("stac-tiler/{}", env!("CARGO_PKG_VERSION"))
}

fn default_block_size() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}
