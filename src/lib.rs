//! Anycast Endpoint Scanner
//!
//! Expands a list of candidate addresses and CIDR blocks, probes every
//! endpoint for latency and identity over a pinned connection, measures
//! download throughput on the survivors, then ranks and exports them.

pub mod aggregate;
pub mod app;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod expander;
pub mod logging;
pub mod models;
pub mod output;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::{Config, DownloadMeasurement, Endpoint, ProbeResult, SpeedTestResult};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_IP_FILE: &str = "ip.txt";
    pub const DEFAULT_OUTPUT_FILE: &str = "ip.csv";
    pub const DEFAULT_PORT: u16 = 443;
    pub const DEFAULT_CONCURRENCY: usize = 100;
    pub const DEFAULT_DOWNLOAD_THREADS: usize = 1;
    pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_DOWNLOAD_URL: &str = "speed.cloudflare.com/__down?bytes=100000000";
    pub const DEFAULT_TRACE_HOST: &str = "speed.cloudflare.com";
    pub const DEFAULT_MAX_DOWNLOAD_COUNT: usize = 10;
    pub const DEFAULT_MIN_SPEED: f64 = 1.0;
    pub const DEFAULT_LOCATIONS_FILE: &str = "locations.json";
    pub const DEFAULT_LOCATIONS_URL: &str = "https://speed.cloudflare.com/locations";
    pub const DEFAULT_ENABLE_COLOR: bool = true;

    /// Raw connect deadline
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
    /// Deadline for the trace request, measured from request start
    pub const TRACE_TIMEOUT: Duration = Duration::from_secs(2);
    /// Early-abort checkpoint of a download
    pub const EARLY_ABORT_AFTER: Duration = Duration::from_millis(1500);
    /// Early abort only applies when the download timeout exceeds this
    pub const EARLY_ABORT_MIN_TIMEOUT: Duration = Duration::from_secs(2);
    /// Abort when speed at the checkpoint is below this fraction of the minimum
    pub const EARLY_ABORT_RATIO: f64 = 0.7;
    /// Largest CIDR block that is enumerated
    pub const MAX_BLOCK_ADDRESSES: u128 = 1 << 24;

    pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
    pub const TRACE_PATH: &str = "/cdn-cgi/trace";
    pub const TRACE_MARKER: &str = "uag=Mozilla/5.0";
    pub const WEBSOCKET_PATH: &str = "/ws";
    pub const WEBSOCKET_KEY: &str = "B5ReGbZ38Rrogrznmh1TFQ==";
}
