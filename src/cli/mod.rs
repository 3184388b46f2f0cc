//! Command-line interface

use crate::types::ProbeProtocol;
use clap::Parser;
use std::path::PathBuf;

/// Anycast endpoint scanner - finds the fastest IP:port endpoints of an anycast edge network
///
/// Every flag left out keeps the value from the environment, a `.env` file, or the default.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "aes")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Input file with one IP, IP:port, CIDR or CIDR:port per line
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub ip_file: Option<PathBuf>,

    /// Output CSV file
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output_file: Option<PathBuf>,

    /// Port for entries that do not carry one
    #[arg(short = 'p', long = "port")]
    pub default_port: Option<u16>,

    /// Maximum simultaneous latency probes
    #[arg(long = "max-threads", visible_alias = "dt", value_name = "N")]
    pub concurrency: Option<usize>,

    /// Download workers; 0 disables the download stage
    #[arg(long = "speed-test-threads", visible_alias = "st", value_name = "N")]
    pub download_threads: Option<usize>,

    /// Download timeout in seconds
    #[arg(long = "speed-test-timeout", visible_alias = "sto", value_name = "SECS", value_parser = parse_timeout)]
    pub download_timeout: Option<u64>,

    /// Download URL, with or without scheme
    #[arg(long = "url")]
    pub download_url: Option<String>,

    /// Hostname serving the trace and websocket paths
    #[arg(long = "trace-host", value_name = "HOST")]
    pub trace_host: Option<String>,

    /// Latency probe protocol
    #[arg(long, value_enum)]
    pub protocol: Option<ProbeProtocol>,

    /// Stop downloading after this many endpoints are accepted; 0 tests all
    #[arg(long = "max-speed-test-count", visible_alias = "maxsc", value_name = "N")]
    pub max_download_count: Option<usize>,

    /// Stop probing latency after this many endpoints are accepted; 0 probes all
    #[arg(long = "max-delay-count", visible_alias = "maxdc", value_name = "N")]
    pub max_latency_count: Option<usize>,

    /// Minimum download speed in MB/s; 0 or less accepts every measurement
    #[arg(long = "min-speed", visible_alias = "mins", value_name = "MBPS", allow_negative_numbers = true)]
    pub min_speed: Option<f64>,

    /// Use TLS for probes and downloads (true/false)
    #[arg(long, value_name = "BOOL")]
    pub tls: Option<bool>,

    /// Shuffle the endpoint order before probing
    #[arg(short = 's', long)]
    pub shuffle: bool,

    /// Comma-separated facility codes to keep, e.g. SJC,LAX
    #[arg(long = "iata", value_name = "CODES")]
    pub facility_filter: Option<String>,

    /// Require a successful websocket upgrade
    #[arg(long = "ws")]
    pub websocket_check: bool,

    /// Local cache of the location catalog
    #[arg(long = "locations", value_name = "PATH")]
    pub locations_file: Option<PathBuf>,

    /// Where to fetch the location catalog when no cache exists
    #[arg(long = "locations-url", value_name = "URL")]
    pub locations_url: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Show per-endpoint diagnostics
    #[arg(long)]
    pub verbose: bool,

    /// Show structured debug logs and build information
    #[arg(long)]
    pub debug: bool,

    /// Print an example .env file and exit
    #[arg(long)]
    pub print_env_example: bool,
}

impl Cli {
    /// Reject flag combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.default_port == Some(0) {
            return Err("--port must be between 1 and 65535".to_string());
        }
        if self.concurrency == Some(0) {
            return Err("--max-threads must be at least 1".to_string());
        }
        if let Some(speed) = self.min_speed {
            if !speed.is_finite() {
                return Err(format!("--min-speed must be a finite number, got {}", speed));
            }
        }
        if self.protocol == Some(ProbeProtocol::H3) && self.tls == Some(false) {
            return Err("--protocol h3 cannot be combined with --tls false".to_string());
        }
        Ok(())
    }

    /// Colors are on unless disabled here or by the terminal
    pub fn use_colors(&self) -> bool {
        !self.no_color && supports_color()
    }
}

/// Parse a timeout in whole seconds
fn parse_timeout(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid timeout: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid timeout: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Timeout must be greater than 0".to_string())
            } else if secs > 300 {
                Err("Timeout cannot exceed 300 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::env::var("ANSICON").is_ok() || std::env::var("ConEmuANSI").is_ok() {
            return true;
        }
    }

    cfg!(unix)
}
