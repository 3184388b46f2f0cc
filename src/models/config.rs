//! Configuration data model and validation

use crate::types::{AppError, ProbeProtocol, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Candidate address file, one address or block per line
    #[serde(default = "default_ip_file")]
    pub ip_file: String,

    /// CSV output path
    #[serde(default = "default_output_file")]
    pub output_file: String,

    /// Port used when a line carries none
    #[serde(default = "default_port")]
    pub default_port: u16,

    /// Latency probes in flight at once; also caps download workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Download workers; 0 disables the download stage
    #[serde(default = "default_download_threads")]
    pub download_threads: usize,

    /// Per-endpoint download deadline in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_seconds: u64,

    /// Download resource, with or without scheme
    #[serde(default = "default_download_url")]
    pub download_url: String,

    /// Host name sent in the trace request (Host header and SNI)
    #[serde(default = "default_trace_host")]
    pub trace_host: String,

    /// Transport used by the latency stage
    #[serde(default)]
    pub protocol: ProbeProtocol,

    /// Download accept cap; 0 means every survivor may be accepted
    #[serde(default = "default_max_download_count")]
    pub max_download_count: usize,

    /// Latency accept cap; 0 means unlimited
    #[serde(default)]
    pub max_latency_count: usize,

    /// Download results at or below this speed (MB/s) are excluded; <= 0 disables
    #[serde(default = "default_min_speed")]
    pub min_speed: f64,

    #[serde(default = "default_enable_tls")]
    pub enable_tls: bool,

    /// Shuffle candidates before probing
    #[serde(default)]
    pub shuffle: bool,

    /// Facility codes to keep; empty keeps all
    #[serde(default)]
    pub facility_filter: Vec<String>,

    /// Require a successful websocket upgrade during the latency probe
    #[serde(default)]
    pub websocket_check: bool,

    /// Cached location catalog
    #[serde(default = "default_locations_file")]
    pub locations_file: String,

    /// Remote location catalog fetched when the cache is missing
    #[serde(default = "default_locations_url")]
    pub locations_url: String,

    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip_file: default_ip_file(),
            output_file: default_output_file(),
            default_port: default_port(),
            concurrency: default_concurrency(),
            download_threads: default_download_threads(),
            download_timeout_seconds: default_download_timeout_secs(),
            download_url: default_download_url(),
            trace_host: default_trace_host(),
            protocol: ProbeProtocol::default(),
            max_download_count: default_max_download_count(),
            max_latency_count: 0,
            min_speed: default_min_speed(),
            enable_tls: default_enable_tls(),
            shuffle: false,
            facility_filter: Vec::new(),
            websocket_check: false,
            locations_file: default_locations_file(),
            locations_url: default_locations_url(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_seconds)
    }

    pub fn download_enabled(&self) -> bool {
        self.download_threads > 0
    }

    /// Scheme prefix implied by the TLS flag
    pub fn scheme(&self) -> &'static str {
        if self.enable_tls {
            "https"
        } else {
            "http"
        }
    }

    /// Download URL with the scheme filled in from the TLS flag when absent
    pub fn download_url(&self) -> Result<url::Url> {
        let raw = if self.download_url.contains("://") {
            self.download_url.clone()
        } else {
            format!("{}://{}", self.scheme(), self.download_url)
        };
        let parsed = url::Url::parse(&raw)?;
        if parsed.host_str().is_none() {
            return Err(AppError::config(format!("Download URL '{}' has no host", self.download_url)));
        }
        Ok(parsed)
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        if self.ip_file.trim().is_empty() {
            return Err(AppError::config("Input file cannot be empty"));
        }

        if self.output_file.trim().is_empty() {
            return Err(AppError::config("Output file cannot be empty"));
        }

        if self.default_port == 0 {
            return Err(AppError::config("Default port must be between 1 and 65535"));
        }

        if self.concurrency == 0 {
            return Err(AppError::config("Concurrency must be greater than 0"));
        }

        if self.download_enabled() && self.download_timeout_seconds == 0 {
            return Err(AppError::config("Download timeout must be greater than 0"));
        }

        if self.download_timeout_seconds > 300 {
            return Err(AppError::config("Download timeout cannot exceed 300 seconds"));
        }

        if !self.min_speed.is_finite() {
            return Err(AppError::config("Minimum speed must be a finite number"));
        }

        let host = self.trace_host.trim();
        if host.is_empty() || host.contains('/') || host.contains("://") {
            return Err(AppError::config(format!("Trace host must be a bare host name: '{}'", self.trace_host)));
        }

        if self.download_enabled() {
            self.download_url()
                .map_err(|e| AppError::config(format!("Invalid download URL '{}': {}", self.download_url, e)))?;
        }

        if self.protocol == ProbeProtocol::H3 && !self.enable_tls {
            return Err(AppError::config("HTTP/3 probing requires TLS; drop --tls false or use --protocol h1"));
        }

        match url::Url::parse(&self.locations_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(_) => return Err(AppError::config(format!("Locations URL must be http(s): {}", self.locations_url))),
            Err(e) => return Err(AppError::config(format!("Invalid locations URL '{}': {}", self.locations_url, e))),
        }

        for code in &self.facility_filter {
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(AppError::config(format!("Facility code '{}' must be upper-case letters", code)));
            }
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_lookup(|key| std::env::var(key).ok())
    }

    /// Merge values from an arbitrary variable source
    pub fn merge_from_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse()
                .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, raw, e)))
        }

        if let Some(v) = lookup("IP_FILE") {
            self.ip_file = v;
        }
        if let Some(v) = lookup("OUTPUT_FILE") {
            self.output_file = v;
        }
        if let Some(v) = lookup("DEFAULT_PORT") {
            self.default_port = parsed("DEFAULT_PORT", &v)?;
        }
        if let Some(v) = lookup("MAX_THREADS") {
            self.concurrency = parsed("MAX_THREADS", &v)?;
        }
        if let Some(v) = lookup("SPEED_TEST_THREADS") {
            self.download_threads = parsed("SPEED_TEST_THREADS", &v)?;
        }
        if let Some(v) = lookup("SPEED_TEST_TIMEOUT") {
            self.download_timeout_seconds = parsed("SPEED_TEST_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("SPEED_TEST_URL") {
            self.download_url = v;
        }
        if let Some(v) = lookup("TRACE_HOST") {
            self.trace_host = v;
        }
        if let Some(v) = lookup("PROBE_PROTOCOL") {
            self.protocol = v.parse()?;
        }
        if let Some(v) = lookup("MAX_SPEED_TEST_COUNT") {
            self.max_download_count = parsed("MAX_SPEED_TEST_COUNT", &v)?;
        }
        if let Some(v) = lookup("MAX_DELAY_COUNT") {
            self.max_latency_count = parsed("MAX_DELAY_COUNT", &v)?;
        }
        if let Some(v) = lookup("MIN_SPEED") {
            self.min_speed = parsed("MIN_SPEED", &v)?;
        }
        if let Some(v) = lookup("ENABLE_TLS") {
            self.enable_tls = parsed("ENABLE_TLS", &v)?;
        }
        if let Some(v) = lookup("SHUFFLE") {
            self.shuffle = parsed("SHUFFLE", &v)?;
        }
        if let Some(v) = lookup("IATA_FILTER") {
            self.facility_filter = parse_facility_list(&v);
        }
        if let Some(v) = lookup("WEBSOCKET_CHECK") {
            self.websocket_check = parsed("WEBSOCKET_CHECK", &v)?;
        }
        if let Some(v) = lookup("ENABLE_COLOR") {
            self.enable_color = parsed("ENABLE_COLOR", &v)?;
        }
        if let Some(v) = lookup("LOCATIONS_FILE") {
            self.locations_file = v;
        }
        if let Some(v) = lookup("LOCATIONS_URL") {
            self.locations_url = v;
        }

        Ok(())
    }
}

/// Split a comma-separated facility list, trimming and upper-casing entries
pub fn parse_facility_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn default_ip_file() -> String {
    crate::defaults::DEFAULT_IP_FILE.to_string()
}

fn default_output_file() -> String {
    crate::defaults::DEFAULT_OUTPUT_FILE.to_string()
}

fn default_port() -> u16 {
    crate::defaults::DEFAULT_PORT
}

fn default_concurrency() -> usize {
    crate::defaults::DEFAULT_CONCURRENCY
}

fn default_download_threads() -> usize {
    crate::defaults::DEFAULT_DOWNLOAD_THREADS
}

fn default_download_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_DOWNLOAD_TIMEOUT.as_secs()
}

fn default_download_url() -> String {
    crate::defaults::DEFAULT_DOWNLOAD_URL.to_string()
}

fn default_trace_host() -> String {
    crate::defaults::DEFAULT_TRACE_HOST.to_string()
}

fn default_max_download_count() -> usize {
    crate::defaults::DEFAULT_MAX_DOWNLOAD_COUNT
}

fn default_min_speed() -> f64 {
    crate::defaults::DEFAULT_MIN_SPEED
}

fn default_enable_tls() -> bool {
    true
}

fn default_locations_file() -> String {
    crate::defaults::DEFAULT_LOCATIONS_FILE.to_string()
}

fn default_locations_url() -> String {
    crate::defaults::DEFAULT_LOCATIONS_URL.to_string()
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ip_file, "ip.txt");
        assert_eq!(config.output_file, "ip.csv");
        assert_eq!(config.default_port, 443);
        assert_eq!(config.concurrency, 100);
        assert_eq!(config.download_threads, 1);
        assert_eq!(config.max_download_count, 10);
        assert_eq!(config.max_latency_count, 0);
        assert_eq!(config.download_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_download_url_scheme_follows_tls() {
        let mut config = Config::default();
        assert_eq!(
            config.download_url().unwrap().as_str(),
            "https://speed.cloudflare.com/__down?bytes=100000000"
        );

        config.enable_tls = false;
        assert_eq!(config.download_url().unwrap().scheme(), "http");

        config.download_url = "http://127.0.0.1:8080/file".to_string();
        config.enable_tls = true;
        assert_eq!(config.download_url().unwrap().as_str(), "http://127.0.0.1:8080/file");
    }

    #[test]
    fn test_zero_concurrency_invalid() {
        let config = Config { concurrency: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_download_threads_skips_download_checks() {
        let config = Config {
            download_threads: 0,
            download_timeout_seconds: 0,
            download_url: "::not a url::".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_h3_requires_tls() {
        let config = Config { protocol: ProbeProtocol::H3, enable_tls: false, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("HTTP/3"));
    }

    #[test]
    fn test_trace_host_must_be_bare() {
        let config = Config { trace_host: "https://example.com/".to_string(), ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_facility_codes_validated() {
        let config = Config { facility_filter: vec!["sj1".to_string()], ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_from_lookup() {
        let mut config = Config::default();
        config
            .merge_from_lookup(lookup_from(&[
                ("IP_FILE", "ranges.txt"),
                ("DEFAULT_PORT", "8443"),
                ("SPEED_TEST_THREADS", "0"),
                ("MIN_SPEED", "2.5"),
                ("ENABLE_TLS", "false"),
                ("PROBE_PROTOCOL", "h1"),
                ("IATA_FILTER", "sjc, lax,,HKG"),
            ]))
            .unwrap();

        assert_eq!(config.ip_file, "ranges.txt");
        assert_eq!(config.default_port, 8443);
        assert_eq!(config.download_threads, 0);
        assert_eq!(config.min_speed, 2.5);
        assert!(!config.enable_tls);
        assert_eq!(config.facility_filter, vec!["SJC", "LAX", "HKG"]);
    }

    #[test]
    fn test_merge_rejects_bad_numbers() {
        let mut config = Config::default();
        let err = config.merge_from_lookup(lookup_from(&[("DEFAULT_PORT", "70000")])).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_PORT"));
    }
}
