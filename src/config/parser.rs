//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::{AppError, Result},
    models::{config::parse_facility_list, Config},
};

/// Layers defaults, `.env`, the environment and CLI flags into one [`Config`]
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        self.cli.validate().map_err(AppError::config)?;

        let mut config = Config::default();
        EnvManager::load_env_file(self.cli.debug)?;
        config.merge_from_env()?;
        self.apply_cli_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Same layering without reading the process environment
    pub fn parse_with_lookup<F>(&self, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.cli.validate().map_err(AppError::config)?;

        let mut config = Config::default();
        config.merge_from_lookup(lookup)?;
        self.apply_cli_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Only flags that were actually given replace a value
    fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if let Some(path) = &cli.ip_file {
            config.ip_file = path.display().to_string();
        }
        if let Some(path) = &cli.output_file {
            config.output_file = path.display().to_string();
        }
        if let Some(port) = cli.default_port {
            config.default_port = port;
        }
        if let Some(concurrency) = cli.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(threads) = cli.download_threads {
            config.download_threads = threads;
        }
        if let Some(timeout) = cli.download_timeout {
            config.download_timeout_seconds = timeout;
        }
        if let Some(url) = &cli.download_url {
            config.download_url = url.clone();
        }
        if let Some(host) = &cli.trace_host {
            config.trace_host = host.clone();
        }
        if let Some(protocol) = cli.protocol {
            config.protocol = protocol;
        }
        if let Some(count) = cli.max_download_count {
            config.max_download_count = count;
        }
        if let Some(count) = cli.max_latency_count {
            config.max_latency_count = count;
        }
        if let Some(speed) = cli.min_speed {
            config.min_speed = speed;
        }
        if let Some(tls) = cli.tls {
            config.enable_tls = tls;
        }
        if cli.shuffle {
            config.shuffle = true;
        }
        if let Some(codes) = &cli.facility_filter {
            config.facility_filter = parse_facility_list(codes);
        }
        if cli.websocket_check {
            config.websocket_check = true;
        }
        if let Some(path) = &cli.locations_file {
            config.locations_file = path.display().to_string();
        }
        if let Some(url) = &cli.locations_url {
            config.locations_url = url.clone();
        }
        if cli.no_color {
            config.enable_color = false;
        }

        // CLI-only switches
        config.verbose = cli.verbose;
        config.debug = cli.debug;
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Configuration summary for debug output
pub fn display_config_summary(config: &Config) -> String {
    let filter = if config.facility_filter.is_empty() {
        "none".to_string()
    } else {
        config.facility_filter.join(",")
    };

    [
        format!("Input: {}", config.ip_file),
        format!("Output: {}", config.output_file),
        format!("Default port: {}", config.default_port),
        format!("Protocol: {} (TLS: {})", config.protocol, config.enable_tls),
        format!("Trace host: {}", config.trace_host),
        format!("Concurrency: {}", config.concurrency),
        format!(
            "Latency cap: {}",
            if config.max_latency_count == 0 { "unlimited".to_string() } else { config.max_latency_count.to_string() }
        ),
        format!(
            "Downloads: {} workers, {}s timeout, cap {}, min {} MB/s",
            config.download_threads, config.download_timeout_seconds, config.max_download_count, config.min_speed
        ),
        format!("Download URL: {}", config.download_url),
        format!("Facility filter: {}", filter),
        format!("Websocket check: {}", config.websocket_check),
        format!("Shuffle: {}", config.shuffle),
        format!("Locations: {} ({})", config.locations_file, config.locations_url),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProbeProtocol;
    use clap::Parser;
    use std::collections::HashMap;

    fn parse(args: &[&str], env: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let mut argv = vec!["aes"];
        argv.extend_from_slice(args);
        ConfigParser::new(Cli::parse_from(argv)).parse_with_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_input() {
        let config = parse(&[], &[]).unwrap();
        assert_eq!(config.ip_file, "ip.txt");
        assert_eq!(config.output_file, "ip.csv");
        assert_eq!(config.default_port, 443);
        assert_eq!(config.concurrency, 100);
        assert_eq!(config.max_download_count, 10);
        assert_eq!(config.max_latency_count, 0);
        assert!(config.enable_tls);
    }

    #[test]
    fn test_environment_applies() {
        let config = parse(
            &[],
            &[("MAX_THREADS", "250"), ("ENABLE_TLS", "false"), ("IATA_FILTER", "sjc,lax"), ("PROBE_PROTOCOL", "h1")],
        )
        .unwrap();
        assert_eq!(config.concurrency, 250);
        assert!(!config.enable_tls);
        assert_eq!(config.facility_filter, vec!["SJC", "LAX"]);
    }

    #[test]
    fn test_cli_overrides_environment() {
        let config = parse(&["--dt", "20", "--tls", "true"], &[("MAX_THREADS", "250"), ("ENABLE_TLS", "false")]).unwrap();
        assert_eq!(config.concurrency, 20);
        assert!(config.enable_tls);
    }

    #[test]
    fn test_flags_left_out_keep_environment() {
        let config = parse(&["-p", "8443"], &[("SPEED_TEST_THREADS", "4")]).unwrap();
        assert_eq!(config.default_port, 8443);
        assert_eq!(config.download_threads, 4);
    }

    #[test]
    fn test_invalid_environment_value() {
        let err = parse(&[], &[("DEFAULT_PORT", "http")]).unwrap_err();
        assert_eq!(err.category(), "CONFIG");
    }

    #[test]
    fn test_h3_without_tls_rejected_across_layers() {
        let err = parse(&["--protocol", "h3"], &[("ENABLE_TLS", "false")]).unwrap_err();
        assert!(err.to_string().contains("HTTP/3"));

        let config = parse(&["--protocol", "h3"], &[]).unwrap();
        assert_eq!(config.protocol, ProbeProtocol::H3);
    }

    #[test]
    fn test_verbose_and_debug_come_from_cli() {
        let config = parse(&["--verbose"], &[]).unwrap();
        assert!(config.verbose);
        assert!(!config.debug);
    }

    #[test]
    fn test_summary_mentions_caps() {
        let config = parse(&["--maxdc", "50"], &[]).unwrap();
        let summary = display_config_summary(&config);
        assert!(summary.contains("Latency cap: 50"));
        assert!(summary.contains("Protocol: h1"));
    }
}
