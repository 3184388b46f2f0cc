//! Soft configuration checks
//!
//! Hard errors live in [`Config::validate`]; this module only produces
//! warnings about settings that are legal but probably not intended.

use crate::{error::Result, models::Config, types::ProbeProtocol};
use std::time::Duration;

/// Configuration validator with advanced validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Run the hard checks, then collect warnings
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_concurrency(config));
        warnings.extend(Self::validate_download_settings(config));
        warnings.extend(Self::validate_probe_settings(config));
        Ok(warnings)
    }

    fn validate_concurrency(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let cpus = num_cpus::get();

        if config.concurrency > 1000 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "{} simultaneous probes may exhaust file descriptors or trip rate limits",
                    config.concurrency
                ),
            ));
        } else if config.concurrency > cpus * 256 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("{} simultaneous probes on {} CPUs", config.concurrency, cpus),
            ));
        }

        warnings
    }

    fn validate_download_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if !config.download_enabled() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Download stage disabled, results are ranked by latency".to_string(),
            ));
            return warnings;
        }

        if config.download_threads > config.concurrency {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "{} download workers exceed the concurrency limit of {}; only {} run at once",
                    config.download_threads, config.concurrency, config.concurrency
                ),
            ));
        }
        if config.download_threads > 1 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "{} parallel downloads share your bandwidth and lower each measured speed",
                    config.download_threads
                ),
            ));
        }
        if config.min_speed <= 0.0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Minimum speed disabled, failed downloads are kept with speed -1".to_string(),
            ));
        }
        if config.download_timeout() <= Duration::from_secs(2) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Download timeout of {}s disables the early abort of slow endpoints",
                    config.download_timeout_seconds
                ),
            ));
        }
        if config.max_download_count == 0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Every latency survivor will be download-tested".to_string(),
            ));
        }

        warnings
    }

    fn validate_probe_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.protocol == ProbeProtocol::H3 && config.websocket_check {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "The websocket check always uses HTTP/1.1 over TCP".to_string(),
            ));
        }
        if config.max_latency_count > 0 && config.max_latency_count < config.max_download_count {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Latency cap {} is below the download cap {}",
                    config.max_latency_count, config.max_download_count
                ),
            ));
        }
        if !config.enable_tls && config.default_port == 443 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "TLS is disabled but the default port is 443".to_string(),
            ));
        }

        warnings
    }
}

/// Validation warning levels
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    pub fn format(&self) -> String {
        format!("[{}] {}", self.level.as_str(), self.message)
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
