//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use crate::types::ProbeProtocol;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env from the working directory if present
    pub fn load_env_file(debug: bool) -> Result<()> {
        Self::load_env_file_from(Path::new(".env"), debug)
    }

    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path)
                .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;

            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No {} found, using defaults and CLI arguments", path.display());
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        let mut content = String::from(
            "# Anycast endpoint scanner configuration\n\
             #\n\
             # Values here act as defaults; command-line flags override them.\n\n",
        );
        for (var, description, example) in Self::get_supported_env_vars() {
            content.push_str(&format!("# {}\n# {}={}\n\n", description, var, example));
        }
        content
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))
    }

    /// Validate one variable before it is merged into the configuration
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let invalid = |e: &dyn std::fmt::Display| AppError::config(format!("Invalid {} value '{}': {}", key, value, e));

        match key {
            "DEFAULT_PORT" => {
                let port: u16 = value.parse().map_err(|e| invalid(&e))?;
                if port == 0 {
                    return Err(AppError::config("DEFAULT_PORT must be between 1 and 65535"));
                }
            }
            "MAX_THREADS" => {
                let threads: usize = value.parse().map_err(|e| invalid(&e))?;
                if threads == 0 {
                    return Err(AppError::config("MAX_THREADS must be at least 1"));
                }
            }
            "SPEED_TEST_THREADS" | "MAX_SPEED_TEST_COUNT" | "MAX_DELAY_COUNT" => {
                value.parse::<usize>().map_err(|e| invalid(&e))?;
            }
            "SPEED_TEST_TIMEOUT" => {
                let timeout: u64 = value.parse().map_err(|e| invalid(&e))?;
                if timeout > 300 {
                    return Err(AppError::config(format!(
                        "SPEED_TEST_TIMEOUT must be at most 300, got: {}",
                        timeout
                    )));
                }
            }
            "MIN_SPEED" => {
                let speed: f64 = value.parse().map_err(|e| invalid(&e))?;
                if !speed.is_finite() {
                    return Err(AppError::config("MIN_SPEED must be a finite number"));
                }
            }
            "ENABLE_TLS" | "SHUFFLE" | "WEBSOCKET_CHECK" | "ENABLE_COLOR" => {
                value.parse::<bool>().map_err(|e| invalid(&e))?;
            }
            "PROBE_PROTOCOL" => {
                value.parse::<ProbeProtocol>()?;
            }
            "LOCATIONS_URL" => {
                url::Url::parse(value).map_err(|e| invalid(&e))?;
            }
            "IATA_FILTER" => {
                for code in value.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                    if !code.chars().all(|c| c.is_ascii_alphabetic()) {
                        return Err(AppError::config(format!("Invalid IATA_FILTER entry '{}'", code)));
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Supported variables with description and example value
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("IP_FILE", "Input file with endpoints", "ip.txt"),
            ("OUTPUT_FILE", "CSV output file", "ip.csv"),
            ("DEFAULT_PORT", "Port for entries without one", "443"),
            ("MAX_THREADS", "Maximum simultaneous latency probes", "100"),
            ("SPEED_TEST_THREADS", "Download workers, 0 disables downloads", "1"),
            ("SPEED_TEST_TIMEOUT", "Download timeout in seconds", "5"),
            ("SPEED_TEST_URL", "Download URL", "speed.cloudflare.com/__down?bytes=100000000"),
            ("TRACE_HOST", "Host serving /cdn-cgi/trace", "speed.cloudflare.com"),
            ("PROBE_PROTOCOL", "Latency probe protocol (h1 or h3)", "h1"),
            ("MAX_SPEED_TEST_COUNT", "Accepted downloads to stop at, 0 for all", "10"),
            ("MAX_DELAY_COUNT", "Accepted latency probes to stop at, 0 for all", "0"),
            ("MIN_SPEED", "Minimum download speed in MB/s", "1"),
            ("ENABLE_TLS", "Use TLS", "true"),
            ("SHUFFLE", "Shuffle endpoints before probing", "false"),
            ("IATA_FILTER", "Comma-separated facility codes to keep", "SJC,LAX"),
            ("WEBSOCKET_CHECK", "Require a websocket upgrade", "false"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
            ("LOCATIONS_FILE", "Location catalog cache", "locations.json"),
            ("LOCATIONS_URL", "Location catalog source", "https://speed.cloudflare.com/locations"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::from("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<22} {}\n", var, description));
            help.push_str(&format!("  {:<22} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(var, _, _)| {
                let value = std::env::var(var).ok()?;
                Self::validate_env_var(var, &value).err().map(|e| e.to_string())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_example_content_lists_every_variable() {
        let content = EnvManager::create_example_env_content();
        for (var, _, _) in EnvManager::get_supported_env_vars() {
            assert!(content.contains(&format!("# {}=", var)), "missing {}", var);
        }
    }

    #[test]
    fn test_save_example_file() {
        let temp_file = NamedTempFile::new().unwrap();
        EnvManager::save_example_env_file(temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("MAX_THREADS"));
    }

    #[test]
    fn test_validate_env_var() {
        assert!(EnvManager::validate_env_var("DEFAULT_PORT", "2053").is_ok());
        assert!(EnvManager::validate_env_var("MAX_THREADS", "200").is_ok());
        assert!(EnvManager::validate_env_var("SPEED_TEST_THREADS", "0").is_ok());
        assert!(EnvManager::validate_env_var("MIN_SPEED", "-1").is_ok());
        assert!(EnvManager::validate_env_var("PROBE_PROTOCOL", "h3").is_ok());
        assert!(EnvManager::validate_env_var("IATA_FILTER", "sjc, LAX").is_ok());
        assert!(EnvManager::validate_env_var("UNRELATED", "whatever").is_ok());

        assert!(EnvManager::validate_env_var("DEFAULT_PORT", "0").is_err());
        assert!(EnvManager::validate_env_var("DEFAULT_PORT", "70000").is_err());
        assert!(EnvManager::validate_env_var("MAX_THREADS", "0").is_err());
        assert!(EnvManager::validate_env_var("SPEED_TEST_TIMEOUT", "301").is_err());
        assert!(EnvManager::validate_env_var("MIN_SPEED", "NaN").is_err());
        assert!(EnvManager::validate_env_var("ENABLE_TLS", "maybe").is_err());
        assert!(EnvManager::validate_env_var("PROBE_PROTOCOL", "spdy").is_err());
        assert!(EnvManager::validate_env_var("IATA_FILTER", "SJ1").is_err());
    }

    #[test]
    fn test_load_env_file_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "AES_ENV_TEST_MARKER=loaded").unwrap();

        EnvManager::load_env_file_from(file.path(), false).unwrap();
        assert_eq!(std::env::var("AES_ENV_TEST_MARKER").unwrap(), "loaded");
    }

    #[test]
    fn test_missing_env_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EnvManager::load_env_file_from(&dir.path().join(".env"), false).is_ok());
    }

    #[test]
    fn test_display_env_help() {
        let help = EnvManager::display_env_help();
        assert!(help.contains("IATA_FILTER"));
        assert!(help.contains("Configuration Priority"));
    }
}
