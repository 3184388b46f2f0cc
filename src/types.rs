//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Transport used by the latency stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeProtocol {
    /// TCP (+ optional TLS) carrying HTTP/1.1
    #[default]
    H1,
    /// QUIC carrying HTTP/3
    H3,
}

impl ProbeProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H1 => "h1",
            Self::H3 => "h3",
        }
    }
}

impl fmt::Display for ProbeProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeProtocol {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h1" | "http1" | "http/1.1" => Ok(Self::H1),
            "h3" | "http3" | "quic" => Ok(Self::H3),
            other => Err(AppError::parse(format!("Unknown probe protocol '{}', expected h1 or h3", other))),
        }
    }
}

/// Latency classification used for console coloring
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatencyLevel {
    /// Under 100ms
    Good,
    /// 100ms to 300ms
    Moderate,
    /// Above 300ms
    Poor,
}

impl LatencyLevel {
    pub fn from_duration(duration: Duration) -> Self {
        let ms = duration.as_millis();
        if ms < 100 {
            Self::Good
        } else if ms < 300 {
            Self::Moderate
        } else {
            Self::Poor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("h1".parse::<ProbeProtocol>().unwrap(), ProbeProtocol::H1);
        assert_eq!("H3".parse::<ProbeProtocol>().unwrap(), ProbeProtocol::H3);
        assert_eq!("quic".parse::<ProbeProtocol>().unwrap(), ProbeProtocol::H3);
        assert!("h2".parse::<ProbeProtocol>().is_err());
        assert_eq!(ProbeProtocol::default().to_string(), "h1");
    }

    #[test]
    fn test_latency_levels() {
        assert_eq!(LatencyLevel::from_duration(Duration::from_millis(40)), LatencyLevel::Good);
        assert_eq!(LatencyLevel::from_duration(Duration::from_millis(100)), LatencyLevel::Moderate);
        assert_eq!(LatencyLevel::from_duration(Duration::from_millis(850)), LatencyLevel::Poor);
    }
}
