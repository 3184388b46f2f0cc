//! Probe and download results

use super::Endpoint;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Successful, validated latency probe of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub endpoint: Endpoint,
    /// Facility code reported by the trace body (`colo=`)
    pub facility_code: String,
    /// Empty when the facility is not in the catalog
    pub region: String,
    pub city: String,
    pub country_code: String,
    /// Raw connect (or QUIC handshake) time
    pub latency: Duration,
}

impl ProbeResult {
    pub fn latency_ms(&self) -> u128 {
        self.latency.as_millis()
    }
}

/// Outcome of one download measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DownloadMeasurement {
    Completed {
        bytes: u64,
        elapsed: Duration,
        /// Reading stopped at the early-abort checkpoint
        aborted_early: bool,
    },
    Failed(String),
}

impl DownloadMeasurement {
    /// MB/s with MB = 2^20 bytes; `-1.0` for a failed measurement
    pub fn speed_mbps(&self) -> f64 {
        match self {
            Self::Completed { bytes, elapsed, .. } => {
                let secs = elapsed.as_secs_f64();
                if secs <= 0.0 {
                    0.0
                } else {
                    *bytes as f64 / secs / BYTES_PER_MB
                }
            }
            Self::Failed(_) => -1.0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// A latency survivor plus its optional download measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTestResult {
    pub probe: ProbeResult,
    /// `None` when the download stage is disabled
    pub download: Option<DownloadMeasurement>,
}

impl SpeedTestResult {
    pub fn latency_only(probe: ProbeResult) -> Self {
        Self { probe, download: None }
    }

    pub fn with_download(probe: ProbeResult, download: DownloadMeasurement) -> Self {
        Self { probe, download: Some(download) }
    }

    pub fn speed_mbps(&self) -> Option<f64> {
        self.download.as_ref().map(DownloadMeasurement::speed_mbps)
    }
}
