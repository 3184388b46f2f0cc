//! Final ordering of the scan results

use crate::models::SpeedTestResult;
use std::cmp::Ordering;

/// How the final result list is ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMode {
    /// Fastest download first
    BySpeed,
    /// Lowest latency first
    ByLatency,
}

impl RankingMode {
    /// Speed ranking only makes sense when downloads were measured
    pub fn for_download_stage(measured: bool) -> Self {
        if measured {
            Self::BySpeed
        } else {
            Self::ByLatency
        }
    }

    fn compare(self, a: &SpeedTestResult, b: &SpeedTestResult) -> Ordering {
        match self {
            Self::BySpeed => {
                let a = a.speed_mbps().unwrap_or(f64::NEG_INFINITY);
                let b = b.speed_mbps().unwrap_or(f64::NEG_INFINITY);
                b.total_cmp(&a)
            }
            Self::ByLatency => a.probe.latency.cmp(&b.probe.latency),
        }
    }
}

/// Stable sort; ties keep their arrival order
pub fn rank(results: &mut [SpeedTestResult], mode: RankingMode) {
    results.sort_by(|a, b| mode.compare(a, b));
}

/// Owned convenience wrapper around [`rank`]
pub fn ranked(mut results: Vec<SpeedTestResult>, mode: RankingMode) -> Vec<SpeedTestResult> {
    rank(&mut results, mode);
    results
}
