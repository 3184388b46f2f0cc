//! Probing stages
//!
//! Two sequential stages with a full barrier between them:
//! - [`latency::LatencyProber`] fans out one probe per endpoint under a
//!   semaphore and leaves its survivors in a closed channel
//! - [`download::DownloadProber`] drains that channel with a fixed number of
//!   workers and stops early once enough endpoints are accepted

pub mod backend;
pub mod download;
pub mod latency;

pub use backend::{backend_for, Http1Backend, Http3Backend, LatencyBackend, TraceSample};
pub use download::{DownloadProber, DownloadReport, PinnedDownloader, SpeedMeasurer};
pub use latency::{LatencyProber, Survivors, TraceValidator};

use crate::models::{DownloadMeasurement, ProbeResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Shared progress counters of one stage
#[derive(Debug, Default)]
pub struct StageCounters {
    total: usize,
    processed: AtomicUsize,
    accepted: AtomicUsize,
}

impl StageCounters {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Count one finished unit and return the new processed count
    pub fn record_processed(&self) -> usize {
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Increment `accepted` unless it already reached `cap` (0 = no cap)
    pub fn try_accept(&self, cap: usize) -> bool {
        self.accepted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if cap == 0 || current < cap {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    pub fn cap_reached(&self, cap: usize) -> bool {
        cap > 0 && self.accepted() >= cap
    }
}

/// Summary of one finished stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: String,
    pub total: usize,
    pub processed: usize,
    pub accepted: usize,
    pub elapsed: Duration,
}

/// Receives progress events from the stages
pub trait ProgressSink: Send + Sync {
    fn latency_progress(&self, processed: usize, total: usize, accepted: usize);

    /// A validated endpoint; `filtered` when excluded by the facility allow-list
    fn latency_found(&self, result: &ProbeResult, filtered: bool);

    /// Called once after the last latency probe finished
    fn latency_finished(&self, summary: &StageSummary, cap_reached: bool);

    fn download_started(&self, total: usize);

    fn download_result(&self, index: usize, total: usize, result: &ProbeResult, measurement: &DownloadMeasurement);

    fn download_progress(&self, processed: usize, total: usize, accepted: usize, finished: bool);
}

/// Progress sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn latency_progress(&self, _: usize, _: usize, _: usize) {}
    fn latency_found(&self, _: &ProbeResult, _: bool) {}
    fn latency_finished(&self, _: &StageSummary, _: bool) {}
    fn download_started(&self, _: usize) {}
    fn download_result(&self, _: usize, _: usize, _: &ProbeResult, _: &DownloadMeasurement) {}
    fn download_progress(&self, _: usize, _: usize, _: usize, _: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_try_accept_respects_cap() {
        let counters = StageCounters::new(10);
        assert!(counters.try_accept(2));
        assert!(counters.try_accept(2));
        assert!(!counters.try_accept(2));
        assert_eq!(counters.accepted(), 2);
        assert!(counters.cap_reached(2));
    }

    #[test]
    fn test_zero_cap_is_unlimited() {
        let counters = StageCounters::new(3);
        for _ in 0..100 {
            assert!(counters.try_accept(0));
        }
        assert!(!counters.cap_reached(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_never_exceed_cap() {
        let counters = Arc::new(StageCounters::new(1000));
        let mut tasks = Vec::new();
        for _ in 0..1000 {
            let counters = counters.clone();
            tasks.push(tokio::spawn(async move {
                let accepted = counters.try_accept(37);
                counters.record_processed();
                accepted
            }));
        }
        let accepted = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();

        assert_eq!(accepted, 37);
        assert_eq!(counters.accepted(), 37);
        assert_eq!(counters.processed(), 1000);
    }
}
