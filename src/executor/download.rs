//! Download stage
//!
//! A fixed pool of workers pulls survivors from the closed latency channel.
//! Each accepted measurement is appended under a lock, and the worker that
//! reaches the target marks the stage done so the others stop at their
//! next check.

use super::{ProgressSink, StageSummary, Survivors};
use crate::{
    client::{dial, host_header, origin_form, PinnedClient, TlsSettings},
    defaults::{CONNECT_TIMEOUT, EARLY_ABORT_AFTER, EARLY_ABORT_MIN_TIMEOUT, EARLY_ABORT_RATIO},
    error::{AppError, Result},
    logging::NetworkLogger,
    models::{DownloadMeasurement, Endpoint, ProbeResult, SpeedTestResult},
};
use async_trait::async_trait;
use futures::future::join_all;
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::time::timeout_at;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[async_trait]
pub trait SpeedMeasurer: Send + Sync {
    /// Measure one endpoint; never fails, a failure is reported as
    /// [`DownloadMeasurement::Failed`]
    async fn measure(&self, endpoint: &Endpoint) -> DownloadMeasurement;
}

/// Streams the download URL over a connection pinned to the endpoint
pub struct PinnedDownloader {
    host: String,
    target: String,
    tls: Option<TlsSettings>,
    connect_timeout: Duration,
    timeout: Duration,
    min_speed: f64,
    logger: Arc<NetworkLogger>,
}

impl PinnedDownloader {
    pub fn new(url: &url::Url, timeout: Duration, min_speed: f64, logger: Arc<NetworkLogger>) -> Result<Self> {
        let host_name = url
            .host_str()
            .ok_or_else(|| AppError::config(format!("download URL '{}' has no host", url)))?;
        let tls = match url.scheme() {
            "https" => Some(TlsSettings::insecure(host_name)?),
            "http" => None,
            other => return Err(AppError::config(format!("unsupported download scheme '{}'", other))),
        };

        Ok(Self {
            host: host_header(url)?,
            target: origin_form(url),
            tls,
            connect_timeout: CONNECT_TIMEOUT,
            timeout,
            min_speed,
            logger,
        })
    }

    /// Instant of the single early-abort check, if it applies
    fn checkpoint(&self, started: Instant) -> Option<Instant> {
        (self.timeout > EARLY_ABORT_MIN_TIMEOUT && self.min_speed > 0.0).then(|| started + EARLY_ABORT_AFTER)
    }

    async fn transfer(&self, endpoint: &Endpoint) -> Result<DownloadMeasurement> {
        let connection = dial(endpoint, self.connect_timeout).await?;
        let started = Instant::now();
        let deadline = tokio::time::Instant::from_std(started + self.timeout);
        let expired = || AppError::timeout(format!("download from {} got no response in time", endpoint));

        let mut client = timeout_at(deadline, PinnedClient::over(connection, self.tls.as_ref(), &self.host))
            .await
            .map_err(|_| expired())??;
        let response = timeout_at(deadline, client.get(&self.target))
            .await
            .map_err(|_| expired())??;
        if !response.status().is_success() {
            return Err(AppError::http_request(format!(
                "download from {} answered {}",
                endpoint,
                response.status()
            )));
        }

        let mut body = response.into_body();
        let mut bytes: u64 = 0;
        let mut checkpoint = self.checkpoint(started);
        let mut aborted_early = false;

        loop {
            let wake = match checkpoint {
                Some(at) => deadline.min(tokio::time::Instant::from_std(at)),
                None => deadline,
            };
            match timeout_at(wake, body.frame()).await {
                Ok(Some(Ok(frame))) => {
                    if let Some(data) = frame.data_ref() {
                        bytes += data.len() as u64;
                    }
                }
                // Stream ended or broke; keep what arrived
                Ok(Some(Err(_))) | Ok(None) => break,
                Err(_) => {}
            }

            let now = Instant::now();
            if let Some(at) = checkpoint {
                if now >= at {
                    checkpoint = None;
                    let speed = bytes as f64 / started.elapsed().as_secs_f64() / BYTES_PER_MB;
                    if speed < self.min_speed * EARLY_ABORT_RATIO {
                        aborted_early = true;
                        break;
                    }
                }
            }
            if tokio::time::Instant::from_std(now) >= deadline {
                break;
            }
        }

        Ok(DownloadMeasurement::Completed {
            bytes,
            elapsed: started.elapsed(),
            aborted_early,
        })
    }
}

#[async_trait]
impl SpeedMeasurer for PinnedDownloader {
    async fn measure(&self, endpoint: &Endpoint) -> DownloadMeasurement {
        match self.transfer(endpoint).await {
            Ok(measurement) => measurement,
            Err(e) => {
                self.logger.log_rejection("download", endpoint, &e).await;
                DownloadMeasurement::Failed(e.to_string())
            }
        }
    }
}

/// Output of the download stage
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub results: Vec<SpeedTestResult>,
    pub summary: StageSummary,
    /// False when downloads were disabled and results carry latency only
    pub measured: bool,
}

struct Collected {
    results: Vec<SpeedTestResult>,
    done: bool,
}

pub struct DownloadProber {
    measurer: Option<Arc<dyn SpeedMeasurer>>,
    threads: usize,
    concurrency: usize,
    accept_cap: usize,
    min_speed: f64,
    progress: Arc<dyn ProgressSink>,
}

impl DownloadProber {
    pub fn new(measurer: Arc<dyn SpeedMeasurer>, threads: usize, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            measurer: Some(measurer),
            threads,
            concurrency: threads.max(1),
            accept_cap: 0,
            min_speed: 0.0,
            progress,
        }
    }

    /// Pass survivors through without measuring
    pub fn disabled(progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            measurer: None,
            threads: 0,
            concurrency: 1,
            accept_cap: 0,
            min_speed: 0.0,
            progress,
        }
    }

    /// Stop once `cap` endpoints are accepted; 0 means all survivors
    pub fn with_accept_cap(mut self, cap: usize) -> Self {
        self.accept_cap = cap;
        self
    }

    /// Accept only measurements strictly faster than `min_speed` MB/s
    pub fn with_min_speed(mut self, min_speed: f64) -> Self {
        self.min_speed = min_speed;
        self
    }

    /// Upper bound on workers measuring at the same time
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn probe_all(&self, survivors: Survivors) -> Result<DownloadReport> {
        let started = Instant::now();
        let total = survivors.accepted();

        let measurer = match &self.measurer {
            Some(measurer) if self.threads > 0 => measurer.clone(),
            _ => return Ok(Self::pass_through(survivors, started).await),
        };

        let target = if self.accept_cap == 0 { total } else { self.accept_cap.min(total) };
        self.progress.download_started(total);

        let queue = Arc::new(Mutex::new(survivors.receiver));
        let collected = Arc::new(Mutex::new(Collected {
            results: Vec::with_capacity(target),
            done: target == 0,
        }));
        let processed = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let mut workers = Vec::with_capacity(self.threads);
        for _ in 0..self.threads {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| AppError::internal("download semaphore closed"))?;
            let worker = Worker {
                measurer: measurer.clone(),
                queue: queue.clone(),
                collected: collected.clone(),
                processed: processed.clone(),
                progress: self.progress.clone(),
                total,
                target,
                min_speed: self.min_speed,
            };
            workers.push(tokio::spawn(async move {
                let _permit = permit;
                worker.run().await;
            }));
        }

        for joined in join_all(workers).await {
            if let Err(e) = joined {
                return Err(AppError::internal(format!("download worker failed: {}", e)));
            }
        }

        let results = std::mem::take(&mut collected.lock().await.results);

        Ok(DownloadReport {
            summary: StageSummary {
                stage: "download".to_string(),
                total,
                processed: processed.load(Ordering::SeqCst),
                accepted: results.len(),
                elapsed: started.elapsed(),
            },
            results,
            measured: true,
        })
    }

    async fn pass_through(survivors: Survivors, started: Instant) -> DownloadReport {
        let total = survivors.accepted();
        let results: Vec<SpeedTestResult> = survivors
            .collect()
            .await
            .into_iter()
            .map(SpeedTestResult::latency_only)
            .collect();
        DownloadReport {
            summary: StageSummary {
                stage: "download".to_string(),
                total,
                processed: 0,
                accepted: results.len(),
                elapsed: started.elapsed(),
            },
            results,
            measured: false,
        }
    }
}

fn accepts(min_speed: f64, measurement: &DownloadMeasurement) -> bool {
    min_speed <= 0.0 || measurement.speed_mbps() > min_speed
}

struct Worker {
    measurer: Arc<dyn SpeedMeasurer>,
    queue: Arc<Mutex<mpsc::Receiver<ProbeResult>>>,
    collected: Arc<Mutex<Collected>>,
    processed: Arc<AtomicUsize>,
    progress: Arc<dyn ProgressSink>,
    total: usize,
    target: usize,
    min_speed: f64,
}

impl Worker {
    async fn run(self) {
        loop {
            if self.collected.lock().await.done {
                return;
            }
            // Senders are gone, so this returns at once with the next item or None
            let next = self.queue.lock().await.recv().await;
            let Some(probe) = next else { return };

            let index = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
            let measurement = self.measurer.measure(&probe.endpoint).await;
            let accepted = accepts(self.min_speed, &measurement);

            let mut collected = self.collected.lock().await;
            if collected.done {
                return;
            }
            self.progress.download_result(index, self.total, &probe, &measurement);
            if accepted {
                collected.results.push(SpeedTestResult::with_download(probe, measurement));
            }
            if collected.results.len() >= self.target {
                collected.done = true;
            }
            self.progress
                .download_progress(index, self.total, collected.results.len(), collected.done);
        }
    }
}
