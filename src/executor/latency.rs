//! Latency stage
//!
//! One task per endpoint, admitted through a semaphore. The dispatcher stops
//! handing out work once the accept cap is reached; tasks already in flight
//! finish but can no longer be accepted.

use super::{LatencyBackend, ProgressSink, StageCounters, StageSummary};
use crate::{
    catalog::LocationCatalog,
    client::WebSocketCheck,
    defaults::TRACE_MARKER,
    error::{AppError, Result},
    logging::NetworkLogger,
    models::{Endpoint, ProbeResult},
};
use futures::future::join_all;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};

/// Checks a trace body and extracts its facility code
#[derive(Debug, Clone)]
pub struct TraceValidator {
    colo: Regex,
}

impl TraceValidator {
    pub fn new() -> Result<Self> {
        let colo = Regex::new(r"colo=([A-Z]+)")
            .map_err(|e| AppError::internal(format!("invalid facility pattern: {}", e)))?;
        Ok(Self { colo })
    }

    /// Facility code of a body that carries the browser marker
    pub fn facility_code(&self, body: &str) -> Result<String> {
        if !body.contains(TRACE_MARKER) {
            return Err(AppError::validation("trace body lacks the user agent marker"));
        }
        self.colo
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| AppError::validation("trace body has no facility code"))
    }
}

/// Output of the latency stage
pub struct Survivors {
    /// Closed channel holding every accepted probe
    pub receiver: mpsc::Receiver<ProbeResult>,
    pub summary: StageSummary,
    /// The dispatcher stopped early because the accept cap was reached
    pub cap_reached: bool,
}

impl Survivors {
    pub fn accepted(&self) -> usize {
        self.summary.accepted
    }

    /// Drain the channel into a vector
    pub async fn collect(mut self) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(self.summary.accepted);
        while let Some(result) = self.receiver.recv().await {
            results.push(result);
        }
        results
    }
}

/// Everything a single probe task needs, cheap to clone into each task
#[derive(Clone)]
struct ProbeContext {
    backend: Arc<dyn LatencyBackend>,
    catalog: Arc<LocationCatalog>,
    validator: Arc<TraceValidator>,
    websocket: Option<WebSocketCheck>,
    facility_filter: Option<Arc<HashSet<String>>>,
    accept_cap: usize,
    progress: Arc<dyn ProgressSink>,
    logger: Arc<NetworkLogger>,
}

pub struct LatencyProber {
    context: ProbeContext,
    concurrency: usize,
}

impl LatencyProber {
    pub fn new(
        backend: Arc<dyn LatencyBackend>,
        catalog: Arc<LocationCatalog>,
        concurrency: usize,
        progress: Arc<dyn ProgressSink>,
        logger: Arc<NetworkLogger>,
    ) -> Result<Self> {
        Ok(Self {
            context: ProbeContext {
                backend,
                catalog,
                validator: Arc::new(TraceValidator::new()?),
                websocket: None,
                facility_filter: None,
                accept_cap: 0,
                progress,
                logger,
            },
            concurrency: concurrency.max(1),
        })
    }

    /// Stop accepting after `cap` survivors; 0 means unlimited
    pub fn with_accept_cap(mut self, cap: usize) -> Self {
        self.context.accept_cap = cap;
        self
    }

    /// Only accept endpoints whose facility code is in `codes`; empty disables
    pub fn with_facility_filter<I: IntoIterator<Item = String>>(mut self, codes: I) -> Self {
        let codes: HashSet<String> = codes.into_iter().collect();
        self.context.facility_filter = if codes.is_empty() { None } else { Some(Arc::new(codes)) };
        self
    }

    pub fn with_websocket_check(mut self, check: Option<WebSocketCheck>) -> Self {
        self.context.websocket = check;
        self
    }

    /// Probe every endpoint and return the accepted ones
    pub async fn probe_all(&self, endpoints: Vec<Endpoint>) -> Result<Survivors> {
        let started = Instant::now();
        let total = endpoints.len();
        let cap = self.context.accept_cap;
        let counters = Arc::new(StageCounters::new(total));
        let capacity = if cap > 0 { cap.min(total) } else { total }.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let mut tasks = Vec::with_capacity(total.min(self.concurrency * 4));
        let mut cap_reached = false;

        for endpoint in endpoints {
            if counters.cap_reached(cap) {
                cap_reached = true;
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| AppError::internal("latency semaphore closed"))?;
            // Re-check after waiting: a running task may have filled the cap
            if counters.cap_reached(cap) {
                cap_reached = true;
                break;
            }

            let context = self.context.clone();
            let counters = counters.clone();
            let sender = sender.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                context.probe_one(endpoint, &counters, &sender).await;
            }));
        }
        drop(sender);

        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                return Err(AppError::internal(format!("latency task failed: {}", e)));
            }
        }

        let summary = StageSummary {
            stage: "latency".to_string(),
            total,
            processed: counters.processed(),
            accepted: counters.accepted(),
            elapsed: started.elapsed(),
        };
        self.context.progress.latency_finished(&summary, cap_reached);

        Ok(Survivors {
            receiver,
            summary,
            cap_reached,
        })
    }
}

impl ProbeContext {
    async fn probe_one(&self, endpoint: Endpoint, counters: &StageCounters, sender: &mpsc::Sender<ProbeResult>) {
        match self.evaluate(&endpoint).await {
            Ok(result) => {
                let allowed = self
                    .facility_filter
                    .as_ref()
                    .map_or(true, |codes| codes.contains(&result.facility_code));

                if !allowed {
                    self.logger.log_filtered(&endpoint, &result.facility_code).await;
                    self.progress.latency_found(&result, true);
                } else if counters.try_accept(self.accept_cap) {
                    self.progress.latency_found(&result, false);
                    // Capacity covers every possible acceptance, so this never waits
                    if sender.send(result).await.is_err() {
                        self.logger
                            .log_rejection("latency", &endpoint, &AppError::internal("survivor channel closed"))
                            .await;
                    }
                }
            }
            Err(e) => self.logger.log_rejection("latency", &endpoint, &e).await,
        }

        let processed = counters.record_processed();
        self.progress.latency_progress(processed, counters.total(), counters.accepted());
    }

    async fn evaluate(&self, endpoint: &Endpoint) -> Result<ProbeResult> {
        let sample = self.backend.trace(endpoint).await?;
        let facility_code = self.validator.facility_code(&sample.body)?;

        if let Some(check) = &self.websocket {
            check.verify(endpoint).await?;
        }

        let (region, city, country_code) = match self.catalog.get(&facility_code) {
            Some(record) => (record.region.clone(), record.city.clone(), record.cca2.clone()),
            None => Default::default(),
        };

        Ok(ProbeResult {
            endpoint: *endpoint,
            facility_code,
            region,
            city,
            country_code,
            latency: sample.connect_time,
        })
    }
}
