//! Main application orchestration and execution
//!
//! catalog → expansion → latency stage → download stage → ranking → CSV

use crate::{
    aggregate::{ranked, RankingMode},
    catalog::CatalogSource,
    client::{TlsSettings, WebSocketCheck},
    config::{display_config_summary, validate_config, ValidationLevel},
    defaults::{CONNECT_TIMEOUT, TRACE_TIMEOUT},
    error::Result,
    executor::{backend_for, DownloadProber, LatencyProber, PinnedDownloader},
    expander::{shuffle, AddressExpander},
    log_debug, log_info,
    logging::LoggerFactory,
    models::{Config, SpeedTestResult},
    output::{ConsoleReporter, CsvExporter},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a finished scan produced
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Ranked results; empty when nothing survived
    pub results: Vec<SpeedTestResult>,
    /// CSV path, `None` when nothing was written
    pub written: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Main application struct that coordinates all components
pub struct App {
    config: Config,
    reporter: Arc<ConsoleReporter>,
    loggers: LoggerFactory,
}

impl App {
    pub fn new(config: Config) -> Self {
        let reporter = Arc::new(ConsoleReporter::new(config.enable_color, config.verbose));
        let loggers = LoggerFactory::new(config.clone());
        Self {
            config,
            reporter,
            loggers,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the whole scan
    pub async fn run(&self) -> Result<ScanOutcome> {
        let started = Instant::now();
        let config = &self.config;
        let logger = self.loggers.create_logger("APP").await;
        log_info!(logger, "Session {} started", self.loggers.session_id());

        let warnings = validate_config(config)?;
        let shown: Vec<String> = warnings
            .iter()
            .filter(|w| config.verbose || w.level == ValidationLevel::Warning)
            .map(|w| w.message.clone())
            .collect();
        self.reporter.warnings(&shown);
        log_debug!(logger, "Configuration:\n{}", display_config_summary(config));

        let source = CatalogSource::new(&config.locations_file, config.locations_url.clone());
        let (catalog, origin) = source.load().await?;
        self.reporter.catalog_loaded(&source, origin, catalog.len());

        let input = Path::new(&config.ip_file);
        let expansion = AddressExpander::new(config.default_port).expand_file(input)?;
        self.reporter.expansion(input, &expansion);
        let mut endpoints = expansion.endpoints;
        if config.shuffle {
            shuffle(&mut endpoints);
        }

        let network = Arc::new(self.loggers.create_network_logger().await);
        let stages = self.loggers.create_stage_logger().await;

        let websocket = if config.websocket_check {
            let tls = if config.enable_tls {
                Some(TlsSettings::insecure(&config.trace_host)?)
            } else {
                None
            };
            Some(WebSocketCheck::new(tls, &config.trace_host, CONNECT_TIMEOUT, TRACE_TIMEOUT))
        } else {
            None
        };

        let prober = LatencyProber::new(
            backend_for(config, network.clone())?,
            Arc::new(catalog),
            config.concurrency,
            self.reporter.clone(),
            network.clone(),
        )?
        .with_accept_cap(config.max_latency_count)
        .with_facility_filter(config.facility_filter.clone())
        .with_websocket_check(websocket);

        let stage_id = stages.start_stage("latency", endpoints.len()).await;
        let survivors = prober.probe_all(endpoints).await?;
        let summary = &survivors.summary;
        stages
            .end_stage(&stage_id, "latency", summary.processed, summary.accepted, summary.elapsed)
            .await;

        if survivors.accepted() == 0 {
            self.reporter.no_survivors();
            return Ok(ScanOutcome {
                results: Vec::new(),
                written: None,
                elapsed: started.elapsed(),
            });
        }

        let downloads = if config.download_enabled() {
            let url = config.download_url()?;
            let downloader =
                PinnedDownloader::new(&url, config.download_timeout(), config.min_speed, network.clone())?;
            DownloadProber::new(Arc::new(downloader), config.download_threads, self.reporter.clone())
                .with_accept_cap(config.max_download_count)
                .with_min_speed(config.min_speed)
                .with_concurrency(config.concurrency)
        } else {
            DownloadProber::disabled(self.reporter.clone())
        };

        let stage_id = stages.start_stage("download", survivors.accepted()).await;
        let report = downloads.probe_all(survivors).await?;
        let summary = &report.summary;
        stages
            .end_stage(&stage_id, "download", summary.processed, summary.accepted, summary.elapsed)
            .await;

        // Written even when nothing passed the speed floor, replacing any older file
        let results = ranked(report.results, RankingMode::for_download_stage(report.measured));
        let exporter = CsvExporter::new(&config.output_file, config.enable_tls, report.measured);
        exporter.export(&results)?;

        let elapsed = started.elapsed();
        self.reporter.finished(exporter.path(), results.len(), elapsed);
        log_info!(logger, "Wrote {} rows to {}", results.len(), config.output_file);

        Ok(ScanOutcome {
            results,
            written: Some(exporter.path().to_path_buf()),
            elapsed,
        })
    }
}
