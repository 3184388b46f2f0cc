//! CSV export of the ranked results

use crate::{
    error::{ErrorContext, Result},
    models::SpeedTestResult,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const BASE_HEADERS: [&str; 7] = ["IP", "Port", "TLS", "DataCenter", "Region", "City", "LatencyMs"];
const SPEED_HEADER: &str = "DownloadSpeedMBps";

/// Writes one row per result, in the order given
#[derive(Debug, Clone)]
pub struct CsvExporter {
    path: PathBuf,
    tls: bool,
    with_speed: bool,
}

impl CsvExporter {
    /// `with_speed` adds the download column; set it only when downloads ran
    pub fn new<P: Into<PathBuf>>(path: P, tls: bool, with_speed: bool) -> Self {
        Self {
            path: path.into(),
            tls,
            with_speed,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> Vec<&'static str> {
        let mut headers = BASE_HEADERS.to_vec();
        if self.with_speed {
            headers.push(SPEED_HEADER);
        }
        headers
    }

    pub fn record(&self, result: &SpeedTestResult) -> Vec<String> {
        let probe = &result.probe;
        let mut record = vec![
            probe.endpoint.address.to_string(),
            probe.endpoint.port.to_string(),
            self.tls.to_string(),
            probe.facility_code.clone(),
            probe.region.clone(),
            probe.city.clone(),
            probe.latency_ms().to_string(),
        ];
        if self.with_speed {
            record.push(format!("{:.2}", result.speed_mbps().unwrap_or(0.0)));
        }
        record
    }

    /// Create (or truncate) the output file and write every row
    pub fn export(&self, results: &[SpeedTestResult]) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        self.write_to(BufWriter::new(file), results)
    }

    pub fn write_to<W: Write>(&self, writer: W, results: &[SpeedTestResult]) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(self.headers())?;
        for result in results {
            writer.write_record(self.record(result))?;
        }
        writer.flush()?;
        Ok(())
    }
}
