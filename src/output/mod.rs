//! Console output and CSV export
//!
//! Progress lines are rewritten in place with `\r`. Only the end of a stage
//! (or the next whole line) closes them, so a late update from a slower
//! worker can never reopen a finished line.

mod export;

pub use export::CsvExporter;

use crate::{
    catalog::{CatalogOrigin, CatalogSource},
    executor::{ProgressSink, StageSummary},
    expander::Expansion,
    models::{DownloadMeasurement, ProbeResult},
    types::LatencyLevel,
};
use colored::*;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
        }
    }
}

impl ColorScheme {
    pub fn latency(&self, level: LatencyLevel) -> Color {
        match level {
            LatencyLevel::Good => self.success,
            LatencyLevel::Moderate => self.warning,
            LatencyLevel::Poor => self.error,
        }
    }
}

struct Terminal {
    out: Box<dyn Write + Send>,
    /// A `\r` progress line is waiting to be overwritten
    line_open: bool,
}

/// Writes human-facing progress to stdout
pub struct ConsoleReporter {
    colors: ColorScheme,
    enable_color: bool,
    verbose: bool,
    terminal: Mutex<Terminal>,
}

impl ConsoleReporter {
    pub fn new(enable_color: bool, verbose: bool) -> Self {
        Self::with_writer(enable_color, verbose, Box::new(std::io::stdout()))
    }

    pub fn with_writer(enable_color: bool, verbose: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            colors: ColorScheme::default(),
            enable_color,
            verbose,
            terminal: Mutex::new(Terminal { out, line_open: false }),
        }
    }

    fn with_terminal<F: FnOnce(&mut Terminal)>(&self, f: F) {
        let mut terminal = match self.terminal.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut terminal);
        let _ = terminal.out.flush();
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    fn line(&self, text: &str) {
        let clear = if self.enable_color { "\x1b[2K" } else { "" };
        self.with_terminal(|t| {
            if t.line_open {
                let _ = write!(t.out, "\r{}", clear);
                t.line_open = false;
            }
            let _ = writeln!(t.out, "{}", text);
        });
    }

    fn progress(&self, text: &str) {
        self.with_terminal(|t| {
            let _ = write!(t.out, "\r{}", text);
            t.line_open = true;
        });
    }

    /// Close a pending progress line
    fn close_line(&self) {
        self.with_terminal(|t| {
            if t.line_open {
                let _ = writeln!(t.out);
                t.line_open = false;
            }
        });
    }

    pub fn catalog_loaded(&self, source: &CatalogSource, origin: CatalogOrigin, facilities: usize) {
        let text = match origin {
            CatalogOrigin::Cache => format!(
                "Using cached location catalog {} ({} facilities)",
                source.cache_path().display(),
                facilities
            ),
            CatalogOrigin::Downloaded => format!(
                "Downloaded location catalog from {} to {} ({} facilities)",
                source.url(),
                source.cache_path().display(),
                facilities
            ),
        };
        self.line(&self.colorize(&text, self.colors.muted).to_string());
    }

    pub fn expansion(&self, input: &Path, expansion: &Expansion) {
        for skipped in &expansion.skipped {
            let text = format!(
                "Skipped line {}: '{}' ({})",
                skipped.line_number, skipped.content, skipped.reason
            );
            self.line(&self.colorize(&text, self.colors.warning).to_string());
        }
        self.line(&format!(
            "Loaded {} endpoints from {}",
            expansion.endpoints.len(),
            input.display()
        ));
    }

    pub fn warnings(&self, warnings: &[String]) {
        for warning in warnings {
            let text = format!("Warning: {}", warning);
            self.line(&self.colorize(&text, self.colors.warning).to_string());
        }
    }

    pub fn no_survivors(&self) {
        self.close_line();
        self.line(&self.colorize("no valid IP found", self.colors.error).to_string());
    }

    pub fn finished(&self, output: &Path, written: usize, elapsed: Duration) {
        self.close_line();
        let text = format!(
            "Wrote {} results to {} in {}s",
            written,
            output.display(),
            elapsed.as_secs()
        );
        self.line(&self.colorize(&text, self.colors.success).to_string());
    }

    fn percentage(processed: usize, total: usize) -> f64 {
        if total == 0 {
            100.0
        } else {
            processed as f64 / total as f64 * 100.0
        }
    }
}

impl ProgressSink for ConsoleReporter {
    fn latency_progress(&self, processed: usize, total: usize, accepted: usize) {
        let text = format!(
            "Processed {}/{} ({:.2}%), valid: {}",
            processed,
            total,
            Self::percentage(processed, total),
            accepted
        );
        self.progress(&text);
    }

    fn latency_found(&self, result: &ProbeResult, filtered: bool) {
        if filtered && !self.verbose {
            return;
        }
        let location = if result.city.is_empty() {
            "unknown location".to_string()
        } else {
            result.city.clone()
        };
        let latency = format!("{} ms", result.latency_ms());
        let latency = self.colorize(&latency, self.colors.latency(LatencyLevel::from_duration(result.latency)));
        let mut text = format!(
            "Found {} [{}] {} latency {}",
            result.endpoint, result.facility_code, location, latency
        );
        if filtered {
            text.push_str(&self.colorize(" (filtered)", self.colors.muted).to_string());
        }
        self.line(&text);
    }

    fn latency_finished(&self, summary: &StageSummary, cap_reached: bool) {
        self.close_line();
        if cap_reached {
            let text = format!(
                "Latency cap reached, skipping remaining endpoints; valid: {}",
                summary.accepted
            );
            self.line(&self.colorize(&text, self.colors.info).to_string());
        }
    }

    fn download_started(&self, total: usize) {
        self.close_line();
        self.line(&format!("Starting download tests, pending: {}", total));
    }

    fn download_result(&self, index: usize, total: usize, result: &ProbeResult, measurement: &DownloadMeasurement) {
        let prefix = format!("[{}/{}] IP {}", index, total, result.endpoint);
        let text = match measurement {
            DownloadMeasurement::Failed(reason) => {
                let detail = if self.verbose { format!(": {}", reason) } else { String::new() };
                format!("{} {}{}", prefix, self.colorize("invalid", self.colors.error), detail)
            }
            DownloadMeasurement::Completed { aborted_early, .. } => {
                let speed = format!("{:.2} MB/s", measurement.speed_mbps());
                let mut text = format!(
                    "{} speed {}, latency {} ms, {}",
                    prefix,
                    self.colorize(&speed, self.colors.info),
                    result.latency_ms(),
                    result.city
                );
                if *aborted_early {
                    text.push_str(&self.colorize(" (aborted early)", self.colors.muted).to_string());
                }
                text
            }
        };
        self.line(&text);
    }

    fn download_progress(&self, processed: usize, total: usize, accepted: usize, finished: bool) {
        let text = format!(
            "Processed {}/{} ({:.2}%), accepted: {}",
            processed,
            total,
            Self::percentage(processed, total),
            accepted
        );
        self.progress(&text);
        // `finished` is reported under the result lock, so nothing follows it
        if finished {
            self.close_line();
        }
    }
}
