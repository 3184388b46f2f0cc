//! Structured logging for the endpoint scanner
//!
//! Per-endpoint failures are logged at `Debug` through [`NetworkLogger`], so
//! they stay invisible unless `--verbose` (or `--debug`) is given. Stage
//! summaries go through [`StageLogger`]. Every logger created by one
//! [`LoggerFactory`] shares the same session id.

use crate::error::{AppError, Result};
use crate::models::{Config, Endpoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level - most detailed
    Trace = 0,
    /// Debug level - per-endpoint diagnostics
    Debug = 1,
    /// Info level - general application information
    Info = 2,
    /// Warning level - skipped input, degraded behaviour
    Warn = 3,
    /// Error level - error events but application can continue
    Error = 4,
    /// Fatal level - the run is aborted
    Fatal = 5,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Get ANSI color code for console output
    pub fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Trace => "\x1b[37m",
            LogLevel::Debug => "\x1b[36m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Fatal => "\x1b[35m",
        }
    }

    /// Reset ANSI color code
    pub fn reset_code() -> &'static str {
        "\x1b[0m"
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Logger name/component
    pub logger: String,
    /// Correlation ID for tracking related events
    pub correlation_id: Option<String>,
    /// Additional structured fields
    pub fields: HashMap<String, serde_json::Value>,
    /// File and line information
    pub location: Option<LogLocation>,
}

/// Source code location information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLocation {
    pub file: String,
    pub line: u32,
    pub module: Option<String>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
}

/// Shared logging context for correlation and session tracking
#[derive(Debug, Default)]
struct LogContext {
    session_id: Option<String>,
    context_fields: HashMap<String, serde_json::Value>,
}

/// Logger implementation with multiple output formats
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    include_location: bool,
    format: LogFormat,
    name: String,
    context: Arc<RwLock<LogContext>>,
}

impl Logger {
    /// Create a new logger
    pub fn new(name: String) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: true,
            include_location: false,
            format: LogFormat::Console,
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Create a logger with specific configuration
    pub fn with_config(name: String, config: &Config) -> Self {
        let min_level = if config.debug {
            LogLevel::Trace
        } else if config.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        };

        Self {
            min_level,
            use_color: config.enable_color,
            include_location: config.debug,
            format: if config.debug { LogFormat::Json } else { LogFormat::Console },
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Set session correlation ID
    pub async fn set_session_id(&self, session_id: String) {
        let mut context = self.context.write().await;
        context.session_id = Some(session_id);
    }

    /// Add context field for all subsequent log entries
    pub async fn add_context_field<T: Serialize>(&self, key: String, value: T) {
        if let Ok(json_value) = serde_json::to_value(value) {
            let mut context = self.context.write().await;
            context.context_fields.insert(key, json_value);
        }
    }

    /// Create a log entry builder
    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn trace(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Trace, message)
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    /// Check if a log level would be output
    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    async fn write_entry(&self, mut entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }

        let context = self.context.read().await;
        if let Some(session_id) = &context.session_id {
            entry.fields.insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
        }
        for (key, value) in &context.context_fields {
            entry.fields.insert(key.clone(), value.clone());
        }
        drop(context);

        let output = match self.format {
            LogFormat::Console => self.format_console(&entry),
            LogFormat::Json => self.format_json(&entry),
        };

        // Progress lines own stdout; diagnostics never interleave with them.
        let _ = writeln!(io::stderr(), "{}", output);
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = entry.level.as_str();

        let formatted_level = if self.use_color {
            format!("{}{:>5}{}", entry.level.color_code(), level_str, LogLevel::reset_code())
        } else {
            format!("{:>5}", level_str)
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(correlation_id) = &entry.correlation_id {
            let short = correlation_id.get(..8).unwrap_or(correlation_id);
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let mut fields: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            fields.sort();
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }

        if self.include_location {
            if let Some(location) = &entry.location {
                output.push_str(&format!(" @ {}:{}", location.file, location.line));
            }
        }

        output
    }

    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!("{{\"error\": \"Failed to serialize log entry\", \"message\": \"{}\"}}", entry.message),
        }
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: HashMap::new(),
                location: None,
            },
        }
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    pub fn location(mut self, file: &str, line: u32, module: Option<&str>) -> Self {
        self.entry.location = Some(LogLocation {
            file: file.to_string(),
            line,
            module: module.map(String::from),
        });
        self
    }

    /// Attach the endpoint as `ip` / `port` fields
    pub fn endpoint(self, endpoint: &Endpoint) -> Self {
        self.field("ip", endpoint.address.to_string()).field("port", endpoint.port)
    }

    /// Add error information
    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
    }

    /// Finalize and write the log entry
    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

/// Logger for per-endpoint network events
#[derive(Clone)]
pub struct NetworkLogger {
    logger: Logger,
}

impl NetworkLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("NET".to_string(), config),
        }
    }

    /// Log a dial attempt
    pub async fn log_connection(&self, endpoint: &Endpoint, connect_time: Option<Duration>, error: Option<&AppError>) {
        let mut builder = match (connect_time, error) {
            (Some(elapsed), _) => self
                .logger
                .trace(&format!("Connected to {} in {}ms", endpoint, elapsed.as_millis()))
                .field("connect_ms", elapsed.as_millis() as u64),
            (None, err) => self.logger.debug(&format!(
                "Failed to connect to {}: {}",
                endpoint,
                err.map_or("unknown error".to_string(), |e| e.to_string())
            )),
        };
        builder = builder.endpoint(endpoint).field("success", connect_time.is_some());
        if let Some(err) = error {
            builder = builder.error_info(err);
        }
        builder.log().await;
    }

    /// Log an HTTP exchange over a pinned connection
    pub async fn log_http_request(&self, endpoint: &Endpoint, path: &str, status_code: Option<u16>, duration: Duration) {
        let level = if status_code.is_some() { LogLevel::Trace } else { LogLevel::Debug };
        let message = format!(
            "GET {} via {} -> {} in {}ms",
            path,
            endpoint,
            status_code.map_or("FAILED".to_string(), |c| c.to_string()),
            duration.as_millis()
        );

        self.logger
            .log(level, &message)
            .endpoint(endpoint)
            .field("path", path)
            .field("status_code", status_code)
            .field("duration_ms", duration.as_millis() as u64)
            .log()
            .await;
    }

    /// Log an endpoint dropped by a probing stage
    pub async fn log_rejection(&self, stage: &str, endpoint: &Endpoint, error: &AppError) {
        self.logger
            .debug(&format!("{} rejected {}: {}", stage, endpoint, error))
            .endpoint(endpoint)
            .field("stage", stage)
            .error_info(error)
            .log()
            .await;
    }

    /// Log an endpoint excluded by the facility allow-list
    pub async fn log_filtered(&self, endpoint: &Endpoint, facility_code: &str) {
        self.logger
            .debug(&format!("filtered {} ({})", endpoint, facility_code))
            .endpoint(endpoint)
            .field("facility", facility_code)
            .log()
            .await;
    }
}

/// Logger for stage lifecycle and summaries
pub struct StageLogger {
    logger: Logger,
}

impl StageLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("STAGE".to_string(), config),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Log the start of a stage and return its correlation id
    pub async fn start_stage(&self, stage: &str, total: usize) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        self.logger
            .debug(&format!("Started {} stage with {} candidates", stage, total))
            .correlation_id(&correlation_id)
            .field("stage", stage)
            .field("total", total)
            .log()
            .await;
        correlation_id
    }

    /// Log completion of a stage
    pub async fn end_stage(&self, correlation_id: &str, stage: &str, processed: usize, accepted: usize, elapsed: Duration) {
        self.logger
            .debug(&format!(
                "Completed {} stage: {} processed, {} accepted in {:.3}s",
                stage,
                processed,
                accepted,
                elapsed.as_secs_f64()
            ))
            .correlation_id(correlation_id)
            .field("stage", stage)
            .field("processed", processed)
            .field("accepted", accepted)
            .field("elapsed_ms", elapsed.as_millis() as u64)
            .log()
            .await;
    }
}

/// Hands out loggers sharing one session id
pub struct LoggerFactory {
    config: Config,
    session_id: String,
}

impl LoggerFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a logger with a specific name
    pub async fn create_logger(&self, name: &str) -> Logger {
        let logger = Logger::with_config(name.to_string(), &self.config);
        logger.set_session_id(self.session_id.clone()).await;
        logger
    }

    pub async fn create_network_logger(&self) -> NetworkLogger {
        let network = NetworkLogger::new(&self.config);
        network.logger.set_session_id(self.session_id.clone()).await;
        network
    }

    pub async fn create_stage_logger(&self) -> StageLogger {
        let stage = StageLogger::new(&self.config);
        stage.logger.set_session_id(self.session_id.clone()).await;
        stage
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Convenience macros for logging with location information
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}
