//! Data models for the endpoint scanner

pub mod config;
pub mod endpoint;
pub mod result;

pub use config::Config;
pub use endpoint::Endpoint;
pub use result::{DownloadMeasurement, ProbeResult, SpeedTestResult};
