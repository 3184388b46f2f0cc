//! Catalog loading with a local file cache
//!
//! The cache file is used as-is when it exists. Otherwise the remote list is
//! fetched once, parsed, and its raw body written to the cache path. Any
//! failure along the way is fatal for the run.

use super::LocationCatalog;
use crate::{AppError, Result};
use reqwest::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a loaded catalog came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOrigin {
    Cache,
    Downloaded,
}

pub struct CatalogSource {
    cache_path: PathBuf,
    url: String,
}

impl CatalogSource {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(cache_path: P, url: S) -> Self {
        Self {
            cache_path: cache_path.into(),
            url: url.into(),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether `load` will use the cache instead of the network
    pub fn is_cached(&self) -> bool {
        self.cache_path.exists()
    }

    pub async fn load(&self) -> Result<(LocationCatalog, CatalogOrigin)> {
        if self.is_cached() {
            let body = fs::read_to_string(&self.cache_path).map_err(|e| {
                AppError::catalog(format!("Failed to read '{}': {}", self.cache_path.display(), e))
            })?;
            let catalog = LocationCatalog::from_json(&body)?;
            return Ok((catalog, CatalogOrigin::Cache));
        }

        let body = self.fetch().await?;
        let catalog = LocationCatalog::from_json(&body)?;
        self.store(&body)?;
        Ok((catalog, CatalogOrigin::Downloaded))
    }

    async fn fetch(&self) -> Result<String> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::catalog(format!("Failed to create HTTP client: {}", e)))?;

        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::catalog(format!("Failed to fetch {}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::catalog(format!("Fetching {} returned HTTP {}", self.url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::catalog(format!("Failed to read response from {}: {}", self.url, e)))
    }

    fn store(&self, body: &str) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    AppError::catalog(format!("Failed to create directory '{}': {}", parent.display(), e))
                })?;
            }
        }
        fs::write(&self.cache_path, body)
            .map_err(|e| AppError::catalog(format!("Failed to write '{}': {}", self.cache_path.display(), e)))
    }
}
