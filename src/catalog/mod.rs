//! Location catalog
//!
//! Read-only map from facility code (IATA) to location metadata, shared
//! between latency probes behind an `Arc`.

pub mod cache;

pub use cache::{CatalogOrigin, CatalogSource};

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One catalog entry as published by the locations endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub iata: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    /// Country code
    #[serde(default)]
    pub cca2: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
}

#[derive(Debug, Clone, Default)]
pub struct LocationCatalog {
    by_code: HashMap<String, LocationRecord>,
}

impl LocationCatalog {
    /// Later duplicates of a code replace earlier ones
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = LocationRecord>,
    {
        let by_code = records.into_iter().map(|r| (r.iata.clone(), r)).collect();
        Self { by_code }
    }

    /// Parse the JSON array form; an empty array is a valid, empty catalog
    pub fn from_json(body: &str) -> Result<Self> {
        let records: Vec<LocationRecord> = serde_json::from_str(body)
            .map_err(|e| AppError::catalog(format!("Cannot parse location list: {}", e)))?;
        Ok(Self::from_records(records))
    }

    pub fn get(&self, facility_code: &str) -> Option<&LocationRecord> {
        self.by_code.get(facility_code)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}
