#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Collection of regional entities.
//!
//! A [`Collector`] returns everything known about a region as one
//! [`CollectedSnapshot`]. Scraping and third-party lookups live behind
//! this trait; the crate itself ships a collector over JSON snapshot
//! files and an in-memory [`store::EntityStore`] that deduplicates
//! repeated collection passes by natural business key.

pub mod store;

use std::path::{Path, PathBuf};

use site_forecast_site_models::CollectedSnapshot;
use thiserror::Error;

pub use store::{EntityStore, StoringCollector, UpsertSummary};

/// Errors that can occur while collecting a region.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Reading a snapshot failed.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A snapshot was not valid JSON of the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No data source knows the requested region.
    #[error("Unknown region: {region}")]
    UnknownRegion {
        /// The requested region.
        region: String,
    },

    /// An upstream data source failed.
    #[error("Upstream error: {message}")]
    Upstream {
        /// Description of what went wrong.
        message: String,
    },
}

/// Source of collected entities for a region.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    /// Collects every entity known for `region`.
    ///
    /// Any list in the snapshot may be empty.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError`] if collection failed outright.
    async fn collect(&self, region: &str) -> Result<CollectedSnapshot, CollectorError>;
}

/// Reads snapshots from JSON files.
///
/// When the path is a directory, the snapshot for region `R` is read
/// from `<dir>/R.json`; when it is a file, that file is returned for any
/// region.
#[derive(Debug, Clone)]
pub struct JsonFileCollector {
    path: PathBuf,
}

impl JsonFileCollector {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn resolve(&self, region: &str) -> Result<PathBuf, CollectorError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|source| io_error(&self.path, source))?;
        if !metadata.is_dir() {
            return Ok(self.path.clone());
        }

        let file = self.path.join(format!("{region}.json"));
        if tokio::fs::try_exists(&file)
            .await
            .map_err(|source| io_error(&file, source))?
        {
            Ok(file)
        } else {
            Err(CollectorError::UnknownRegion {
                region: region.to_string(),
            })
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CollectorError {
    CollectorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait::async_trait]
impl Collector for JsonFileCollector {
    async fn collect(&self, region: &str) -> Result<CollectedSnapshot, CollectorError> {
        let file = self.resolve(region).await?;
        let bytes = tokio::fs::read(&file)
            .await
            .map_err(|source| io_error(&file, source))?;
        let snapshot: CollectedSnapshot = serde_json::from_slice(&bytes)?;

        log::info!(
            "Collected {region} from {}: {} stores, {} competitors, {} demographic records, \
             {} parcels, {} openings, {} anchors",
            file.display(),
            snapshot.stores.len(),
            snapshot.competitors.len(),
            snapshot.demographics.len(),
            snapshot.parcels.len(),
            snapshot.expansion_events.len(),
            snapshot.anchors.len(),
        );
        Ok(snapshot)
    }
}
