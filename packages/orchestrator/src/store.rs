//! Persistence of run state.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use site_forecast_run_models::AnalysisRun;
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by a run store.
#[derive(Debug, Error)]
pub enum RunStoreError {
    /// The backing store rejected the operation.
    #[error("Run store error: {message}")]
    Backend {
        /// Description of what went wrong.
        message: String,
    },
}

/// Receives every version of a run as it moves through its stages.
///
/// Failures are logged by the orchestrator and never change a run's
/// outcome.
#[async_trait::async_trait]
pub trait RunStore: Send + Sync {
    /// Stores the latest version of `run`, replacing earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] if the run could not be stored.
    async fn save(&self, run: &AnalysisRun) -> Result<(), RunStoreError>;

    /// Loads the latest stored version of a run.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] if the store could not be read.
    async fn load(&self, id: Uuid) -> Result<Option<AnalysisRun>, RunStoreError>;
}

/// Keeps the latest version of every run in memory.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<BTreeMap<Uuid, AnalysisRun>>,
}

impl InMemoryRunStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns the stored version of run `id`.
    pub fn remove(&self, id: Uuid) -> Option<AnalysisRun> {
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Drops every run that reached a terminal status and returns how
    /// many were dropped.
    pub fn prune_finished(&self) -> usize {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let before = runs.len();
        runs.retain(|_, run| !run.status.is_terminal());
        before - runs.len()
    }
}

#[async_trait::async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, run: &AnalysisRun) -> Result<(), RunStoreError> {
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run.id, run.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<AnalysisRun>, RunStoreError> {
        Ok(self
            .runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}
