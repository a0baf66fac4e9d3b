//! Concurrent runs.
//!
//! Each started run gets its own task and its own [`RunContext`]; runs
//! for different regions share nothing but the orchestrator's
//! collaborators.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use site_forecast_run_models::{AnalysisRun, StageError, StageErrorKind};
use uuid::Uuid;

use crate::context::{RunContext, RunHandle, stage_of};
use crate::{OrchestrationFault, Orchestrator};

/// Starts runs in the background and keeps their handles.
pub struct RunRegistry {
    orchestrator: Arc<Orchestrator>,
    runs: RwLock<BTreeMap<Uuid, RunHandle>>,
}

impl RunRegistry {
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            runs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Starts a run for `region` on the current Tokio runtime and returns
    /// its handle immediately.
    pub fn start(&self, region: &str) -> RunHandle {
        let (ctx, handle) = RunContext::create(AnalysisRun::new(region), self.orchestrator.store());
        let orchestrator = Arc::clone(&self.orchestrator);
        let supervisor = ctx.clone();

        tokio::spawn(async move {
            let task = tokio::spawn(async move { orchestrator.execute(&ctx).await });
            if let Err(e) = task.await {
                let fault = OrchestrationFault::TaskAborted {
                    message: e.to_string(),
                };
                supervisor
                    .fail(StageError::new(
                        stage_of(supervisor.status()),
                        StageErrorKind::OrchestrationFault,
                        fault.to_string(),
                    ))
                    .await;
            }
        });

        log::debug!("Started run {} for {region}", handle.id());
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id(), handle.clone());
        handle
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<RunHandle> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Forgets the run `id`. A run still in flight keeps going; only its
    /// handle is released.
    pub fn remove(&self, id: Uuid) -> Option<RunHandle> {
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Drops the handles of runs that reached a terminal status and
    /// returns how many were dropped.
    pub fn prune_finished(&self) -> usize {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let before = runs.len();
        runs.retain(|_, handle| !handle.status().is_terminal());
        let pruned = before - runs.len();
        if pruned > 0 {
            log::debug!("Pruned {pruned} finished runs");
        }
        pruned
    }

    /// Handles of the runs currently held, in id order.
    #[must_use]
    pub fn list(&self) -> Vec<RunHandle> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
