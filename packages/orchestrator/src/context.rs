//! Run-scoped state shared between a running run and its observers.
//!
//! A [`RunContext`] is handed to every stage of one run and is the only
//! thing a stage may mutate. The matching [`RunHandle`] is the read side:
//! it reports the current status and a snapshot of the run at any time,
//! and can request cancellation.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use site_forecast_analytics_models::AnalyticsResult;
use site_forecast_expansion_models::PatternResult;
use site_forecast_run_models::{
    AnalysisRun, InvalidTransition, Prediction, Report, RunStatus, Stage, StageError,
    StageErrorKind,
};
use tokio::sync::watch;
use uuid::Uuid;

use crate::OrchestrationFault;
use crate::store::RunStore;

/// The stage a status belongs to, used to attribute errors.
#[must_use]
pub const fn stage_of(status: RunStatus) -> Stage {
    match status {
        RunStatus::Pending | RunStatus::Collecting => Stage::Collect,
        RunStatus::Analyzing => Stage::Analyze,
        RunStatus::Evaluating => Stage::Evaluate,
        RunStatus::Reporting | RunStatus::Completed | RunStatus::Failed | RunStatus::Partial => {
            Stage::Report
        }
    }
}

pub(crate) fn cancelled(stage: Stage) -> StageError {
    StageError::new(stage, StageErrorKind::Cancelled, "run cancelled by its owner")
}

fn fault(stage: Stage, error: InvalidTransition) -> StageError {
    StageError::new(
        stage,
        StageErrorKind::OrchestrationFault,
        OrchestrationFault::from(error).to_string(),
    )
}

/// Write side of one run.
#[derive(Clone)]
pub struct RunContext {
    run: Arc<RwLock<AnalysisRun>>,
    status: Arc<watch::Sender<RunStatus>>,
    cancel: watch::Receiver<bool>,
    store: Arc<dyn RunStore>,
}

impl RunContext {
    /// Creates the context for `run` together with its handle.
    #[must_use]
    pub fn create(run: AnalysisRun, store: Arc<dyn RunStore>) -> (Self, RunHandle) {
        let (status_tx, status_rx) = watch::channel(run.status);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let id = run.id;
        let region = run.region.clone();
        let run = Arc::new(RwLock::new(run));

        let context = Self {
            run: Arc::clone(&run),
            status: Arc::new(status_tx),
            cancel: cancel_rx,
            store,
        };
        let handle = RunHandle {
            id,
            region,
            run,
            status: status_rx,
            cancel: Arc::new(cancel_tx),
        };
        (context, handle)
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.read(|run| run.id)
    }

    #[must_use]
    pub fn region(&self) -> String {
        self.read(|run| run.region.clone())
    }

    #[must_use]
    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn read<T>(&self, f: impl FnOnce(&AnalysisRun) -> T) -> T {
        let run = self.run.read().unwrap_or_else(PoisonError::into_inner);
        f(&run)
    }

    /// Resolves once cancellation has been requested. Never resolves if
    /// the handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// Hands the current version of the run to the run store.
    pub async fn persist(&self) {
        let snapshot = self.read(AnalysisRun::clone);
        if let Err(e) = self.store.save(&snapshot).await {
            log::warn!("Run {}: failed to store run state: {e}", snapshot.id);
        }
    }

    /// Records a non-fatal error against the run.
    pub fn record_error(&self, error: StageError) {
        log::warn!("Run {}: {error}", self.id());
        self.run
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record_error(error);
    }

    /// Moves the run into the next stage, unless cancellation was
    /// requested first.
    ///
    /// # Errors
    ///
    /// Returns a cancellation error, or an orchestration fault if `next`
    /// is not a legal successor of the current status.
    pub async fn advance(&self, next: RunStatus) -> Result<(), StageError> {
        if self.is_cancelled() {
            return Err(cancelled(stage_of(next)));
        }
        let previous = {
            let mut run = self.run.write().unwrap_or_else(PoisonError::into_inner);
            let previous = run.status;
            run.transition(next).map_err(|e| fault(stage_of(next), e))?;
            previous
        };
        self.status.send_replace(next);
        log::info!("Run {} ({}): {previous} -> {next}", self.id(), self.region());
        self.persist().await;
        Ok(())
    }

    /// Enters the terminal `status` and attaches the final report.
    ///
    /// # Errors
    ///
    /// Returns an orchestration fault if the run cannot move to `status`.
    pub async fn finish(
        &self,
        status: RunStatus,
        predictions: Vec<Prediction>,
        analytics: Vec<AnalyticsResult>,
        patterns: PatternResult,
    ) -> Result<(), StageError> {
        {
            let mut run = self.run.write().unwrap_or_else(PoisonError::into_inner);
            run.transition(status).map_err(|e| fault(Stage::Report, e))?;
            run.report = Some(Report {
                run_id: run.id,
                region: run.region.clone(),
                status,
                predictions: predictions.clone(),
                per_city_analytics: analytics,
                pattern_summary: Some(patterns),
                stage_errors: run.stage_errors.clone(),
                generated_at: Utc::now(),
            });
            run.predictions = predictions;
        }
        self.status.send_replace(status);
        log::info!("Run {} ({}): finished as {status}", self.id(), self.region());
        self.persist().await;
        Ok(())
    }

    /// Records a fatal error and fails the run. A run that already
    /// reached a terminal status keeps it.
    pub async fn fail(&self, error: StageError) {
        log::error!("Run {}: {error}", self.id());
        let failed = {
            let mut run = self.run.write().unwrap_or_else(PoisonError::into_inner);
            run.record_error(error);
            match run.transition(RunStatus::Failed) {
                Ok(()) => {
                    run.predictions.clear();
                    run.report = Some(Report {
                        run_id: run.id,
                        region: run.region.clone(),
                        status: RunStatus::Failed,
                        predictions: Vec::new(),
                        per_city_analytics: Vec::new(),
                        pattern_summary: None,
                        stage_errors: run.stage_errors.clone(),
                        generated_at: Utc::now(),
                    });
                    true
                }
                Err(e) => {
                    log::error!("Run {}: {e}", run.id);
                    false
                }
            }
        };
        if failed {
            self.status.send_replace(RunStatus::Failed);
        }
        self.persist().await;
    }
}

/// Read side of one run.
#[derive(Clone)]
pub struct RunHandle {
    id: Uuid,
    region: String,
    run: Arc<RwLock<AnalysisRun>>,
    status: watch::Receiver<RunStatus>,
    cancel: Arc<watch::Sender<bool>>,
}

impl RunHandle {
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[must_use]
    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// The run as it is right now, including errors recorded so far.
    #[must_use]
    pub fn snapshot(&self) -> AnalysisRun {
        self.run
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Requests cancellation. The run fails at its next suspension point
    /// or stage boundary; a finished run is unaffected.
    pub fn cancel(&self) {
        if !self.status().is_terminal() {
            log::info!("Run {} ({}): cancellation requested", self.id, self.region);
        }
        self.cancel.send_replace(true);
    }

    /// Waits for the run to reach a terminal status and returns it.
    pub async fn wait(&self) -> AnalysisRun {
        let mut rx = self.status.clone();
        let finished = rx.wait_for(|status| status.is_terminal()).await.is_ok();
        if !finished {
            log::warn!("Run {}: stopped reporting status before finishing", self.id);
        }
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use crate::store::InMemoryRunStore;

    use super::*;

    fn context() -> (RunContext, RunHandle, Arc<InMemoryRunStore>) {
        let store = Arc::new(InMemoryRunStore::new());
        let (ctx, handle) = RunContext::create(AnalysisRun::new("KY"), store.clone());
        (ctx, handle, store)
    }

    #[tokio::test]
    async fn illegal_transition_is_an_orchestration_fault() {
        let (ctx, handle, _) = context();
        let err = ctx.advance(RunStatus::Evaluating).await.unwrap_err();
        assert_eq!(err.kind, StageErrorKind::OrchestrationFault);
        assert_eq!(err.stage, Stage::Evaluate);
        assert_eq!(handle.status(), RunStatus::Pending);
    }

    #[tokio::test]
    async fn handle_observes_transitions_and_store_receives_them() {
        let (ctx, handle, store) = context();
        ctx.advance(RunStatus::Collecting).await.unwrap();
        assert_eq!(handle.status(), RunStatus::Collecting);
        assert_eq!(handle.snapshot().transitions.len(), 2);

        ctx.fail(StageError::new(
            Stage::Collect,
            StageErrorKind::CollectionFailure,
            "nothing collected",
        ))
        .await;
        let run = handle.wait().await;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.report.as_ref().map(|r| r.status), Some(RunStatus::Failed));

        let stored = store.load(handle.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn failing_a_finished_run_keeps_its_status() {
        let (ctx, handle, _) = context();
        for status in [
            RunStatus::Collecting,
            RunStatus::Analyzing,
            RunStatus::Evaluating,
            RunStatus::Reporting,
        ] {
            ctx.advance(status).await.unwrap();
        }
        ctx.finish(RunStatus::Completed, Vec::new(), Vec::new(), PatternResult::empty("KY"))
            .await
            .unwrap();
        ctx.fail(StageError::new(Stage::Report, StageErrorKind::OrchestrationFault, "late"))
            .await;

        assert_eq!(handle.status(), RunStatus::Completed);
        assert_eq!(handle.snapshot().stage_errors.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_is_seen_before_the_next_stage() {
        let (ctx, handle, _) = context();
        handle.cancel();
        assert!(ctx.is_cancelled());
        ctx.cancelled().await;
        let err = ctx.advance(RunStatus::Collecting).await.unwrap_err();
        assert_eq!(err.kind, StageErrorKind::Cancelled);
    }
}
