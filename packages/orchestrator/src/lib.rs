#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Analysis run orchestration.
//!
//! An [`Orchestrator`] drives one [`AnalysisRun`] per region through
//! `collecting → analyzing → evaluating → reporting` and into a terminal
//! status. Stages run strictly in order and each one fully materializes
//! its output before the next begins; only per-city analytics run
//! concurrently. Per-city failures are recorded and skipped, a reasoning
//! stage that keeps failing is replaced by the deterministic opportunity
//! ranking (the run ends `partial`), and only a failed collection,
//! cancellation or an internal fault ends a run as `failed`.

pub mod cities;
pub mod config;
pub mod context;
pub mod fallback;
pub mod registry;
pub mod retry;
pub mod store;

use std::sync::Arc;

use site_forecast_ai::AiError;
use site_forecast_ai::reasoning::ReasoningStage;
use site_forecast_analytics::{CityInputs, analyze_city};
use site_forecast_analytics_models::{AnalyticsResult, clamp_score};
use site_forecast_collector::Collector;
use site_forecast_expansion::analyze_region;
use site_forecast_expansion_models::PatternResult;
use site_forecast_run_models::{
    AnalysisRun, InvalidTransition, Prediction, RunStatus, Stage, StageError, StageErrorKind,
};
use site_forecast_site_models::{CollectedSnapshot, Location};
use thiserror::Error;

pub use config::{Config, ConfigError, RunConfig};
pub use context::{RunContext, RunHandle};
pub use registry::RunRegistry;
pub use retry::RetryPolicy;
pub use store::{InMemoryRunStore, RunStore, RunStoreError};

/// Internal inconsistencies of the run state machine. Always fatal.
#[derive(Debug, Error)]
pub enum OrchestrationFault {
    /// A stage tried to move the run to a status that does not follow
    /// the current one.
    #[error(transparent)]
    IllegalTransition(#[from] InvalidTransition),

    /// The task driving a run ended without finishing it.
    #[error("Run task ended abnormally: {message}")]
    TaskAborted {
        /// Description of what went wrong.
        message: String,
    },
}

enum Reasoning {
    Answered(Vec<Prediction>),
    Exhausted(StageError),
}

fn reasoning_error(error: &AiError) -> StageError {
    let kind = if error.is_timeout() {
        StageErrorKind::ReasoningTimeout
    } else {
        StageErrorKind::ReasoningError
    };
    StageError::new(Stage::Evaluate, kind, error.to_string())
}

/// Runs analyses against one collector and one reasoning stage.
pub struct Orchestrator {
    config: Arc<Config>,
    collector: Arc<dyn Collector>,
    reasoning: Arc<dyn ReasoningStage>,
    store: Arc<dyn RunStore>,
}

impl Orchestrator {
    /// Validates `config` and builds an orchestrator that keeps run state
    /// in memory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration fails validation.
    pub fn new(
        config: Config,
        collector: Arc<dyn Collector>,
        reasoning: Arc<dyn ReasoningStage>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            collector,
            reasoning,
            store: Arc::new(InMemoryRunStore::new()),
        })
    }

    /// Replaces the run store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn store(&self) -> Arc<dyn RunStore> {
        Arc::clone(&self.store)
    }

    /// Runs a full analysis of `region` and returns the finished run.
    ///
    /// Never fails: every failure ends up in the run's status and
    /// `stage_errors`.
    pub async fn run(&self, region: &str) -> AnalysisRun {
        let (ctx, handle) = RunContext::create(AnalysisRun::new(region), self.store());
        self.execute(&ctx).await;
        handle.snapshot()
    }

    /// Drives the run behind `ctx` to a terminal status.
    pub async fn execute(&self, ctx: &RunContext) {
        log::info!("Run {} started for {}", ctx.id(), ctx.region());
        ctx.persist().await;
        if let Err(error) = self.drive(ctx).await {
            ctx.fail(error).await;
        }
    }

    async fn drive(&self, ctx: &RunContext) -> Result<(), StageError> {
        let region = ctx.region();

        ctx.advance(RunStatus::Collecting).await?;
        let snapshot = self.collect(ctx, &region).await?;

        ctx.advance(RunStatus::Analyzing).await?;
        let (analytics, patterns) = self.analyze(ctx, &region, snapshot).await?;

        ctx.advance(RunStatus::Evaluating).await?;
        let limit = self.config.run.fallback_limit;
        let (predictions, degraded) = match self.reason(ctx, &analytics, &patterns).await? {
            Reasoning::Answered(mut predictions) => {
                predictions.truncate(limit);
                for prediction in &mut predictions {
                    prediction.confidence_score = clamp_score(prediction.confidence_score);
                }
                (predictions, false)
            }
            Reasoning::Exhausted(error) => {
                log::error!(
                    "Run {}: reasoning gave up; falling back to the opportunity ranking",
                    ctx.id()
                );
                ctx.record_error(error);
                let store_size = self.config.analytics.cost.store_size_sqft;
                (
                    fallback::fallback_predictions(&patterns, limit, store_size),
                    true,
                )
            }
        };

        ctx.advance(RunStatus::Reporting).await?;
        let status = if degraded {
            RunStatus::Partial
        } else {
            RunStatus::Completed
        };
        ctx.finish(status, predictions, analytics, patterns).await
    }

    async fn collect(
        &self,
        ctx: &RunContext,
        region: &str,
    ) -> Result<CollectedSnapshot, StageError> {
        let timeout = self.config.run.collection_timeout();
        let outcome = tokio::select! {
            biased;
            () = ctx.cancelled() => return Err(context::cancelled(Stage::Collect)),
            outcome = tokio::time::timeout(timeout, self.collector.collect(region)) => outcome,
        };

        let failure = |message: String| {
            StageError::new(Stage::Collect, StageErrorKind::CollectionFailure, message)
        };
        let snapshot = match outcome {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => return Err(failure(e.to_string())),
            Err(_) => return Err(failure(format!("collection timed out after {timeout:?}"))),
        };

        if snapshot.is_empty() {
            return Err(failure(format!(
                "collector returned no entities for {region}"
            )));
        }
        let empty = snapshot.empty_signals();
        if !empty.is_empty() {
            log::warn!(
                "Run {}: collected no {} for {region}; continuing without them",
                ctx.id(),
                empty.join(", ")
            );
        }
        Ok(snapshot)
    }

    async fn analyze(
        &self,
        ctx: &RunContext,
        region: &str,
        snapshot: CollectedSnapshot,
    ) -> Result<(Vec<AnalyticsResult>, PatternResult), StageError> {
        let buckets = cities::group_by_city(&snapshot);
        let CollectedSnapshot {
            competitors,
            anchors,
            expansion_events,
            ..
        } = snapshot;
        let synergy_pool: Arc<[Location]> = competitors.iter().chain(&anchors).cloned().collect();
        let region_competitors: Arc<[Location]> = competitors.into();

        log::debug!(
            "Run {}: analyzing {} cities in {region}",
            ctx.id(),
            buckets.len()
        );

        let tasks: Vec<_> = buckets
            .into_values()
            .map(|bucket| {
                let config = Arc::clone(&self.config);
                let region_competitors = Arc::clone(&region_competitors);
                let synergy_pool = Arc::clone(&synergy_pool);
                let label = format!("{}, {}", bucket.city, bucket.state);
                let task = tokio::task::spawn_blocking(move || {
                    let inputs = CityInputs {
                        city: &bucket.city,
                        state: &bucket.state,
                        stores: &bucket.stores,
                        competitors: &bucket.competitors,
                        region_competitors: &region_competitors,
                        synergy_pool: &synergy_pool,
                        demographics: bucket.demographics.as_ref(),
                        parcels: &bucket.parcels,
                    };
                    analyze_city(&inputs, &config.analytics)
                });
                (label, task)
            })
            .collect();

        let mut analytics = Vec::with_capacity(tasks.len());
        for (label, task) in tasks {
            let joined = tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(context::cancelled(Stage::Analyze)),
                joined = task => joined,
            };
            let message = match joined {
                Ok(Ok(result)) => {
                    analytics.push(result);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("analytics task failed: {e}"),
            };
            ctx.record_error(
                StageError::new(Stage::Analyze, StageErrorKind::CityAnalyticsFailure, message)
                    .for_city(label),
            );
        }

        if ctx.is_cancelled() {
            return Err(context::cancelled(Stage::Analyze));
        }

        let patterns = analyze_region(
            region,
            &expansion_events,
            &analytics,
            &self.config.expansion,
        );
        Ok((analytics, patterns))
    }

    async fn reason(
        &self,
        ctx: &RunContext,
        analytics: &[AnalyticsResult],
        patterns: &PatternResult,
    ) -> Result<Reasoning, StageError> {
        let policy = &self.config.run.retry;
        let timeout = self.config.run.reasoning_timeout();
        let mut attempt = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(context::cancelled(Stage::Evaluate)),
                outcome = tokio::time::timeout(
                    timeout,
                    self.reasoning.evaluate(analytics, patterns),
                ) => outcome,
            };

            let (error, transient) = match outcome {
                Ok(Ok(predictions)) => {
                    if attempt > 0 {
                        log::info!(
                            "Run {}: reasoning succeeded on attempt {}",
                            ctx.id(),
                            attempt + 1
                        );
                    }
                    return Ok(Reasoning::Answered(predictions));
                }
                Ok(Err(e)) => (reasoning_error(&e), e.is_transient()),
                Err(_) => (
                    StageError::new(
                        Stage::Evaluate,
                        StageErrorKind::ReasoningTimeout,
                        format!("no answer within {timeout:?}"),
                    ),
                    true,
                ),
            };

            if !policy.should_retry(attempt, transient) {
                let attempts = attempt + 1;
                let plural = if attempts == 1 { "" } else { "s" };
                return Ok(Reasoning::Exhausted(StageError {
                    message: format!(
                        "{} (gave up after {attempts} attempt{plural})",
                        error.message
                    ),
                    ..error
                }));
            }

            let delay = policy.backoff(attempt);
            log::warn!(
                "Run {}: reasoning attempt {}/{} failed: {}; retrying in {delay:?}",
                ctx.id(),
                attempt + 1,
                policy.max_attempts(),
                error.message
            );
            tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(context::cancelled(Stage::Evaluate)),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::NaiveDate;
    use site_forecast_ai::reasoning::OfflineReasoningStage;
    use site_forecast_collector::CollectorError;
    use site_forecast_expansion_models::Maturity;
    use site_forecast_run_models::PredictionSource;
    use site_forecast_site_models::{DemographicRecord, ExpansionEvent};
    use uuid::Uuid;

    use super::*;

    fn store(id: &str, city: &str, lat: f64, lon: f64) -> Location {
        Location {
            id: id.to_string(),
            brand: Some("Publix".to_string()),
            address: format!("{id} Main St"),
            city: city.to_string(),
            state: "GA".to_string(),
            zip: None,
            latitude: Some(lat),
            longitude: Some(lon),
            square_feet: Some(45_000),
        }
    }

    fn demographics(city: &str, population: i64) -> DemographicRecord {
        DemographicRecord {
            city: city.to_string(),
            state: "GA".to_string(),
            population: Some(population),
            median_income: Some(55_000.0),
            median_age: None,
            household_size: None,
            growth_rate: None,
            land_area_sq_mi: None,
            data_year: Some(2022),
        }
    }

    fn opening(city: &str, date: (i32, u32, u32), sequence: u32) -> ExpansionEvent {
        ExpansionEvent {
            city: city.to_string(),
            state: "GA".to_string(),
            opening_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
            sequence,
            latitude: None,
            longitude: None,
        }
    }

    /// Three stores in Athens (population 50,000), two unserved cities
    /// and no competitors anywhere.
    fn region_snapshot() -> CollectedSnapshot {
        CollectedSnapshot {
            stores: vec![
                store("1", "Athens", 33.95, -83.38),
                store("2", "Athens", 33.96, -83.37),
                store("3", "Athens", 33.94, -83.40),
            ],
            demographics: vec![
                demographics("Athens", 50_000),
                demographics("Macon", 150_000),
                demographics("Rome", 36_000),
            ],
            expansion_events: vec![
                opening("Athens", (2015, 3, 1), 1),
                opening("Athens", (2018, 6, 1), 2),
                opening("Athens", (2021, 9, 1), 3),
            ],
            ..CollectedSnapshot::default()
        }
    }

    struct FixedCollector(Result<CollectedSnapshot, String>);

    #[async_trait::async_trait]
    impl Collector for FixedCollector {
        async fn collect(&self, _region: &str) -> Result<CollectedSnapshot, CollectorError> {
            self.0.clone().map_err(|message| CollectorError::Upstream { message })
        }
    }

    struct SlowCollector(Duration);

    #[async_trait::async_trait]
    impl Collector for SlowCollector {
        async fn collect(&self, _region: &str) -> Result<CollectedSnapshot, CollectorError> {
            tokio::time::sleep(self.0).await;
            Ok(region_snapshot())
        }
    }

    /// Cancels the run the moment it is stored as analyzing.
    #[derive(Default)]
    struct CancelWhileAnalyzing {
        handle: OnceLock<RunHandle>,
        runs: InMemoryRunStore,
    }

    #[async_trait::async_trait]
    impl RunStore for CancelWhileAnalyzing {
        async fn save(&self, run: &AnalysisRun) -> Result<(), RunStoreError> {
            if run.status == RunStatus::Analyzing
                && let Some(handle) = self.handle.get()
            {
                handle.cancel();
            }
            self.runs.save(run).await
        }

        async fn load(&self, id: Uuid) -> Result<Option<AnalysisRun>, RunStoreError> {
            self.runs.load(id).await
        }
    }

    /// Replays one scripted outcome per call; the last one repeats.
    /// `None` never answers.
    struct ScriptedReasoner {
        script: Vec<Option<Result<Vec<Prediction>, u16>>>,
        calls: AtomicUsize,
    }

    impl ScriptedReasoner {
        fn new(script: Vec<Option<Result<Vec<Prediction>, u16>>>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ReasoningStage for ScriptedReasoner {
        async fn evaluate(
            &self,
            _analytics: &[AnalyticsResult],
            _patterns: &PatternResult,
        ) -> Result<Vec<Prediction>, AiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.script[call.min(self.script.len() - 1)].clone();
            match step {
                None => std::future::pending().await,
                Some(Ok(predictions)) => Ok(predictions),
                Some(Err(status)) => Err(AiError::Provider {
                    status: Some(status),
                    message: format!("HTTP {status}"),
                }),
            }
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.run.reasoning_timeout_secs = 0.02;
        config.run.retry.initial_backoff_ms = 1;
        config.run.retry.max_backoff_ms = 5;
        config
    }

    fn orchestrator(
        snapshot: Result<CollectedSnapshot, String>,
        reasoning: Arc<dyn ReasoningStage>,
    ) -> Orchestrator {
        Orchestrator::new(fast_config(), Arc::new(FixedCollector(snapshot)), reasoning).unwrap()
    }

    fn statuses(run: &AnalysisRun) -> Vec<RunStatus> {
        run.transitions.iter().map(|t| t.status).collect()
    }

    #[tokio::test]
    async fn reasoning_answer_completes_the_run() {
        let answer = Prediction::new("Macon", "GA", 0.8, PredictionSource::Reasoning);
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Some(Ok(vec![answer]))]));
        let run = orchestrator(Ok(region_snapshot()), reasoner.clone())
            .run("GA")
            .await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(
            statuses(&run),
            [
                RunStatus::Pending,
                RunStatus::Collecting,
                RunStatus::Analyzing,
                RunStatus::Evaluating,
                RunStatus::Reporting,
                RunStatus::Completed,
            ]
        );
        assert_eq!(reasoner.calls(), 1);
        assert!(run.stage_errors.is_empty());
        assert_eq!(run.predictions.len(), 1);

        let report = run.report.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.per_city_analytics.len(), 3);

        let athens = report
            .per_city_analytics
            .iter()
            .find(|a| a.city == "Athens")
            .unwrap();
        assert_eq!(athens.store_count, 3);
        assert!((athens.stores_per_100k.unwrap() - 6.0).abs() < 1e-9);
        assert!((athens.saturation_score - 0.6).abs() < 1e-9);
        assert_eq!(athens.nearest_competitor_distance_miles, None);

        let patterns = report.pattern_summary.unwrap();
        assert_eq!(patterns.entry_sequence.len(), 1);
        assert!(patterns.velocity.is_some());
        assert!(patterns.opportunity_ranking.iter().all(|c| c.city != "Athens"));
    }

    #[tokio::test]
    async fn region_without_openings_still_completes() {
        let mut snapshot = region_snapshot();
        snapshot.expansion_events.clear();
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Some(Ok(Vec::new()))]));
        let run = orchestrator(Ok(snapshot), reasoner).run("GA").await;

        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.predictions.is_empty());
        let patterns = run.report.unwrap().pattern_summary.unwrap();
        assert_eq!(patterns.velocity, None);
        assert_eq!(patterns.maturity, Maturity::Emerging);
    }

    #[tokio::test]
    async fn reasoning_timeouts_degrade_to_fallback_ranking() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![None]));
        let run = orchestrator(Ok(region_snapshot()), reasoner.clone())
            .run("GA")
            .await;

        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!(reasoner.calls(), 3);
        assert!(statuses(&run).contains(&RunStatus::Reporting));

        let timeouts: Vec<_> = run
            .stage_errors
            .iter()
            .filter(|e| e.kind == StageErrorKind::ReasoningTimeout)
            .collect();
        assert_eq!(timeouts.len(), 1);
        assert_eq!(timeouts[0].stage, Stage::Evaluate);

        let cities: Vec<&str> = run.predictions.iter().map(|p| p.city.as_str()).collect();
        assert_eq!(cities, ["Macon", "Rome"]);
        assert!(run.predictions.iter().all(|p| p.predicted_store_size == Some(45_000)));
        assert!(run
            .predictions
            .iter()
            .all(|p| p.source == PredictionSource::Fallback && p.rationale.is_none()));
        assert_eq!(run.report.unwrap().status, RunStatus::Partial);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let answer = Prediction::new("Rome", "GA", 0.6, PredictionSource::Reasoning);
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            Some(Err(503)),
            Some(Ok(vec![answer])),
        ]));
        let run = orchestrator(Ok(region_snapshot()), reasoner.clone())
            .run("GA")
            .await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(reasoner.calls(), 2);
        assert!(run.stage_errors.is_empty());
        assert_eq!(run.predictions[0].city, "Rome");
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Some(Err(401))]));
        let run = orchestrator(Ok(region_snapshot()), reasoner.clone())
            .run("GA")
            .await;

        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!(reasoner.calls(), 1);
        assert_eq!(run.stage_errors.len(), 1);
        assert_eq!(run.stage_errors[0].kind, StageErrorKind::ReasoningError);
        assert!(!run.predictions.is_empty());
    }

    #[tokio::test]
    async fn all_empty_collection_fails_the_run() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Some(Ok(Vec::new()))]));
        let run = orchestrator(Ok(CollectedSnapshot::default()), reasoner.clone())
            .run("GA")
            .await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(reasoner.calls(), 0);
        assert_eq!(run.stage_errors.len(), 1);
        assert_eq!(run.stage_errors[0].kind, StageErrorKind::CollectionFailure);
        assert!(!statuses(&run).contains(&RunStatus::Analyzing));

        let report = run.report.unwrap();
        assert!(report.per_city_analytics.is_empty());
        assert!(report.pattern_summary.is_none());
    }

    #[tokio::test]
    async fn slow_collection_times_out_and_fails() {
        let mut config = fast_config();
        config.run.collection_timeout_secs = 0.01;
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Some(Ok(Vec::new()))]));
        let collector = Arc::new(SlowCollector(Duration::from_secs(5)));
        let run = Orchestrator::new(config, collector, reasoner.clone())
            .unwrap()
            .run("GA")
            .await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(reasoner.calls(), 0);
        assert_eq!(run.stage_errors.len(), 1);
        let error = &run.stage_errors[0];
        assert_eq!(error.stage, Stage::Collect);
        assert_eq!(error.kind, StageErrorKind::CollectionFailure);
        assert!(error.message.contains("timed out"), "got {}", error.message);
        assert!(!statuses(&run).contains(&RunStatus::Analyzing));
    }

    #[tokio::test]
    async fn cancelling_during_analysis_discards_analytics() {
        let runs = Arc::new(CancelWhileAnalyzing::default());
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Some(Ok(Vec::new()))]));
        let orchestrator = orchestrator(Ok(region_snapshot()), reasoner.clone());
        let (ctx, handle) = RunContext::create(AnalysisRun::new("GA"), runs.clone());
        assert!(runs.handle.set(handle.clone()).is_ok());

        orchestrator.execute(&ctx).await;

        let run = handle.snapshot();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(reasoner.calls(), 0);
        assert_eq!(run.stage_errors.len(), 1);
        assert_eq!(run.stage_errors[0].kind, StageErrorKind::Cancelled);
        assert_eq!(run.stage_errors[0].stage, Stage::Analyze);
        assert!(statuses(&run).contains(&RunStatus::Analyzing));
        assert!(!statuses(&run).contains(&RunStatus::Evaluating));

        let stored = runs.load(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        let report = stored.report.unwrap();
        assert!(report.predictions.is_empty());
        assert!(report.per_city_analytics.is_empty());
        assert!(report.pattern_summary.is_none());
    }

    #[tokio::test]
    async fn collector_error_fails_the_run() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Some(Ok(Vec::new()))]));
        let run = orchestrator(Err("census API down".to_string()), reasoner)
            .run("GA")
            .await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.stage_errors[0].message.contains("census API down"));
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn malformed_city_is_excluded_not_fatal() {
        let mut snapshot = region_snapshot();
        snapshot.demographics.push(demographics("Valdosta", -5));
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Some(Ok(Vec::new()))]));
        let run = orchestrator(Ok(snapshot), reasoner).run("GA").await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.stage_errors.len(), 1);
        let error = &run.stage_errors[0];
        assert_eq!(error.kind, StageErrorKind::CityAnalyticsFailure);
        assert_eq!(error.city.as_deref(), Some("Valdosta, GA"));

        let report = run.report.unwrap();
        assert_eq!(report.per_city_analytics.len(), 3);
        assert!(report.per_city_analytics.iter().all(|a| a.city != "Valdosta"));
    }

    #[tokio::test]
    async fn offline_runs_are_deterministic() {
        let first = orchestrator(Ok(region_snapshot()), Arc::new(OfflineReasoningStage))
            .run("GA")
            .await;
        let second = orchestrator(Ok(region_snapshot()), Arc::new(OfflineReasoningStage))
            .run("GA")
            .await;

        let key = |run: &AnalysisRun| -> Vec<(String, u64, Vec<String>)> {
            run.predictions
                .iter()
                .map(|p| (p.city.clone(), p.confidence_score.to_bits(), p.key_factors.clone()))
                .collect()
        };
        assert_eq!(first.status, RunStatus::Partial);
        assert_eq!(key(&first), key(&second));
        assert_eq!(
            first.report.unwrap().per_city_analytics,
            second.report.unwrap().per_city_analytics
        );
    }

    #[tokio::test]
    async fn run_store_receives_the_final_state() {
        let runs = Arc::new(InMemoryRunStore::new());
        let orchestrator = orchestrator(Ok(region_snapshot()), Arc::new(OfflineReasoningStage))
            .with_store(runs.clone());
        let run = orchestrator.run("GA").await;

        let stored = runs.load(run.id).await.unwrap().unwrap();
        assert_eq!(stored, run);
    }

    #[test]
    fn invalid_configuration_is_rejected_up_front() {
        let mut config = Config::default();
        config.run.fallback_limit = 0;
        let result = Orchestrator::new(
            config,
            Arc::new(FixedCollector(Ok(region_snapshot()))),
            Arc::new(OfflineReasoningStage),
        );
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
