#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Analysis run types.
//!
//! An [`AnalysisRun`] is the mutable record of one regional run. Its
//! status only ever moves forward through the stage sequence
//! `pending → collecting → analyzing → evaluating → reporting →
//! completed`, or jumps to one of the terminal states `failed` and
//! `partial`. Every transition is timestamped and every degraded or
//! failed stage leaves a [`StageError`] behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use site_forecast_analytics_models::{AnalyticsResult, clamp_score};
use site_forecast_expansion_models::PatternResult;
use site_forecast_site_models::Coordinates;
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of an analysis run.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    /// Created, not started.
    #[default]
    Pending,
    /// Waiting on the collector.
    Collecting,
    /// Computing per-city analytics and regional patterns.
    Analyzing,
    /// Waiting on the reasoning stage.
    Evaluating,
    /// Building the report.
    Reporting,
    /// Terminal; every stage succeeded.
    Completed,
    /// Terminal; reachable from any non-terminal status.
    Failed,
    /// Terminal; a stage used a fallback path but the run produced
    /// usable output. Reachable from evaluating or reporting.
    Partial,
}

impl RunStatus {
    /// Position in the stage sequence. Terminal states share the highest
    /// rank.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Collecting => 1,
            Self::Analyzing => 2,
            Self::Evaluating => 3,
            Self::Reporting => 4,
            Self::Completed | Self::Failed | Self::Partial => 5,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Partial)
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            Self::Partial => matches!(self, Self::Evaluating | Self::Reporting),
            Self::Completed => matches!(self, Self::Reporting),
            _ => next.rank() == self.rank() + 1,
        }
    }
}

/// The four analytical stages of a run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Collection of regional entities.
    Collect,
    /// Per-city analytics and the pattern analyzer.
    Analyze,
    /// The reasoning stage and its fallback.
    Evaluate,
    /// Aggregation into the final report.
    Report,
}

/// Failure taxonomy for recorded stage errors.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageErrorKind {
    /// The collector failed or returned nothing. Fatal.
    CollectionFailure,
    /// Analytics for a single city failed; the city is excluded.
    CityAnalyticsFailure,
    /// The reasoning stage did not answer in time.
    ReasoningTimeout,
    /// The reasoning stage answered with an error.
    ReasoningError,
    /// Internal inconsistency in the run state machine. Fatal.
    OrchestrationFault,
    /// The run was cancelled by its owner. Fatal.
    Cancelled,
}

impl StageErrorKind {
    /// Whether an error of this kind ends the run as failed.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::CollectionFailure | Self::OrchestrationFault | Self::Cancelled
        )
    }
}

/// A failure recorded against a stage and optionally a single city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageError {
    /// Stage the error was raised in.
    pub stage: Stage,
    /// `"City, ST"` for errors scoped to one city.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Failure category.
    pub kind: StageErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl StageError {
    #[must_use]
    pub fn new(stage: Stage, kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            city: None,
            kind,
            message: message.into(),
        }
    }

    /// Scopes the error to one city.
    #[must_use]
    pub fn for_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.city {
            Some(city) => write!(f, "[{}/{}] {city}: {}", self.stage, self.kind, self.message),
            None => write!(f, "[{}/{}] {}", self.stage, self.kind, self.message),
        }
    }
}

/// Where a prediction came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PredictionSource {
    /// Returned by the reasoning stage.
    Reasoning,
    /// Derived from the opportunity ranking when reasoning was
    /// unavailable.
    Fallback,
}

/// A predicted future store site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Predicted city.
    pub city: String,
    /// Two-letter state code.
    pub state: String,
    /// Where the store would most plausibly go.
    pub coordinates: Option<Coordinates>,
    /// Always within `[0, 1]`.
    pub confidence_score: f64,
    /// Free-form explanation; `None` for rule-based predictions.
    pub rationale: Option<String>,
    /// Most important factor first.
    pub key_factors: Vec<String>,
    /// Planned store size in square feet.
    pub predicted_store_size: Option<u32>,
    /// When the prediction was made.
    pub created_at: DateTime<Utc>,
    /// Reasoning answer or rule-based fallback.
    pub source: PredictionSource,
}

impl Prediction {
    /// Creates a prediction stamped now, clamping `confidence_score`.
    #[must_use]
    pub fn new(
        city: impl Into<String>,
        state: impl Into<String>,
        confidence_score: f64,
        source: PredictionSource,
    ) -> Self {
        Self {
            city: city.into(),
            state: state.into(),
            coordinates: None,
            confidence_score: clamp_score(confidence_score),
            rationale: None,
            key_factors: Vec::new(),
            predicted_store_size: None,
            created_at: Utc::now(),
            source,
        }
    }

    /// Sets the predicted store size from a square footage, rounding to
    /// whole feet. Non-positive or non-finite sizes clear it.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn with_store_size_sqft(mut self, sqft: Option<f64>) -> Self {
        self.predicted_store_size = sqft
            .filter(|s| s.is_finite() && *s >= 1.0)
            .map(|s| s.round().min(f64::from(u32::MAX)) as u32);
        self
    }
}

/// Final output of a run, handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Run the report belongs to.
    pub run_id: Uuid,
    /// Region analyzed.
    pub region: String,
    /// Terminal status of the run.
    pub status: RunStatus,
    /// Ranked predictions, most likely first.
    pub predictions: Vec<Prediction>,
    /// Analytics of every city that was analyzed successfully.
    pub per_city_analytics: Vec<AnalyticsResult>,
    /// `None` when the run failed.
    pub pattern_summary: Option<PatternResult>,
    /// Every error recorded during the run.
    pub stage_errors: Vec<StageError>,
    /// When the report was built.
    pub generated_at: DateTime<Utc>,
}

/// One entry of a run's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// Status entered.
    pub status: RunStatus,
    /// When it was entered.
    pub at: DateTime<Utc>,
}

/// Error returned when a run is asked to move to an illegal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    /// Current status.
    pub from: RunStatus,
    /// Requested status.
    pub to: RunStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal run transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// One regional analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRun {
    /// Run identifier.
    pub id: Uuid,
    /// Region under analysis.
    pub region: String,
    /// Current status.
    pub status: RunStatus,
    /// When the run was created.
    pub started_at: DateTime<Utc>,
    /// Set when the run reaches a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Every status the run has been in, oldest first.
    pub transitions: Vec<StatusChange>,
    /// Failures recorded so far, oldest first.
    pub stage_errors: Vec<StageError>,
    /// Predictions of a finished run.
    pub predictions: Vec<Prediction>,
    /// Final report; set once the run is terminal.
    pub report: Option<Report>,
}

impl AnalysisRun {
    /// Creates a pending run for `region`.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            region: region.into(),
            status: RunStatus::Pending,
            started_at: now,
            completed_at: None,
            transitions: vec![StatusChange {
                status: RunStatus::Pending,
                at: now,
            }],
            stage_errors: Vec::new(),
            predictions: Vec::new(),
            report: None,
        }
    }

    /// Moves the run to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the run untouched when
    /// `next` is not a legal successor of the current status.
    pub fn transition(&mut self, next: RunStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.transitions.push(StatusChange {
            status: next,
            at: now,
        });
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub fn record_error(&mut self, error: StageError) {
        self.stage_errors.push(error);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
