//! The reasoning stage contract and its implementations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use site_forecast_analytics_models::AnalyticsResult;
use site_forecast_expansion_models::PatternResult;
use site_forecast_run_models::{Prediction, PredictionSource};
use site_forecast_site_models::{CityKey, Coordinates};

use crate::AiError;
use crate::providers::LlmProvider;

/// Given the analytics of a region, returns ranked predictions.
///
/// An empty list is a valid answer meaning "no confident predictions".
/// Implementations may be slow or fail; the caller bounds every call with
/// a timeout and retries transient errors.
#[async_trait::async_trait]
pub trait ReasoningStage: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AiError`] if no usable answer could be produced.
    async fn evaluate(
        &self,
        analytics: &[AnalyticsResult],
        patterns: &PatternResult,
    ) -> Result<Vec<Prediction>, AiError>;
}

/// A reasoning stage that always declines, used when no model is
/// available. Runs using it end on the deterministic fallback ranking.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineReasoningStage;

#[async_trait::async_trait]
impl ReasoningStage for OfflineReasoningStage {
    async fn evaluate(
        &self,
        _analytics: &[AnalyticsResult],
        _patterns: &PatternResult,
    ) -> Result<Vec<Prediction>, AiError> {
        Err(AiError::Config {
            message: "reasoning is disabled (offline mode)".to_string(),
        })
    }
}

const SYSTEM_PROMPT: &str = "You are a retail site-selection analyst. You receive per-city \
market analytics and the expansion history of one region for a single store chain. Predict \
which cities the chain is most likely to open its next stores in.

Respond with a single JSON object and nothing else, shaped as:
{\"predictions\": [{\"city\": str, \"state\": str, \"confidence\": number between 0 and 1, \
\"rationale\": str, \"key_factors\": [str], \"predicted_store_size\": square feet or null, \
\"latitude\": number or null, \"longitude\": number or null}]}

Order predictions from most to least likely. Only name cities present in the input. Return \
an empty list if nothing stands out.";

#[derive(Serialize)]
struct PromptPayload<'a> {
    region: &'a str,
    max_predictions: usize,
    patterns: &'a PatternResult,
    cities: &'a [AnalyticsResult],
}

#[derive(Deserialize)]
struct PredictionEnvelope {
    predictions: Vec<RawPrediction>,
}

#[derive(Deserialize)]
struct RawPrediction {
    city: String,
    state: String,
    #[serde(alias = "confidence_score", alias = "confidenceScore")]
    confidence: f64,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default, alias = "keyFactors")]
    key_factors: Vec<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default, alias = "predictedStoreSize")]
    predicted_store_size: Option<f64>,
}

/// Reasoning backed by an LLM provider.
pub struct LlmReasoningStage {
    provider: Box<dyn LlmProvider>,
    max_predictions: usize,
}

impl LlmReasoningStage {
    #[must_use]
    pub fn new(provider: Box<dyn LlmProvider>, max_predictions: usize) -> Self {
        Self {
            provider,
            max_predictions,
        }
    }

    /// Builds a stage on the provider selected by the environment.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Config`] when no provider is configured.
    pub fn from_env(max_predictions: usize) -> Result<Self, AiError> {
        let provider = crate::providers::create_provider_from_env()?;
        log::info!("Reasoning with {}", provider.describe());
        Ok(Self::new(provider, max_predictions))
    }
}

/// Cuts the outermost JSON object out of a model reply, tolerating code
/// fences and surrounding prose.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Parses a model reply into predictions.
///
/// Coordinates missing from the reply are filled from the city's
/// analytics. Predictions beyond `limit` are dropped.
///
/// # Errors
///
/// Returns [`AiError::InvalidResponse`] when the reply holds no JSON
/// object, or [`AiError::Json`] when the object has the wrong shape.
pub fn parse_predictions(
    text: &str,
    analytics: &[AnalyticsResult],
    limit: usize,
) -> Result<Vec<Prediction>, AiError> {
    let json = extract_json_object(text).ok_or_else(|| AiError::InvalidResponse {
        message: "response contains no JSON object".to_string(),
    })?;
    let envelope: PredictionEnvelope = serde_json::from_str(json)?;

    let known: BTreeMap<CityKey, Option<Coordinates>> = analytics
        .iter()
        .map(|a| {
            let site = a.candidate_sites.iter().find_map(|s| s.coordinates);
            (a.city_key(), site.or(a.focal_point))
        })
        .collect();

    Ok(envelope
        .predictions
        .into_iter()
        .take(limit)
        .map(|raw| {
            let key = CityKey::new(&raw.city, &raw.state);
            if !known.contains_key(&key) {
                log::warn!("Reasoning predicted {key}, which has no analytics");
            }
            let mut prediction =
                Prediction::new(raw.city, raw.state, raw.confidence, PredictionSource::Reasoning)
                    .with_store_size_sqft(raw.predicted_store_size);
            prediction.coordinates = Coordinates::from_parts(raw.latitude, raw.longitude)
                .or_else(|| known.get(&key).copied().flatten());
            prediction.rationale = raw.rationale.filter(|r| !r.trim().is_empty());
            prediction.key_factors = raw.key_factors;
            prediction
        })
        .collect())
}

#[async_trait::async_trait]
impl ReasoningStage for LlmReasoningStage {
    async fn evaluate(
        &self,
        analytics: &[AnalyticsResult],
        patterns: &PatternResult,
    ) -> Result<Vec<Prediction>, AiError> {
        let payload = PromptPayload {
            region: &patterns.region,
            max_predictions: self.max_predictions,
            patterns,
            cities: analytics,
        };
        let user_message = serde_json::to_string(&payload)?;

        log::debug!(
            "Asking {} about {} cities in {}",
            self.provider.describe(),
            analytics.len(),
            patterns.region
        );
        let reply = self.provider.complete(SYSTEM_PROMPT, &user_message).await?;
        let predictions = parse_predictions(&reply, analytics, self.max_predictions)?;
        log::info!(
            "Reasoning returned {} predictions for {}",
            predictions.len(),
            patterns.region
        );
        Ok(predictions)
    }
}
