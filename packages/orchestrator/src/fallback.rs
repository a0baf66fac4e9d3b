//! Deterministic predictions derived from the opportunity ranking, used
//! when the reasoning stage gives up.

use site_forecast_expansion_models::{OpportunityCity, PatternResult};
use site_forecast_run_models::{Prediction, PredictionSource};

/// Population treated as "large" by the fallback ranking.
pub const LARGE_POPULATION: i64 = 100_000;

const SATURATION_WEIGHT: f64 = 0.7;
const POPULATION_WEIGHT: f64 = 0.3;

#[allow(clippy::cast_precision_loss)]
fn population_factor(city: &OpportunityCity) -> f64 {
    city.population
        .map_or(0.0, |p| (p.max(0) as f64 / LARGE_POPULATION as f64).min(1.0))
}

fn key_factors(city: &OpportunityCity) -> Vec<String> {
    let mut factors = Vec::new();
    if city.saturation_score < 0.3 {
        factors.push("Low market saturation".to_string());
    }
    if city.population.is_some_and(|p| p > LARGE_POPULATION) {
        factors.push("Large population base".to_string());
    }
    if city.stores_per_100k.is_some_and(|d| d < 1.0) {
        factors.push("Under-served market".to_string());
    }
    if city.synergy_score >= 0.5 {
        factors.push("Complementary anchors nearby".to_string());
    }
    factors
}

/// Turns the first `limit` ranked opportunities into predictions, each
/// sized at the configured `store_size_sqft`.
///
/// Order follows the ranking, so the output is a pure function of the
/// pattern result.
#[must_use]
pub fn fallback_predictions(
    patterns: &PatternResult,
    limit: usize,
    store_size_sqft: f64,
) -> Vec<Prediction> {
    patterns
        .opportunity_ranking
        .iter()
        .take(limit)
        .map(|city| {
            let confidence = SATURATION_WEIGHT.mul_add(
                city.opportunity_score,
                POPULATION_WEIGHT * population_factor(city),
            );
            let mut prediction = Prediction::new(
                city.city.clone(),
                city.state.clone(),
                confidence,
                PredictionSource::Fallback,
            )
            .with_store_size_sqft(Some(store_size_sqft));
            prediction.coordinates = city.coordinates;
            prediction.key_factors = key_factors(city);
            prediction
        })
        .collect()
}
