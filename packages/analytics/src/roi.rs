//! Return-on-investment estimate for opening one more store in a city.

use site_forecast_analytics_models::{CostInputs, RoiEstimate, RoiRecommendation};
use site_forecast_site_models::DemographicRecord;

use crate::config::RoiConfig;

/// Maps a payback period to a recommendation tier.
///
/// No payback (zero or negative profit) is always poor.
#[must_use]
pub fn recommend(payback_years: Option<f64>, config: &RoiConfig) -> RoiRecommendation {
    match payback_years {
        Some(years) if years < config.strong_payback_years => RoiRecommendation::Strong,
        Some(years) if years <= config.moderate_payback_years => RoiRecommendation::Moderate,
        _ => RoiRecommendation::Poor,
    }
}

/// Income-sensitive multiplier on per-capita spend; 1.0 when income is
/// unknown.
#[must_use]
pub fn income_factor(median_income: Option<f64>, config: &RoiConfig) -> f64 {
    median_income
        .filter(|i| i.is_finite() && *i > 0.0)
        .map_or(1.0, |income| {
            (income / config.reference_median_income)
                .clamp(config.min_income_factor, config.max_income_factor)
        })
}

/// Estimates investment, revenue and payback for a new store.
///
/// Returns `None` when the record has no positive population, since
/// revenue cannot be estimated.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_roi(
    demographics: &DemographicRecord,
    existing_stores: usize,
    cost: &CostInputs,
    config: &RoiConfig,
) -> Option<RoiEstimate> {
    let population = demographics.population.filter(|p| *p > 0)? as f64;

    let land_cost = cost.land_acres_needed * cost.land_cost_per_acre;
    let construction_cost = cost.store_size_sqft * cost.construction_cost_per_sqft;
    let total_investment = land_cost + construction_cost;

    let cannibalization =
        1.0 / config.existing_store_penalty.mul_add(existing_stores as f64, 1.0);
    let annual_revenue = population
        * config.base_per_capita_spend
        * income_factor(demographics.median_income, config)
        * config.capture_rate
        * cannibalization;
    let annual_profit = annual_revenue * config.profit_margin;

    let roi_percentage = if total_investment > 0.0 {
        annual_profit / total_investment * 100.0
    } else {
        0.0
    };
    let payback_years = (annual_profit > 0.0).then(|| total_investment / annual_profit);

    Some(RoiEstimate {
        land_cost,
        construction_cost,
        total_investment,
        annual_revenue,
        annual_profit,
        profit_margin: config.profit_margin,
        roi_percentage,
        payback_years,
        recommendation: recommend(payback_years, config),
    })
}
