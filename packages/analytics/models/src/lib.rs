#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Site analytics result types.
//!
//! An [`AnalyticsResult`] is the quantitative picture of one city: store
//! density, market saturation, competitive proximity, co-tenancy
//! synergy and a return-on-investment estimate. Metrics that cannot be
//! computed from the available inputs are `None` ("undefined") rather
//! than zero; bounded scores are never undefined and fall back to
//! [`NEUTRAL_SCORE`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use site_forecast_site_models::{CityKey, Coordinates, ZoningStatus};
use strum_macros::{AsRefStr, Display, EnumString};

/// Score used when an input needed for a bounded score is missing.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Clamps a score into `[0, 1]`, mapping NaN and infinities to
/// [`NEUTRAL_SCORE`].
#[must_use]
pub fn clamp_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        NEUTRAL_SCORE
    }
}

/// Externally supplied construction and land costs for an ROI estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostInputs {
    /// Planned store size in square feet. Default 45,000.
    pub store_size_sqft: f64,
    /// Land cost per acre in dollars. Default $500,000.
    pub land_cost_per_acre: f64,
    /// Construction cost per square foot in dollars. Default $200.
    pub construction_cost_per_sqft: f64,
    /// Acres of land a store needs. Default 20 (typical 15-25 acre site).
    pub land_acres_needed: f64,
}

impl Default for CostInputs {
    fn default() -> Self {
        Self {
            store_size_sqft: 45_000.0,
            land_cost_per_acre: 500_000.0,
            construction_cost_per_sqft: 200.0,
            land_acres_needed: 20.0,
        }
    }
}

/// Three-tier investment recommendation derived from payback period.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoiRecommendation {
    /// Payback too long (or never).
    Poor,
    /// Acceptable payback.
    Moderate,
    /// Fast payback.
    Strong,
}

/// Return-on-investment estimate for a new store in a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiEstimate {
    /// Land acquisition cost.
    pub land_cost: f64,
    /// Building construction cost.
    pub construction_cost: f64,
    /// Land plus construction.
    pub total_investment: f64,
    /// Estimated annual revenue.
    pub annual_revenue: f64,
    /// Estimated annual profit.
    pub annual_profit: f64,
    /// Profit margin applied to revenue.
    pub profit_margin: f64,
    /// Annual profit as a percentage of total investment.
    pub roi_percentage: f64,
    /// Years to recover the investment; `None` when there is no profit.
    pub payback_years: Option<f64>,
    /// Recommendation tier.
    pub recommendation: RoiRecommendation,
}

/// A parcel that passed the acreage and zoning filters, scored as a
/// concrete site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteCandidate {
    /// Parcel identifier (APN).
    pub parcel_id: String,
    /// Parcel address.
    pub address: String,
    /// Parcel size in acres.
    pub acreage: Option<f64>,
    /// Zoning status.
    pub zoning_status: ZoningStatus,
    /// Parcel location, if geocoded.
    pub coordinates: Option<Coordinates>,
    /// Miles to the nearest competitor; `None` when undefined.
    pub nearest_competitor_distance_miles: Option<f64>,
    /// Fraction of configured anchor brands nearby, in `[0, 1]`.
    pub synergy_score: f64,
}

/// Derived metrics for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResult {
    /// City display name.
    pub city: String,
    /// State code.
    pub state: String,
    /// Population from the demographic record, if any.
    pub population: Option<i64>,
    /// Median household income, if any.
    pub median_income: Option<f64>,
    /// Annual population growth rate, if any.
    pub growth_rate: Option<f64>,
    /// Own-chain stores in the city (with or without coordinates).
    pub store_count: usize,
    /// Competitor stores in the city (with or without coordinates).
    pub competitor_count: usize,
    /// Competitor stores in the city grouped by brand.
    pub competitors_by_brand: BTreeMap<String, usize>,
    /// Own stores per 100,000 residents; `None` without a positive
    /// population.
    pub stores_per_100k: Option<f64>,
    /// Own stores per square mile; `None` without a land area estimate.
    pub stores_per_sq_mile: Option<f64>,
    /// Market saturation in `[0, 1]`; lower means more opportunity.
    pub saturation_score: f64,
    /// Miles from the city's focal point to the nearest competitor.
    pub nearest_competitor_distance_miles: Option<f64>,
    /// Co-tenancy synergy at the city's focal point, in `[0, 1]`.
    pub synergy_score: f64,
    /// Point proximity and synergy are measured from.
    pub focal_point: Option<Coordinates>,
    /// ROI estimate; `None` without a positive population.
    pub roi: Option<RoiEstimate>,
    /// Qualifying parcels, best synergy first.
    pub candidate_sites: Vec<SiteCandidate>,
}

impl AnalyticsResult {
    /// The city bucket this result describes.
    #[must_use]
    pub fn city_key(&self) -> CityKey {
        CityKey::new(&self.city, &self.state)
    }

    /// `1 - saturation_score`: how much room the market has left.
    #[must_use]
    pub fn opportunity_score(&self) -> f64 {
        clamp_score(1.0 - self.saturation_score)
    }
}
