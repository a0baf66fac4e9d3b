//! Tunable constants for the analytics engine.
//!
//! Every field has a default, so an empty TOML table deserializes to the
//! documented behaviour. [`AnalyticsConfig::validate`] must be called once
//! before the configuration is used.

use serde::{Deserialize, Serialize};
use site_forecast_analytics_models::CostInputs;

use crate::AnalyticsError;

/// Weight of own-store density in the saturation score.
pub const DEFAULT_OWN_DENSITY_WEIGHT: f64 = 0.6;
/// Weight of competitor presence in the saturation score.
pub const DEFAULT_COMPETITOR_WEIGHT: f64 = 0.4;
/// Stores per 100k residents at which a market counts as mature.
pub const DEFAULT_OWN_DENSITY_CEILING_PER_100K: f64 = 2.0;
/// Competitor count at which competitive pressure is maxed out.
pub const DEFAULT_COMPETITOR_COUNT_CEILING: f64 = 10.0;
/// Residents per square mile assumed when land area is unknown.
pub const DEFAULT_PEOPLE_PER_SQ_MILE: f64 = 3_000.0;
/// Radius within which anchors count toward synergy.
pub const DEFAULT_SYNERGY_RADIUS_MILES: f64 = 1.0;
/// Payback below this many years is a strong investment.
pub const DEFAULT_STRONG_PAYBACK_YEARS: f64 = 7.0;
/// Payback up to this many years is a moderate investment.
pub const DEFAULT_MODERATE_PAYBACK_YEARS: f64 = 12.0;

/// Complementary retailers whose presence raises synergy.
pub const DEFAULT_ANCHOR_BRANDS: &[&str] = &[
    "Target",
    "Walmart",
    "Costco",
    "Kroger",
    "Home Depot",
    "Lowe's",
    "Best Buy",
];

/// Root analytics configuration (`[analytics]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// `[analytics.saturation]`
    pub saturation: SaturationWeights,
    /// `[analytics.density]`
    pub density: DensityConfig,
    /// `[analytics.synergy]`
    pub synergy: SynergyConfig,
    /// `[analytics.parcels]`
    pub parcels: ParcelFilter,
    /// `[analytics.roi]`
    pub roi: RoiConfig,
    /// `[analytics.cost]`
    pub cost: CostInputs,
}

/// Weights and reference ceilings of the saturation formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaturationWeights {
    /// Weight of own-store density.
    pub own_density_weight: f64,
    /// Weight of competitor presence.
    pub competitor_weight: f64,
    /// Own density at which the own-density term saturates.
    pub own_density_ceiling_per_100k: f64,
    /// Competitor count at which the competition term saturates.
    pub competitor_count_ceiling: f64,
}

impl Default for SaturationWeights {
    fn default() -> Self {
        Self {
            own_density_weight: DEFAULT_OWN_DENSITY_WEIGHT,
            competitor_weight: DEFAULT_COMPETITOR_WEIGHT,
            own_density_ceiling_per_100k: DEFAULT_OWN_DENSITY_CEILING_PER_100K,
            competitor_count_ceiling: DEFAULT_COMPETITOR_COUNT_CEILING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    /// Used to estimate land area as `population / assumed_people_per_sq_mile`.
    pub assumed_people_per_sq_mile: f64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            assumed_people_per_sq_mile: DEFAULT_PEOPLE_PER_SQ_MILE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynergyConfig {
    /// Radius in miles within which anchors count.
    pub radius_miles: f64,
    /// Matched case-insensitively as a substring of a location's brand.
    pub anchor_brands: Vec<String>,
}

impl Default for SynergyConfig {
    fn default() -> Self {
        Self {
            radius_miles: DEFAULT_SYNERGY_RADIUS_MILES,
            anchor_brands: DEFAULT_ANCHOR_BRANDS
                .iter()
                .map(|b| (*b).to_string())
                .collect(),
        }
    }
}

/// Acreage window a parcel must fall in to be a site candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParcelFilter {
    /// Smallest acceptable parcel, in acres.
    pub min_acreage: f64,
    /// Largest acceptable parcel, in acres.
    pub max_acreage: f64,
}

impl Default for ParcelFilter {
    fn default() -> Self {
        Self {
            min_acreage: 15.0,
            max_acreage: 25.0,
        }
    }
}

impl ParcelFilter {
    #[must_use]
    pub fn accepts(&self, acreage: f64) -> bool {
        (self.min_acreage..=self.max_acreage).contains(&acreage)
    }
}

/// Revenue model and recommendation thresholds for ROI estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    /// Annual retail spend per resident in dollars.
    pub base_per_capita_spend: f64,
    /// Median income that maps to an income factor of 1.0.
    pub reference_median_income: f64,
    /// Lower clamp of the income factor.
    pub min_income_factor: f64,
    /// Upper clamp of the income factor.
    pub max_income_factor: f64,
    /// Share of local spend a new store captures.
    pub capture_rate: f64,
    /// Share of revenue kept as annual profit.
    pub profit_margin: f64,
    /// Revenue is divided by `1 + existing_store_penalty * existing_stores`.
    pub existing_store_penalty: f64,
    /// Payback below this many years is strong.
    pub strong_payback_years: f64,
    /// Payback up to this many years is moderate.
    pub moderate_payback_years: f64,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            base_per_capita_spend: 4_000.0,
            reference_median_income: 50_000.0,
            min_income_factor: 0.5,
            max_income_factor: 1.5,
            capture_rate: 0.10,
            profit_margin: 0.10,
            existing_store_penalty: 0.2,
            strong_payback_years: DEFAULT_STRONG_PAYBACK_YEARS,
            moderate_payback_years: DEFAULT_MODERATE_PAYBACK_YEARS,
        }
    }
}

fn invalid(message: impl Into<String>) -> AnalyticsError {
    AnalyticsError::InvalidConfig {
        message: message.into(),
    }
}

fn require_positive(name: &str, value: f64) -> Result<(), AnalyticsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be a positive number, got {value}")))
    }
}

fn require_non_negative(name: &str, value: f64) -> Result<(), AnalyticsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be non-negative, got {value}")))
    }
}

impl AnalyticsConfig {
    /// Checks that every weight, ceiling and range is usable.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        let s = &self.saturation;
        require_non_negative("saturation.own_density_weight", s.own_density_weight)?;
        require_non_negative("saturation.competitor_weight", s.competitor_weight)?;
        require_positive(
            "saturation weight sum",
            s.own_density_weight + s.competitor_weight,
        )?;
        require_positive(
            "saturation.own_density_ceiling_per_100k",
            s.own_density_ceiling_per_100k,
        )?;
        require_positive(
            "saturation.competitor_count_ceiling",
            s.competitor_count_ceiling,
        )?;

        require_positive(
            "density.assumed_people_per_sq_mile",
            self.density.assumed_people_per_sq_mile,
        )?;
        require_positive("synergy.radius_miles", self.synergy.radius_miles)?;
        if self.synergy.anchor_brands.iter().any(|b| b.trim().is_empty()) {
            return Err(invalid("synergy.anchor_brands must not contain blank names"));
        }

        let p = &self.parcels;
        require_non_negative("parcels.min_acreage", p.min_acreage)?;
        require_non_negative("parcels.max_acreage", p.max_acreage)?;
        if p.min_acreage > p.max_acreage {
            return Err(invalid(format!(
                "parcels.min_acreage ({}) exceeds parcels.max_acreage ({})",
                p.min_acreage, p.max_acreage
            )));
        }

        let r = &self.roi;
        require_positive("roi.base_per_capita_spend", r.base_per_capita_spend)?;
        require_positive("roi.reference_median_income", r.reference_median_income)?;
        require_positive("roi.min_income_factor", r.min_income_factor)?;
        require_positive("roi.max_income_factor", r.max_income_factor)?;
        if r.min_income_factor > r.max_income_factor {
            return Err(invalid("roi.min_income_factor exceeds roi.max_income_factor"));
        }
        require_positive("roi.capture_rate", r.capture_rate)?;
        require_positive("roi.profit_margin", r.profit_margin)?;
        require_non_negative("roi.existing_store_penalty", r.existing_store_penalty)?;
        require_positive("roi.strong_payback_years", r.strong_payback_years)?;
        require_positive("roi.moderate_payback_years", r.moderate_payback_years)?;
        if r.strong_payback_years > r.moderate_payback_years {
            return Err(invalid(
                "roi.strong_payback_years exceeds roi.moderate_payback_years",
            ));
        }

        let c = &self.cost;
        require_non_negative("cost.store_size_sqft", c.store_size_sqft)?;
        require_non_negative("cost.land_cost_per_acre", c.land_cost_per_acre)?;
        require_non_negative(
            "cost.construction_cost_per_sqft",
            c.construction_cost_per_sqft,
        )?;
        require_non_negative("cost.land_acres_needed", c.land_acres_needed)?;
        require_positive(
            "total investment",
            c.land_acres_needed
                .mul_add(c.land_cost_per_acre, c.store_size_sqft * c.construction_cost_per_sqft),
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AnalyticsConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config: AnalyticsConfig = toml::de::from_str(
            r"
            [saturation]
            own_density_weight = 0.5
            competitor_weight = 0.5

            [roi]
            strong_payback_years = 5.0
            ",
        )
        .unwrap();

        assert!((config.saturation.own_density_weight - 0.5).abs() < f64::EPSILON);
        assert!(
            (config.saturation.own_density_ceiling_per_100k
                - DEFAULT_OWN_DENSITY_CEILING_PER_100K)
                .abs()
                < f64::EPSILON
        );
        assert!((config.roi.strong_payback_years - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.synergy.anchor_brands.len(), DEFAULT_ANCHOR_BRANDS.len());
        config.validate().unwrap();
    }

    #[test]
    fn rejects_zero_weight_sum() {
        let mut config = AnalyticsConfig::default();
        config.saturation.own_density_weight = 0.0;
        config.saturation.competitor_weight = 0.0;
        assert!(matches!(
            config.validate(),
            Err(AnalyticsError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_inverted_ranges() {
        let mut config = AnalyticsConfig::default();
        config.parcels.min_acreage = 30.0;
        assert!(config.validate().is_err());

        let mut config = AnalyticsConfig::default();
        config.roi.strong_payback_years = 15.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_ceiling() {
        let mut config = AnalyticsConfig::default();
        config.saturation.competitor_count_ceiling = f64::NAN;
        assert!(config.validate().is_err());
    }
}
