#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Site analytics engine.
//!
//! Turns the collected entities of one city into an [`AnalyticsResult`]:
//! store density, market saturation, competitive proximity, co-tenancy
//! synergy, an ROI estimate and scored candidate parcels. Everything here
//! is a pure function of its inputs; a missing denominator degrades the
//! affected metric to `None` and never aborts the rest of the city.

pub mod config;
pub mod metrics;
pub mod roi;

use std::collections::BTreeMap;

use site_forecast_analytics_models::AnalyticsResult;
use site_forecast_site_models::{DemographicRecord, Location, Parcel};
use thiserror::Error;

pub use config::AnalyticsConfig;

/// Errors that can occur during analytics operations.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A demographic record carries values that cannot be real.
    #[error("Invalid demographic record for {city}, {state}: {message}")]
    InvalidDemographics {
        /// City of the offending record.
        city: String,
        /// State of the offending record.
        state: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The analytics configuration failed validation.
    #[error("Invalid analytics configuration: {message}")]
    InvalidConfig {
        /// Description of what went wrong.
        message: String,
    },
}

/// Everything the engine needs to know about one city.
#[derive(Debug, Clone, Copy)]
pub struct CityInputs<'a> {
    /// City display name.
    pub city: &'a str,
    /// State code.
    pub state: &'a str,
    /// Own-chain stores in the city.
    pub stores: &'a [Location],
    /// Competitor stores in the city.
    pub competitors: &'a [Location],
    /// Competitors across the whole region; the nearest one may sit
    /// across a city line.
    pub region_competitors: &'a [Location],
    /// Locations that can count toward synergy (competitors and anchors).
    pub synergy_pool: &'a [Location],
    /// The city's demographic record, if one was collected.
    pub demographics: Option<&'a DemographicRecord>,
    /// Candidate parcels in the city.
    pub parcels: &'a [Parcel],
}

fn check_demographics(record: &DemographicRecord) -> Result<(), AnalyticsError> {
    let fail = |message: String| AnalyticsError::InvalidDemographics {
        city: record.city.clone(),
        state: record.state.clone(),
        message,
    };

    if let Some(population) = record.population
        && population < 0
    {
        return Err(fail(format!("negative population {population}")));
    }
    if let Some(income) = record.median_income
        && !(income.is_finite() && income >= 0.0)
    {
        return Err(fail(format!("median income {income} is not a valid amount")));
    }
    if let Some(area) = record.land_area_sq_mi
        && !(area.is_finite() && area >= 0.0)
    {
        return Err(fail(format!("land area {area} is not a valid size")));
    }
    if let Some(growth) = record.growth_rate
        && !growth.is_finite()
    {
        return Err(fail(format!("growth rate {growth} is not finite")));
    }

    Ok(())
}

fn count_by_brand(locations: &[Location]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for location in locations {
        let brand = location
            .brand
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or("Unknown");
        *counts.entry(brand.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Computes the full analytics picture for one city.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidDemographics`] when the city's
/// demographic record is malformed (negative population, non-finite
/// income, area or growth).
pub fn analyze_city(
    inputs: &CityInputs<'_>,
    config: &AnalyticsConfig,
) -> Result<AnalyticsResult, AnalyticsError> {
    if let Some(record) = inputs.demographics {
        check_demographics(record)?;
    } else {
        log::debug!(
            "No demographic record for {}, {}; density and ROI are undefined",
            inputs.city,
            inputs.state
        );
    }

    let density = metrics::compute_density(inputs.stores, inputs.demographics, &config.density);
    let saturation_score = metrics::compute_saturation(
        density.stores_per_100k,
        inputs.competitors.len(),
        &config.saturation,
    );

    let focal_point = metrics::focal_point(
        inputs.stores,
        inputs.parcels,
        inputs.competitors,
        &config.parcels,
    );
    let nearest_competitor_distance_miles =
        metrics::compute_proximity(&focal_point, inputs.region_competitors);
    let synergy_score =
        metrics::compute_synergy(&focal_point, inputs.synergy_pool, &config.synergy);

    let roi = inputs.demographics.and_then(|record| {
        roi::compute_roi(record, inputs.stores.len(), &config.cost, &config.roi)
    });

    let candidate_sites = metrics::evaluate_parcels(
        inputs.parcels,
        inputs.region_competitors,
        inputs.synergy_pool,
        &config.parcels,
        &config.synergy,
    );

    log::debug!(
        "{}, {}: {} stores, {} competitors, saturation {saturation_score:.2}, {} candidate sites",
        inputs.city,
        inputs.state,
        inputs.stores.len(),
        inputs.competitors.len(),
        candidate_sites.len()
    );

    Ok(AnalyticsResult {
        city: inputs.city.to_string(),
        state: inputs.state.to_string(),
        population: inputs.demographics.and_then(|d| d.population),
        median_income: inputs.demographics.and_then(|d| d.median_income),
        growth_rate: inputs.demographics.and_then(|d| d.growth_rate),
        store_count: inputs.stores.len(),
        competitor_count: inputs.competitors.len(),
        competitors_by_brand: count_by_brand(inputs.competitors),
        stores_per_100k: density.stores_per_100k,
        stores_per_sq_mile: density.stores_per_sq_mile,
        saturation_score,
        nearest_competitor_distance_miles,
        synergy_score,
        focal_point,
        roi,
        candidate_sites,
    })
}

#[cfg(test)]
mod tests {
    use site_forecast_analytics_models::NEUTRAL_SCORE;

    use super::*;

    fn store(id: &str, brand: Option<&str>, lat: Option<f64>, lon: Option<f64>) -> Location {
        Location {
            id: id.to_string(),
            brand: brand.map(ToString::to_string),
            address: format!("{id} Main St"),
            city: "City A".to_string(),
            state: "TX".to_string(),
            zip: None,
            latitude: lat,
            longitude: lon,
            square_feet: Some(45_000),
        }
    }

    fn record(population: Option<i64>) -> DemographicRecord {
        DemographicRecord {
            city: "City A".to_string(),
            state: "TX".to_string(),
            population,
            median_income: Some(55_000.0),
            median_age: Some(35.0),
            household_size: Some(2.6),
            growth_rate: None,
            land_area_sq_mi: None,
            data_year: Some(2022),
        }
    }

    fn inputs<'a>(
        stores: &'a [Location],
        competitors: &'a [Location],
        demographics: Option<&'a DemographicRecord>,
    ) -> CityInputs<'a> {
        CityInputs {
            city: "City A",
            state: "TX",
            stores,
            competitors,
            region_competitors: competitors,
            synergy_pool: competitors,
            demographics,
            parcels: &[],
        }
    }

    #[test]
    fn three_stores_fifty_thousand_people_no_competitors() {
        let stores = vec![
            store("1", None, Some(30.1), Some(-97.7)),
            store("2", None, Some(30.2), Some(-97.7)),
            store("3", None, None, None),
        ];
        let demo = record(Some(50_000));

        let result = analyze_city(
            &inputs(&stores, &[], Some(&demo)),
            &AnalyticsConfig::default(),
        )
        .unwrap();

        assert!((result.stores_per_100k.unwrap() - 6.0).abs() < 1e-9);
        // 0.6 * min(6 / 2, 1) + 0.4 * 0
        assert!((result.saturation_score - 0.6).abs() < 1e-9);
        assert_eq!(result.nearest_competitor_distance_miles, None);
        assert_eq!(result.competitor_count, 0);
        assert!((result.synergy_score - NEUTRAL_SCORE).abs() < f64::EPSILON);
        assert!(result.roi.is_some());
    }

    #[test]
    fn missing_demographics_still_measures_competition() {
        let stores = vec![store("1", None, Some(30.0), Some(-97.0))];
        let competitors = vec![
            store("c1", Some("Target"), Some(30.001), Some(-97.0)),
            store("c2", Some("Target"), None, None),
            store("c3", None, None, None),
        ];

        let result = analyze_city(
            &inputs(&stores, &competitors, None),
            &AnalyticsConfig::default(),
        )
        .unwrap();

        assert_eq!(result.stores_per_100k, None);
        assert_eq!(result.stores_per_sq_mile, None);
        assert!(result.roi.is_none());
        assert!((result.saturation_score - NEUTRAL_SCORE).abs() < f64::EPSILON);
        assert!(result.nearest_competitor_distance_miles.unwrap() < 0.1);
        // one of seven default anchors within a mile
        assert!((result.synergy_score - 1.0 / 7.0).abs() < 1e-9);
        assert_eq!(result.competitors_by_brand.get("Target"), Some(&2));
        assert_eq!(result.competitors_by_brand.get("Unknown"), Some(&1));
    }

    #[test]
    fn zero_population_keeps_scores_in_range() {
        let stores = vec![store("1", None, None, None)];
        let demo = record(Some(0));

        let result = analyze_city(
            &inputs(&stores, &[], Some(&demo)),
            &AnalyticsConfig::default(),
        )
        .unwrap();

        assert_eq!(result.stores_per_100k, None);
        assert!((0.0..=1.0).contains(&result.saturation_score));
        assert!((0.0..=1.0).contains(&result.synergy_score));
        assert!(result.focal_point.is_none());
    }

    #[test]
    fn malformed_demographics_are_rejected() {
        let stores = vec![store("1", None, None, None)];
        let demo = record(Some(-10));

        let err = analyze_city(
            &inputs(&stores, &[], Some(&demo)),
            &AnalyticsConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidDemographics { .. }));

        let mut demo = record(Some(10_000));
        demo.median_income = Some(f64::NAN);
        assert!(
            analyze_city(
                &inputs(&stores, &[], Some(&demo)),
                &AnalyticsConfig::default()
            )
            .is_err()
        );
    }
}
