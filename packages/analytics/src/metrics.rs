//! Individual market metrics.
//!
//! Each function is total: missing inputs yield `None` for unbounded
//! metrics and [`NEUTRAL_SCORE`] for bounded scores.

use site_forecast_analytics_models::{NEUTRAL_SCORE, SiteCandidate, clamp_score};
use site_forecast_site_models::{Coordinates, DemographicRecord, Location, Parcel, ZoningStatus};
use site_forecast_spatial::{Located, centroid, nearest, within_radius};

use crate::config::{DensityConfig, ParcelFilter, SaturationWeights, SynergyConfig};

/// Store density of one city.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Density {
    /// `None` unless the population is known and positive.
    pub stores_per_100k: Option<f64>,
    /// `None` unless a land area is known or can be estimated.
    pub stores_per_sq_mile: Option<f64>,
}

/// Store counts relative to population and land area.
///
/// Every store counts, geocoded or not. Land area comes from the
/// demographic record when present and otherwise is estimated from the
/// population.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_density(
    stores: &[Location],
    demographics: Option<&DemographicRecord>,
    config: &DensityConfig,
) -> Density {
    let count = stores.len() as f64;
    let population = demographics
        .and_then(|d| d.population)
        .filter(|p| *p > 0)
        .map(|p| p as f64);

    let stores_per_100k = population.map(|p| count / (p / 100_000.0));

    let land_area = demographics
        .and_then(|d| d.land_area_sq_mi)
        .filter(|a| a.is_finite() && *a > 0.0)
        .or_else(|| population.map(|p| p / config.assumed_people_per_sq_mile));
    let stores_per_sq_mile = land_area.map(|a| count / a);

    Density {
        stores_per_100k,
        stores_per_sq_mile,
    }
}

/// Weighted blend of own-store density and competitor presence.
///
/// Each term is normalized against its ceiling and capped at 1, then the
/// two are averaged by weight. Undefined density yields the neutral
/// score.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_saturation(
    stores_per_100k: Option<f64>,
    competitor_count: usize,
    weights: &SaturationWeights,
) -> f64 {
    let Some(density) = stores_per_100k else {
        return NEUTRAL_SCORE;
    };

    let own = (density / weights.own_density_ceiling_per_100k).min(1.0);
    let competition = (competitor_count as f64 / weights.competitor_count_ceiling).min(1.0);
    let total_weight = weights.own_density_weight + weights.competitor_weight;

    clamp_score(
        weights
            .own_density_weight
            .mul_add(own, weights.competitor_weight * competition)
            / total_weight,
    )
}

/// Miles from `candidate` to the nearest geocoded competitor.
#[must_use]
pub fn compute_proximity<P: Located + ?Sized>(
    candidate: &P,
    competitors: &[Location],
) -> Option<f64> {
    nearest(candidate, competitors).map(|n| n.distance_miles)
}

fn brand_matches(brand: &str, anchor: &str) -> bool {
    brand.to_lowercase().contains(&anchor.trim().to_lowercase())
}

/// Fraction of configured anchor brands with at least one location
/// within the synergy radius of `candidate`.
///
/// Neutral when the candidate has no coordinates, no anchor brands are
/// configured, or the pool has no geocoded location at all.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_synergy<P: Located + ?Sized>(
    candidate: &P,
    pool: &[Location],
    config: &SynergyConfig,
) -> f64 {
    if config.anchor_brands.is_empty()
        || candidate.coordinates().is_none()
        || !pool.iter().any(|l| l.coordinates().is_some())
    {
        return NEUTRAL_SCORE;
    }

    let nearby: Vec<&str> = within_radius(candidate, pool, config.radius_miles)
        .filter_map(|l| l.brand.as_deref())
        .collect();
    let present = config
        .anchor_brands
        .iter()
        .filter(|anchor| nearby.iter().any(|brand| brand_matches(brand, anchor)))
        .count();

    clamp_score(present as f64 / config.anchor_brands.len() as f64)
}

/// Parcels inside the acreage window whose zoning is not denied.
pub fn qualifying_parcels<'a>(
    parcels: &'a [Parcel],
    filter: &'a ParcelFilter,
) -> impl Iterator<Item = &'a Parcel> + 'a {
    parcels.iter().filter(move |p| {
        p.zoning_status != ZoningStatus::Denied && p.acreage.is_some_and(|a| filter.accepts(a))
    })
}

/// The point a city's proximity and synergy are measured from.
///
/// Centroid of geocoded own stores, else of qualifying parcels, else of
/// competitors.
#[must_use]
pub fn focal_point(
    stores: &[Location],
    parcels: &[Parcel],
    competitors: &[Location],
    filter: &ParcelFilter,
) -> Option<Coordinates> {
    centroid(stores)
        .or_else(|| centroid(qualifying_parcels(parcels, filter)))
        .or_else(|| centroid(competitors))
}

/// Scores every qualifying parcel as a concrete site, best synergy
/// first. Ties keep parcel order.
#[must_use]
pub fn evaluate_parcels(
    parcels: &[Parcel],
    competitors: &[Location],
    synergy_pool: &[Location],
    filter: &ParcelFilter,
    synergy: &SynergyConfig,
) -> Vec<SiteCandidate> {
    let mut candidates: Vec<SiteCandidate> = qualifying_parcels(parcels, filter)
        .map(|parcel| SiteCandidate {
            parcel_id: parcel.location.id.clone(),
            address: parcel.location.address.clone(),
            acreage: parcel.acreage,
            zoning_status: parcel.zoning_status,
            coordinates: parcel.coordinates(),
            nearest_competitor_distance_miles: compute_proximity(parcel, competitors),
            synergy_score: compute_synergy(parcel, synergy_pool, synergy),
        })
        .collect();

    candidates.sort_by(|a, b| b.synergy_score.total_cmp(&a.synergy_score));
    candidates
}
