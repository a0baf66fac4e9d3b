#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Expansion pattern analyzer.
//!
//! Reads a region's store-opening history together with the per-city
//! analytics and derives the order in which the chain entered cities,
//! how fast it is opening stores, how mature the region is, and which
//! unserved cities have the most room left.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use site_forecast_analytics_models::AnalyticsResult;
use site_forecast_expansion_models::{
    EntryPoint, Maturity, OpportunityCity, PatternResult, SimilarMarket,
};
use site_forecast_site_models::{CityKey, ExpansionEvent};
use thiserror::Error;

/// Average days per year, used to convert opening spans to years.
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Error returned when expansion thresholds are unusable.
#[derive(Debug, Error)]
#[error("Invalid expansion configuration: {message}")]
pub struct InvalidExpansionConfig {
    /// Description of what went wrong.
    pub message: String,
}

/// Maturity thresholds (`[expansion]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Stores per year at or above which a thin market is growing.
    pub growing_velocity: f64,
    /// Stores per 100k at or above which a region is mature.
    pub mature_density_per_100k: f64,
    /// Stores per 100k at or above which a region is saturated.
    pub saturated_density_per_100k: f64,
    /// Store count above which a slow-opening region is mature
    /// regardless of density.
    pub mature_store_count: usize,
    /// Cities at or below this population are not ranked.
    pub min_population: i64,
    /// Relative population band for comparable markets. `0.3` accepts
    /// peers between 70% and 130% of a city's population.
    pub similar_population_band: f64,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            growing_velocity: 5.0,
            mature_density_per_100k: 2.0,
            saturated_density_per_100k: 4.0,
            mature_store_count: 200,
            min_population: 0,
            similar_population_band: 0.3,
        }
    }
}

impl ExpansionConfig {
    /// # Errors
    ///
    /// Fails when a threshold is not a positive number or the density
    /// thresholds are out of order.
    pub fn validate(&self) -> Result<(), InvalidExpansionConfig> {
        let checks = [
            ("growing_velocity", self.growing_velocity),
            ("mature_density_per_100k", self.mature_density_per_100k),
            ("saturated_density_per_100k", self.saturated_density_per_100k),
        ];
        for (name, value) in checks {
            if !(value.is_finite() && value > 0.0) {
                return Err(InvalidExpansionConfig {
                    message: format!("expansion.{name} must be a positive number, got {value}"),
                });
            }
        }
        if self.mature_density_per_100k > self.saturated_density_per_100k {
            return Err(InvalidExpansionConfig {
                message: "expansion.mature_density_per_100k exceeds saturated_density_per_100k"
                    .to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.similar_population_band) {
            return Err(InvalidExpansionConfig {
                message: format!(
                    "expansion.similar_population_band must be within [0, 1], got {}",
                    self.similar_population_band
                ),
            });
        }
        if self.min_population < 0 {
            return Err(InvalidExpansionConfig {
                message: "expansion.min_population must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Orders openings by date, undated ones last in collection order.
///
/// Dated openings that share a date are ordered by their reported
/// sequence; the sort is stable, so identical input always gives an
/// identical ordering.
#[must_use]
pub fn sort_events(events: &[ExpansionEvent]) -> Vec<&ExpansionEvent> {
    let mut dated: Vec<&ExpansionEvent> = events
        .iter()
        .filter(|e| e.opening_date.is_some())
        .collect();
    dated.sort_by_key(|e| (e.opening_date, e.sequence));
    dated.extend(events.iter().filter(|e| e.opening_date.is_none()));
    dated
}

/// First opening in each city, in entry order.
#[must_use]
pub fn entry_sequence(events: &[ExpansionEvent]) -> Vec<EntryPoint> {
    let mut seen = BTreeSet::new();
    sort_events(events)
        .into_iter()
        .filter(|e| seen.insert(e.city_key()))
        .map(|e| EntryPoint {
            city: e.city.clone(),
            state: e.state.clone(),
            opening_date: e.opening_date,
            coordinates: e.coordinates(),
        })
        .collect()
}

/// Stores opened per year between the first and latest dated opening.
///
/// `None` with fewer than two dated openings or when they all share one
/// date.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_velocity(events: &[ExpansionEvent]) -> Option<f64> {
    let dates: Vec<_> = events.iter().filter_map(|e| e.opening_date).collect();
    if dates.len() < 2 {
        return None;
    }
    let first = dates.iter().min()?;
    let last = dates.iter().max()?;
    let days = (*last - *first).num_days();
    if days <= 0 {
        return None;
    }
    Some(dates.len() as f64 / (days as f64 / DAYS_PER_YEAR))
}

/// Classifies a region from its opening velocity and store density.
///
/// In order: no stores or no dated history is emerging; density at the
/// saturated threshold is saturated; fast openings into a thin market
/// are growing; high density, or a large slow-opening footprint, is
/// mature; anything else is still emerging.
#[must_use]
pub fn classify_maturity(
    velocity: Option<f64>,
    density_per_100k: Option<f64>,
    store_count: usize,
    dated_event_count: usize,
    config: &ExpansionConfig,
) -> Maturity {
    if store_count == 0 || dated_event_count == 0 {
        return Maturity::Emerging;
    }
    if density_per_100k.is_some_and(|d| d >= config.saturated_density_per_100k) {
        return Maturity::Saturated;
    }
    let fast = velocity.is_some_and(|v| v >= config.growing_velocity);
    if fast && density_per_100k.is_none_or(|d| d < config.mature_density_per_100k) {
        return Maturity::Growing;
    }
    if density_per_100k.is_some_and(|d| d >= config.mature_density_per_100k)
        || (store_count > config.mature_store_count && !fast)
    {
        return Maturity::Mature;
    }
    Maturity::Emerging
}

/// Own stores per 100k across cities with a known positive population.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn region_density(analytics: &[AnalyticsResult]) -> Option<f64> {
    let (stores, population) = analytics
        .iter()
        .filter_map(|a| a.population.filter(|p| *p > 0).map(|p| (a.store_count, p)))
        .fold((0_usize, 0_i64), |(s, p), (stores, pop)| (s + stores, p.saturating_add(pop)));
    (population > 0).then(|| stores as f64 / (population as f64 / 100_000.0))
}

/// Mean distance in miles between consecutive geocoded entries.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average_entry_step(entries: &[EntryPoint]) -> Option<f64> {
    let points: Vec<_> = entries.iter().filter_map(|e| e.coordinates).collect();
    let steps: Vec<f64> = points
        .windows(2)
        .filter_map(|pair| site_forecast_spatial::distance(&pair[0], &pair[1]))
        .collect();
    (!steps.is_empty()).then(|| steps.iter().sum::<f64>() / steps.len() as f64)
}

/// Served cities whose population lies within `band` of `population`,
/// closest in size first, then by name.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similar_markets(
    population: i64,
    analytics: &[AnalyticsResult],
    band: f64,
) -> Vec<SimilarMarket> {
    let target = population as f64;
    let range = (target * (1.0 - band))..=(target * (1.0 + band));

    let mut peers: Vec<SimilarMarket> = analytics
        .iter()
        .filter(|a| a.store_count > 0)
        .filter_map(|a| {
            let peer_population = a.population.filter(|p| *p > 0)?;
            range
                .contains(&(peer_population as f64))
                .then(|| SimilarMarket {
                    city: a.city.clone(),
                    state: a.state.clone(),
                    population: peer_population,
                    store_count: a.store_count,
                    stores_per_100k: a.stores_per_100k,
                })
        })
        .collect();

    peers.sort_by(|a, b| {
        a.population
            .abs_diff(population)
            .cmp(&b.population.abs_diff(population))
            .then_with(|| a.city.cmp(&b.city))
    });
    peers
}

#[allow(clippy::cast_precision_loss)]
fn average_store_count(peers: &[SimilarMarket]) -> Option<f64> {
    (!peers.is_empty())
        .then(|| peers.iter().map(|p| p.store_count).sum::<usize>() as f64 / peers.len() as f64)
}

/// Unserved cities sorted by `1 - saturation` descending, then
/// population descending, then city name ascending.
///
/// A city is unserved when it has no own store and the chain never
/// opened there; it must also carry a population above the configured
/// minimum. Each is paired with its [`similar_markets`].
#[must_use]
pub fn rank_opportunities(
    analytics: &[AnalyticsResult],
    entered: &BTreeSet<CityKey>,
    config: &ExpansionConfig,
) -> Vec<OpportunityCity> {
    let mut ranked: Vec<OpportunityCity> = analytics
        .iter()
        .filter(|a| a.store_count == 0 && !entered.contains(&a.city_key()))
        .filter(|a| a.population.is_some_and(|p| p > 0 && p > config.min_population))
        .map(|a| {
            let similar = a
                .population
                .map(|p| similar_markets(p, analytics, config.similar_population_band))
                .unwrap_or_default();
            OpportunityCity {
                city: a.city.clone(),
                state: a.state.clone(),
                population: a.population,
                stores_per_100k: a.stores_per_100k,
                saturation_score: a.saturation_score,
                opportunity_score: a.opportunity_score(),
                synergy_score: a.synergy_score,
                coordinates: a
                    .candidate_sites
                    .iter()
                    .find_map(|s| s.coordinates)
                    .or(a.focal_point),
                average_stores_in_similar: average_store_count(&similar),
                similar_markets: similar,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.opportunity_score
            .total_cmp(&a.opportunity_score)
            .then_with(|| b.population.cmp(&a.population))
            .then_with(|| a.city.cmp(&b.city))
    });
    ranked
}

/// Builds the [`PatternResult`] for one region.
///
/// Never fails: missing history degrades velocity to `None` and maturity
/// to emerging, and the opportunity ranking still uses whatever
/// analytics exist.
#[must_use]
pub fn analyze_region(
    region: &str,
    events: &[ExpansionEvent],
    analytics: &[AnalyticsResult],
    config: &ExpansionConfig,
) -> PatternResult {
    let entry_sequence = entry_sequence(events);
    let dated_event_count = events.iter().filter(|e| e.opening_date.is_some()).count();
    let velocity = compute_velocity(events);
    let region_stores_per_100k = region_density(analytics);
    let store_count = analytics.iter().map(|a| a.store_count).sum();

    if dated_event_count == 0 {
        log::warn!("Region {region} has no dated openings; velocity is undefined");
    }

    let maturity = classify_maturity(
        velocity,
        region_stores_per_100k,
        store_count,
        dated_event_count,
        config,
    );

    let entered: BTreeSet<CityKey> = entry_sequence
        .iter()
        .map(|e| CityKey::new(&e.city, &e.state))
        .collect();
    let opportunity_ranking = rank_opportunities(analytics, &entered, config);

    log::info!(
        "Region {region}: {} cities entered, velocity {velocity:?}, {maturity}, {} opportunities",
        entry_sequence.len(),
        opportunity_ranking.len()
    );

    PatternResult {
        region: region.to_string(),
        average_entry_step_miles: average_entry_step(&entry_sequence),
        entry_sequence,
        dated_event_count,
        total_event_count: events.len(),
        velocity,
        maturity,
        region_stores_per_100k,
        opportunity_ranking,
    }
}
