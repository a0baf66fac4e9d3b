#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Regional expansion pattern types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use site_forecast_site_models::Coordinates;
use strum_macros::{AsRefStr, Display, EnumString};

/// Where a region sits in a chain's expansion lifecycle.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum Maturity {
    /// Few or no stores, or no usable opening history.
    #[default]
    Emerging,
    /// Opening stores quickly into a thinly served market.
    Growing,
    /// Well served; openings have slowed.
    Mature,
    /// Density beyond which new stores cannibalize existing ones.
    Saturated,
}

/// One step of a region's entry sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    /// City entered.
    pub city: String,
    /// Two-letter state code.
    pub state: String,
    /// `None` for openings with an unknown date; these trail the dated
    /// entries.
    pub opening_date: Option<NaiveDate>,
    /// Location of the first store in the city, if geocoded.
    pub coordinates: Option<Coordinates>,
}

/// A served city of comparable size, used as a yardstick for an
/// unserved one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarMarket {
    /// Peer city.
    pub city: String,
    /// Two-letter state code.
    pub state: String,
    /// Peer population.
    pub population: i64,
    /// Own stores in the city; always at least one.
    pub store_count: usize,
    /// Own stores per 100k residents of the peer.
    pub stores_per_100k: Option<f64>,
}

/// An unserved city ranked by remaining market room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityCity {
    /// Unserved city.
    pub city: String,
    /// Two-letter state code.
    pub state: String,
    /// Population, if known.
    pub population: Option<i64>,
    /// Own stores per 100k residents.
    pub stores_per_100k: Option<f64>,
    /// Saturation of the city's market.
    pub saturation_score: f64,
    /// `1 - saturation_score`, the ranking key.
    pub opportunity_score: f64,
    /// Co-tenancy synergy of the city.
    pub synergy_score: f64,
    /// Where a new store would most plausibly go.
    pub coordinates: Option<Coordinates>,
    /// Served cities within the configured population band, closest in
    /// size first.
    pub similar_markets: Vec<SimilarMarket>,
    /// Mean store count of [`Self::similar_markets`]; `None` without
    /// peers.
    pub average_stores_in_similar: Option<f64>,
}

/// Expansion history and outlook for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternResult {
    /// Region the events were collected for.
    pub region: String,
    /// Openings by date ascending, undated openings last in collection
    /// order.
    pub entry_sequence: Vec<EntryPoint>,
    /// Openings with a known date.
    pub dated_event_count: usize,
    /// All openings.
    pub total_event_count: usize,
    /// Stores opened per year between the first and latest dated
    /// opening; `None` with fewer than two dated openings.
    pub velocity: Option<f64>,
    /// Lifecycle classification of the region.
    pub maturity: Maturity,
    /// Own stores per 100k residents across cities with a known
    /// population.
    pub region_stores_per_100k: Option<f64>,
    /// Mean miles between consecutive geocoded entries.
    pub average_entry_step_miles: Option<f64>,
    /// Unserved cities, most opportunity first.
    pub opportunity_ranking: Vec<OpportunityCity>,
}

impl PatternResult {
    /// A result for a region about which nothing is known.
    #[must_use]
    pub fn empty(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            entry_sequence: Vec::new(),
            dated_event_count: 0,
            total_event_count: 0,
            velocity: None,
            maturity: Maturity::Emerging,
            region_stores_per_100k: None,
            average_entry_step_miles: None,
            opportunity_ranking: Vec::new(),
        }
    }
}
