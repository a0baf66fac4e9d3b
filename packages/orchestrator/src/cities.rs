//! Splits a collected snapshot into per-city slices for the analyzing
//! stage.

use std::collections::BTreeMap;

use site_forecast_site_models::{CityKey, CollectedSnapshot, DemographicRecord, Location, Parcel};

/// Everything collected for one city.
#[derive(Debug, Clone, Default)]
pub struct CityBucket {
    /// City name as first collected.
    pub city: String,
    /// Normalized state code.
    pub state: String,
    /// Own-chain stores in the city.
    pub stores: Vec<Location>,
    /// Competitor locations in the city.
    pub competitors: Vec<Location>,
    /// Candidate parcels in the city.
    pub parcels: Vec<Parcel>,
    /// Most recent record when several years were collected.
    pub demographics: Option<DemographicRecord>,
}

impl CityBucket {
    fn name_from(&mut self, city: &str, state: &str) {
        if self.city.is_empty() {
            city.trim().clone_into(&mut self.city);
            state.trim().to_uppercase().clone_into(&mut self.state);
        }
    }
}

/// Groups the snapshot by city, in city key order.
///
/// A city appears when any store, competitor, parcel or demographic
/// record names it. Display names come from the demographic record when
/// there is one.
#[must_use]
pub fn group_by_city(snapshot: &CollectedSnapshot) -> BTreeMap<CityKey, CityBucket> {
    let mut buckets: BTreeMap<CityKey, CityBucket> = BTreeMap::new();

    for record in &snapshot.demographics {
        let bucket = buckets.entry(record.city_key()).or_default();
        let newer = bucket
            .demographics
            .as_ref()
            .is_none_or(|current| record.data_year >= current.data_year);
        if newer {
            bucket.city = record.city.trim().to_string();
            bucket.state = record.state.trim().to_uppercase();
            bucket.demographics = Some(record.clone());
        }
    }
    for store in &snapshot.stores {
        let bucket = buckets.entry(store.city_key()).or_default();
        bucket.name_from(&store.city, &store.state);
        bucket.stores.push(store.clone());
    }
    for competitor in &snapshot.competitors {
        let bucket = buckets.entry(competitor.city_key()).or_default();
        bucket.name_from(&competitor.city, &competitor.state);
        bucket.competitors.push(competitor.clone());
    }
    for parcel in &snapshot.parcels {
        let bucket = buckets.entry(parcel.city_key()).or_default();
        bucket.name_from(&parcel.location.city, &parcel.location.state);
        bucket.parcels.push(parcel.clone());
    }

    buckets
}
