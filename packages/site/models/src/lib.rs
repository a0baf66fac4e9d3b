#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Collected retail-site entities.
//!
//! These are immutable snapshots as of collection time: own-chain stores,
//! competitor and anchor locations, demographic records, candidate
//! parcels, and the historical store-opening timeline of a region. The
//! analytics layer only ever reads them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A latitude/longitude pair in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    /// Latitude, -90 to 90.
    pub latitude: f64,
    /// Longitude, -180 to 180.
    pub longitude: f64,
}

impl Coordinates {
    /// Creates a coordinate pair without validation.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Builds coordinates from nullable parts.
    ///
    /// Returns `None` when either part is missing, non-finite or out of
    /// range, so that bad upstream geocodes are treated the same as
    /// missing ones.
    #[must_use]
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        let (latitude, longitude) = (latitude?, longitude?);
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self::new(latitude, longitude))
    }
}

/// Normalized `(city, state)` pair used to group entities by city.
///
/// City names are trimmed, whitespace-collapsed and lowercased; state
/// codes are trimmed and uppercased, so `"St. Petersburg", "fl"` and
/// `" st.  petersburg", "FL"` land in the same bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CityKey {
    /// Normalized city name.
    pub city: String,
    /// Normalized state code.
    pub state: String,
}

impl CityKey {
    /// Normalizes a raw city/state pair.
    #[must_use]
    pub fn new(city: &str, state: &str) -> Self {
        Self {
            city: city
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
            state: state.trim().to_uppercase(),
        }
    }
}

impl std::fmt::Display for CityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.city, self.state)
    }
}

/// A point of retail interest: an own-chain store, a competitor, or an
/// anchor tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Upstream identifier (store number, place ID, APN).
    #[serde(default)]
    pub id: String,
    /// Brand or chain name, e.g. `"Walmart"`.
    pub brand: Option<String>,
    /// Street address.
    #[serde(default)]
    pub address: String,
    /// City name as collected.
    pub city: String,
    /// Two-letter state code.
    pub state: String,
    /// ZIP code.
    pub zip: Option<String>,
    /// Latitude, if geocoded.
    pub latitude: Option<f64>,
    /// Longitude, if geocoded.
    pub longitude: Option<f64>,
    /// Building size in square feet.
    pub square_feet: Option<u32>,
}

impl Location {
    /// Validated coordinates, or `None` when missing or out of range.
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }

    /// The city bucket this location belongs to.
    #[must_use]
    pub fn city_key(&self) -> CityKey {
        CityKey::new(&self.city, &self.state)
    }
}

/// Census-style demographic facts for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicRecord {
    /// City name.
    pub city: String,
    /// Two-letter state code.
    pub state: String,
    /// Total population. Negative values are malformed.
    pub population: Option<i64>,
    /// Median household income in dollars.
    pub median_income: Option<f64>,
    /// Median age in years.
    pub median_age: Option<f64>,
    /// Average household size.
    pub household_size: Option<f64>,
    /// Annual population growth rate (e.g. `0.021` for 2.1%). Upstream
    /// growth computation can fail independently, hence nullable.
    pub growth_rate: Option<f64>,
    /// Land area in square miles, when the source provides it.
    pub land_area_sq_mi: Option<f64>,
    /// Survey year the figures are drawn from.
    pub data_year: Option<i32>,
}

impl DemographicRecord {
    /// The city bucket this record describes.
    #[must_use]
    pub fn city_key(&self) -> CityKey {
        CityKey::new(&self.city, &self.state)
    }
}

/// Planning/zoning status of a parcel.
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
pub enum ZoningStatus {
    /// No zoning record found.
    #[default]
    Unknown,
    /// A rezoning or permit application is in progress.
    Pending,
    /// Zoning allows commercial development.
    Approved,
    /// Zoning request was denied.
    Denied,
}

/// A land parcel that could host a new store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    /// Address, city and coordinates of the parcel. `id` holds the APN.
    #[serde(flatten)]
    pub location: Location,
    /// Parcel size in acres.
    pub acreage: Option<f64>,
    /// Current zoning status.
    #[serde(default)]
    pub zoning_status: ZoningStatus,
    /// Owner name as recorded by the assessor.
    pub owner: Option<String>,
    /// Assessed value in dollars.
    pub assessed_value: Option<f64>,
}

impl Parcel {
    /// Validated coordinates of the parcel.
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        self.location.coordinates()
    }

    /// The city bucket this parcel belongs to.
    #[must_use]
    pub fn city_key(&self) -> CityKey {
        self.location.city_key()
    }
}

/// A historical store opening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionEvent {
    /// City the store opened in.
    pub city: String,
    /// Two-letter state code.
    pub state: String,
    /// Opening date, if known.
    pub opening_date: Option<NaiveDate>,
    /// Position within the region's timeline as reported by the source.
    #[serde(default)]
    pub sequence: u32,
    /// Latitude of the opened store, if known.
    pub latitude: Option<f64>,
    /// Longitude of the opened store, if known.
    pub longitude: Option<f64>,
}

impl ExpansionEvent {
    /// Validated coordinates of the opened store.
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.latitude, self.longitude)
    }

    /// The city bucket this event belongs to.
    #[must_use]
    pub fn city_key(&self) -> CityKey {
        CityKey::new(&self.city, &self.state)
    }
}

/// Everything a collector returned for one region in one collection pass.
///
/// Any list may be empty. Only the first five lists count as collection
/// signals; `anchors` is supplementary co-tenancy data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectedSnapshot {
    /// Own-chain stores.
    pub stores: Vec<Location>,
    /// Competitor stores.
    pub competitors: Vec<Location>,
    /// Demographic records, one per city.
    pub demographics: Vec<DemographicRecord>,
    /// Candidate parcels.
    pub parcels: Vec<Parcel>,
    /// Historical store openings.
    pub expansion_events: Vec<ExpansionEvent>,
    /// Complementary anchor tenants (not competitors).
    pub anchors: Vec<Location>,
}

impl CollectedSnapshot {
    /// Returns `true` when none of the five collection signals carried
    /// any entity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.empty_signals().len() == 5
    }

    /// Names of the collection signals that came back empty.
    #[must_use]
    pub fn empty_signals(&self) -> Vec<&'static str> {
        [
            ("stores", self.stores.is_empty()),
            ("competitors", self.competitors.is_empty()),
            ("demographics", self.demographics.is_empty()),
            ("parcels", self.parcels.is_empty()),
            ("expansion_events", self.expansion_events.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect()
    }
}

/// Natural business key of a location: normalized street address within
/// a city. Falls back to the upstream id when the address is blank.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocationKey {
    /// Normalized city.
    pub city: CityKey,
    /// Normalized street address, or `#<id>` without one.
    pub address: String,
}

/// Natural business key of a demographic record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DemographicKey {
    /// Normalized city.
    pub city: CityKey,
    /// Census or survey year.
    pub data_year: Option<i32>,
}

/// Natural business key of an expansion event.
///
/// Sources without dates or sequence numbers report every opening of a
/// city as date `None`, sequence 0, so the store's geocode is part of
/// the key. Openings that match on all four are the same record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpansionEventKey {
    /// Normalized city.
    pub city: CityKey,
    /// Opening date, if known.
    pub opening_date: Option<NaiveDate>,
    /// Reported timeline position.
    pub sequence: u32,
    /// Bit patterns of the validated latitude and longitude.
    pub coordinates: Option<(u64, u64)>,
}

fn normalize_address(address: &str) -> String {
    address
        .split_whitespace()
        .map(|word| word.trim_end_matches(['.', ',']))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl Location {
    /// Key under which repeated collections of this location collapse.
    #[must_use]
    pub fn natural_key(&self) -> LocationKey {
        let address = normalize_address(&self.address);
        LocationKey {
            city: self.city_key(),
            address: if address.is_empty() {
                format!("#{}", self.id.trim())
            } else {
                address
            },
        }
    }
}

impl DemographicRecord {
    #[must_use]
    pub fn natural_key(&self) -> DemographicKey {
        DemographicKey {
            city: self.city_key(),
            data_year: self.data_year,
        }
    }
}

/// `-0.0` and `0.0` are the same degree.
fn key_bits(degrees: f64) -> u64 {
    if degrees == 0.0 { 0 } else { degrees.to_bits() }
}

impl ExpansionEvent {
    #[must_use]
    pub fn natural_key(&self) -> ExpansionEventKey {
        ExpansionEventKey {
            city: self.city_key(),
            opening_date: self.opening_date,
            sequence: self.sequence,
            coordinates: self
                .coordinates()
                .map(|c| (key_bits(c.latitude), key_bits(c.longitude))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_reject_missing_and_out_of_range() {
        assert!(Coordinates::from_parts(None, Some(-82.0)).is_none());
        assert!(Coordinates::from_parts(Some(27.9), None).is_none());
        assert!(Coordinates::from_parts(Some(91.0), Some(0.0)).is_none());
        assert!(Coordinates::from_parts(Some(0.0), Some(-181.0)).is_none());
        assert!(Coordinates::from_parts(Some(f64::NAN), Some(0.0)).is_none());
        assert_eq!(
            Coordinates::from_parts(Some(27.95), Some(-82.45)),
            Some(Coordinates::new(27.95, -82.45))
        );
    }

    #[test]
    fn city_key_normalizes_case_and_whitespace() {
        assert_eq!(
            CityKey::new(" St.  Petersburg ", "fl"),
            CityKey::new("st. petersburg", "FL")
        );
        assert_eq!(CityKey::new("Tampa", "FL").to_string(), "tampa, FL");
    }

    #[test]
    fn zoning_status_round_trips_through_strings() {
        assert_eq!("approved".parse::<ZoningStatus>(), Ok(ZoningStatus::Approved));
        assert_eq!(ZoningStatus::Denied.as_ref(), "denied");
        assert_eq!(ZoningStatus::default(), ZoningStatus::Unknown);
    }

    #[test]
    fn snapshot_reports_empty_signals() {
        let mut snapshot = CollectedSnapshot::default();
        assert!(snapshot.is_empty());

        snapshot.anchors.push(Location {
            id: "a1".to_string(),
            brand: Some("Target".to_string()),
            address: "1 Main St".to_string(),
            city: "Tampa".to_string(),
            state: "FL".to_string(),
            zip: None,
            latitude: None,
            longitude: None,
            square_feet: None,
        });
        assert!(snapshot.is_empty(), "anchors alone are not a collection signal");

        snapshot.demographics.push(DemographicRecord {
            city: "Tampa".to_string(),
            state: "FL".to_string(),
            population: Some(400_000),
            median_income: None,
            median_age: None,
            household_size: None,
            growth_rate: None,
            land_area_sq_mi: None,
            data_year: Some(2023),
        });
        assert!(!snapshot.is_empty());
        assert_eq!(
            snapshot.empty_signals(),
            vec!["stores", "competitors", "parcels", "expansion_events"]
        );
    }

    #[test]
    fn parcel_flattens_location_fields() {
        let json = r#"{
            "id": "APN-1",
            "address": "100 Oak Rd",
            "city": "Lakeland",
            "state": "FL",
            "latitude": 28.04,
            "longitude": -81.95,
            "acreage": 18.5,
            "zoningStatus": "pending"
        }"#;
        let parcel: Parcel = serde_json::from_str(json).unwrap();
        assert_eq!(parcel.location.id, "APN-1");
        assert_eq!(parcel.zoning_status, ZoningStatus::Pending);
        assert_eq!(parcel.acreage, Some(18.5));
        assert!(parcel.coordinates().is_some());
    }

    #[test]
    fn location_key_ignores_address_formatting() {
        let mut a = Location {
            id: "s-1".to_string(),
            brand: None,
            address: "100 N. Main St.".to_string(),
            city: "Tampa".to_string(),
            state: "FL".to_string(),
            zip: None,
            latitude: None,
            longitude: None,
            square_feet: None,
        };
        let mut b = a.clone();
        b.id = "other-id".to_string();
        b.address = "  100 n main st ".to_string();
        b.state = "fl".to_string();
        assert_eq!(a.natural_key(), b.natural_key());

        a.address = String::new();
        assert_eq!(a.natural_key().address, "#s-1");
    }

    #[test]
    fn undated_openings_are_told_apart_by_geocode() {
        let opening = |lat: Option<f64>, lon: Option<f64>| ExpansionEvent {
            city: "Tampa".to_string(),
            state: "FL".to_string(),
            opening_date: None,
            sequence: 0,
            latitude: lat,
            longitude: lon,
        };
        let north = opening(Some(28.05), Some(-82.46));
        let south = opening(Some(27.90), Some(-82.46));
        assert_ne!(north.natural_key(), south.natural_key());

        let mut recollected = north.clone();
        recollected.city = "tampa".to_string();
        assert_eq!(north.natural_key(), recollected.natural_key());

        assert_eq!(
            opening(Some(0.0), Some(-82.0)).natural_key(),
            opening(Some(-0.0), Some(-82.0)).natural_key()
        );
        assert_eq!(opening(None, None).natural_key().coordinates, None);
    }
}
