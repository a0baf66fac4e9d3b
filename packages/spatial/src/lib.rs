#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geospatial primitives over latitude/longitude pairs.
//!
//! Every function here tolerates missing coordinates: a point without a
//! valid geocode yields `None` ("undefined") rather than an error or a
//! zero, and is skipped by searches over candidate sets. Distances are
//! great-circle (haversine) distances in statute miles.

use geo::{Centroid, Distance, Haversine, MultiPoint, Point, Rect, coord};
use site_forecast_site_models::{Coordinates, ExpansionEvent, Location, Parcel};

/// Meters in one statute mile.
pub const METERS_PER_MILE: f64 = 1_609.344;

/// Approximate miles per degree of latitude, used only for the cheap
/// envelope pre-filter in [`within_radius`].
const MILES_PER_DEGREE_LAT: f64 = 69.0;

/// Anything that may carry a geocode.
pub trait Located {
    /// Validated coordinates, or `None` when the entity has no usable
    /// geocode.
    fn coordinates(&self) -> Option<Coordinates>;
}

impl Located for Coordinates {
    fn coordinates(&self) -> Option<Coordinates> {
        Some(*self)
    }
}

impl Located for Option<Coordinates> {
    fn coordinates(&self) -> Option<Coordinates> {
        *self
    }
}

impl Located for Location {
    fn coordinates(&self) -> Option<Coordinates> {
        Self::coordinates(self)
    }
}

impl Located for Parcel {
    fn coordinates(&self) -> Option<Coordinates> {
        Self::coordinates(self)
    }
}

impl Located for ExpansionEvent {
    fn coordinates(&self) -> Option<Coordinates> {
        Self::coordinates(self)
    }
}

impl<T: Located + ?Sized> Located for &T {
    fn coordinates(&self) -> Option<Coordinates> {
        (**self).coordinates()
    }
}

fn to_point(c: Coordinates) -> Point<f64> {
    Point::new(c.longitude, c.latitude)
}

/// Great-circle distance in miles between two points.
///
/// Returns `None` when either point lacks coordinates.
#[must_use]
pub fn distance<A: Located + ?Sized, B: Located + ?Sized>(a: &A, b: &B) -> Option<f64> {
    let (a, b) = (a.coordinates()?, b.coordinates()?);
    Some(Haversine.distance(to_point(a), to_point(b)) / METERS_PER_MILE)
}

/// The winning candidate of a [`nearest`] search.
#[derive(Debug, Clone, PartialEq)]
pub struct Nearest<'a, C> {
    /// Position of the candidate in the input slice.
    pub index: usize,
    /// The candidate itself.
    pub candidate: &'a C,
    /// Distance from the query point in miles.
    pub distance_miles: f64,
}

/// Finds the candidate closest to `point`.
///
/// Candidates without coordinates are skipped. Ties keep the earliest
/// candidate in slice order. Returns `None` when `point` has no
/// coordinates, `candidates` is empty, or no candidate has coordinates.
#[must_use]
pub fn nearest<'a, P: Located + ?Sized, C: Located>(
    point: &P,
    candidates: &'a [C],
) -> Option<Nearest<'a, C>> {
    let origin = point.coordinates()?;
    let mut best: Option<Nearest<'a, C>> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let Some(distance_miles) = distance(&origin, candidate) else {
            continue;
        };
        if best
            .as_ref()
            .is_none_or(|b| distance_miles < b.distance_miles)
        {
            best = Some(Nearest {
                index,
                candidate,
                distance_miles,
            });
        }
    }

    best
}

/// Lat/lon envelope that contains every point within `radius_miles` of
/// `center`.
///
/// Returns `None` when the envelope would cross a pole or the
/// antimeridian; callers then fall back to exact distance checks.
#[must_use]
pub fn search_envelope(center: Coordinates, radius_miles: f64) -> Option<Rect<f64>> {
    let lat_delta = radius_miles / MILES_PER_DEGREE_LAT;
    let min_lat = center.latitude - lat_delta;
    let max_lat = center.latitude + lat_delta;
    if min_lat < -90.0 || max_lat > 90.0 {
        return None;
    }

    // Widest longitude span occurs at the latitude edge nearest a pole.
    let widest_lat = min_lat.abs().max(max_lat.abs()).to_radians();
    let lon_delta = radius_miles / (MILES_PER_DEGREE_LAT * widest_lat.cos());
    let min_lon = center.longitude - lon_delta;
    let max_lon = center.longitude + lon_delta;
    if !lon_delta.is_finite() || min_lon < -180.0 || max_lon > 180.0 {
        return None;
    }

    Some(Rect::new(
        coord! { x: min_lon, y: min_lat },
        coord! { x: max_lon, y: max_lat },
    ))
}

fn envelope_contains(envelope: &Rect<f64>, c: Coordinates) -> bool {
    let (min, max) = (envelope.min(), envelope.max());
    (min.x..=max.x).contains(&c.longitude) && (min.y..=max.y).contains(&c.latitude)
}

/// Candidates within `radius_miles` (inclusive) of `point`, in slice
/// order.
///
/// Candidates without coordinates are skipped; a `point` without
/// coordinates yields nothing.
pub fn within_radius<'a, P: Located + ?Sized, C: Located>(
    point: &P,
    candidates: &'a [C],
    radius_miles: f64,
) -> impl Iterator<Item = &'a C> + 'a {
    let origin = point.coordinates();
    let envelope = origin.and_then(|o| search_envelope(o, radius_miles));
    if origin.is_some() && envelope.is_none() {
        log::debug!("Radius search near pole or antimeridian; using exact distances only");
    }

    candidates.iter().filter(move |candidate| {
        let (Some(origin), Some(coords)) = (origin, candidate.coordinates()) else {
            return false;
        };
        if let Some(envelope) = &envelope
            && !envelope_contains(envelope, coords)
        {
            return false;
        }
        distance(&origin, &coords).is_some_and(|d| d <= radius_miles)
    })
}

/// Arithmetic centroid of the points that have coordinates.
///
/// Returns `None` when no point has coordinates.
#[must_use]
pub fn centroid<I>(points: I) -> Option<Coordinates>
where
    I: IntoIterator,
    I::Item: Located,
{
    let points: Vec<Point<f64>> = points
        .into_iter()
        .filter_map(|p| p.coordinates())
        .map(to_point)
        .collect();
    if points.is_empty() {
        return None;
    }

    MultiPoint::from(points)
        .centroid()
        .map(|c| Coordinates::new(c.y(), c.x()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAMPA: Coordinates = Coordinates::new(27.9506, -82.4572);
    const ORLANDO: Coordinates = Coordinates::new(28.5383, -81.3792);

    fn store(id: &str, lat: Option<f64>, lon: Option<f64>) -> Location {
        Location {
            id: id.to_string(),
            brand: None,
            address: String::new(),
            city: "Tampa".to_string(),
            state: "FL".to_string(),
            zip: None,
            latitude: lat,
            longitude: lon,
            square_feet: None,
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(distance(&TAMPA, &TAMPA), Some(0.0));
    }

    #[test]
    fn distance_is_symmetric() {
        let ab = distance(&TAMPA, &ORLANDO).unwrap();
        let ba = distance(&ORLANDO, &TAMPA).unwrap();
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn distance_tampa_orlando_is_about_78_miles() {
        let d = distance(&TAMPA, &ORLANDO).unwrap();
        assert!((74.0..82.0).contains(&d), "got {d}");
    }

    #[test]
    fn distance_is_undefined_without_coordinates() {
        let missing = store("x", Some(27.9), None);
        assert_eq!(distance(&missing, &TAMPA), None);
        assert_eq!(distance(&TAMPA, &missing), None);
        assert_eq!(distance(&None::<Coordinates>, &TAMPA), None);
    }

    #[test]
    fn nearest_skips_candidates_without_coordinates() {
        let candidates = vec![
            store("no-geo", None, None),
            store("orlando", Some(ORLANDO.latitude), Some(ORLANDO.longitude)),
            store("near", Some(27.96), Some(-82.46)),
        ];
        let hit = nearest(&TAMPA, &candidates).unwrap();
        assert_eq!(hit.index, 2);
        assert_eq!(hit.candidate.id, "near");
    }

    #[test]
    fn nearest_breaks_ties_by_insertion_order() {
        let candidates = vec![
            store("first", Some(28.0), Some(-82.0)),
            store("second", Some(28.0), Some(-82.0)),
        ];
        let hit = nearest(&TAMPA, &candidates).unwrap();
        assert_eq!(hit.candidate.id, "first");
    }

    #[test]
    fn nearest_is_none_for_empty_or_ungeocoded_candidates() {
        let empty: Vec<Location> = Vec::new();
        assert!(nearest(&TAMPA, &empty).is_none());

        let ungeocoded = vec![store("a", None, None), store("b", Some(1.0), None)];
        assert!(nearest(&TAMPA, &ungeocoded).is_none());

        let geocoded = vec![store("c", Some(28.0), Some(-82.0))];
        assert!(nearest(&None::<Coordinates>, &geocoded).is_none());
    }

    #[test]
    fn within_radius_is_inclusive_and_ordered() {
        let candidates = vec![
            store("far", Some(ORLANDO.latitude), Some(ORLANDO.longitude)),
            store("close-a", Some(27.955), Some(-82.457)),
            store("no-geo", None, None),
            store("close-b", Some(27.9506), Some(-82.4572)),
        ];
        let ids: Vec<&str> = within_radius(&TAMPA, &candidates, 1.0)
            .map(|l| l.id.as_str())
            .collect();
        assert_eq!(ids, vec!["close-a", "close-b"]);
    }

    #[test]
    fn search_envelope_gives_up_at_the_antimeridian() {
        assert!(search_envelope(Coordinates::new(0.0, 179.99), 5.0).is_none());
        assert!(search_envelope(Coordinates::new(89.99, 0.0), 5.0).is_none());
        let rect = search_envelope(TAMPA, 1.0).unwrap();
        assert!(rect.min().y < TAMPA.latitude && rect.max().y > TAMPA.latitude);
    }

    #[test]
    fn centroid_ignores_points_without_coordinates() {
        let points = vec![
            store("a", Some(28.0), Some(-82.0)),
            store("b", None, None),
            store("c", Some(30.0), Some(-84.0)),
        ];
        let c = centroid(&points).unwrap();
        assert!((c.latitude - 29.0).abs() < 1e-9);
        assert!((c.longitude - (-83.0)).abs() < 1e-9);

        let none: Vec<Location> = vec![store("b", None, None)];
        assert!(centroid(&none).is_none());
    }
}
