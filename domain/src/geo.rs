//! Geographic primitives
//!
//! Coordinates, named-region paths and the divergence measure used to
//! compare location hypotheses from different analysts.

use serde::{Deserialize, Serialize};

/// Mean earth radius in meters, used by the haversine distance.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate pair.
///
/// # Example
///
/// ```
/// use terra_domain::geo::Coordinate;
///
/// let paris = Coordinate::new(48.8566, 2.3522).unwrap();
/// let london = Coordinate::new(51.5074, -0.1278).unwrap();
/// let d = paris.distance_meters(&london);
/// assert!(d > 330_000.0 && d < 360_000.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, [-90, 90]
    pub latitude: f64,
    /// Longitude in degrees, [-180, 180]
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting values outside the valid ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance to another coordinate in meters (haversine).
    pub fn distance_meters(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_M * c
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5},{:.5}", self.latitude, self.longitude)
    }
}

/// Invalid coordinate component
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("latitude out of range: {0}")]
    Latitude(f64),
    #[error("longitude out of range: {0}")]
    Longitude(f64),
}

/// A named region as an ordered place path, broadest first
/// (e.g. country → state → city).
///
/// Two regions are comparable when one path is a prefix of the other:
/// "United States / New York" contains "United States / New York / Brooklyn".
///
/// # Example
///
/// ```
/// use terra_domain::geo::Region;
///
/// let state: Region = "United States / New York".parse().unwrap();
/// let city: Region = "United States / New York / Brooklyn".parse().unwrap();
/// assert!(state.contains(&city));
/// assert!(!city.contains(&state));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region(Vec<String>);

impl Region {
    /// Create a region from path segments, broadest first.
    ///
    /// Empty or whitespace-only segments are dropped.
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            path.into_iter()
                .map(Into::into)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    /// Path segments, broadest first.
    pub fn path(&self) -> &[String] {
        &self.0
    }

    /// True when the path is empty (no place information at all).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of path segments.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// True when `other` lies within this region (this path is a prefix
    /// of the other's, case-insensitively). A region contains itself.
    pub fn contains(&self, other: &Region) -> bool {
        if self.0.len() > other.0.len() {
            return false;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// True when the two regions are comparable at all: equal, or one
    /// contained in the other.
    pub fn overlaps(&self, other: &Region) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// The most specific region common to both paths, if any.
    pub fn common_prefix(&self, other: &Region) -> Option<Region> {
        let shared: Vec<String> = self
            .0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a.eq_ignore_ascii_case(b))
            .map(|(a, _)| a.clone())
            .collect();
        if shared.is_empty() {
            None
        } else {
            Some(Region(shared))
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(" / "))
    }
}

impl std::str::FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let region = Region::new(s.split('/'));
        if region.is_empty() {
            Err(format!("empty region path: {:?}", s))
        } else {
            Ok(region)
        }
    }
}

/// A location hypothesis: either an exact coordinate or a named region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LocationHypothesis {
    /// A point prediction
    Point(Coordinate),
    /// A named-region prediction
    Area(Region),
}

impl LocationHypothesis {
    /// Divergence between two hypotheses.
    ///
    /// - point vs point: great-circle distance in meters
    /// - area vs area: `Some(0.0)` when the regions overlap, `None`
    ///   (incompatible categories) when they are disjoint
    /// - point vs area: not comparable, `None` is returned and the pair
    ///   is neither agreement nor contradiction
    pub fn divergence_meters(&self, other: &LocationHypothesis) -> Divergence {
        match (self, other) {
            (LocationHypothesis::Point(a), LocationHypothesis::Point(b)) => {
                Divergence::Meters(a.distance_meters(b))
            }
            (LocationHypothesis::Area(a), LocationHypothesis::Area(b)) => {
                if a.overlaps(b) {
                    Divergence::Meters(0.0)
                } else {
                    Divergence::DisjointRegions
                }
            }
            _ => Divergence::Incomparable,
        }
    }

    /// The coordinate, when this is a point hypothesis.
    pub fn as_point(&self) -> Option<&Coordinate> {
        match self {
            LocationHypothesis::Point(c) => Some(c),
            LocationHypothesis::Area(_) => None,
        }
    }

    /// The region, when this is an area hypothesis.
    pub fn as_area(&self) -> Option<&Region> {
        match self {
            LocationHypothesis::Point(_) => None,
            LocationHypothesis::Area(r) => Some(r),
        }
    }
}

impl std::fmt::Display for LocationHypothesis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationHypothesis::Point(c) => write!(f, "{}", c),
            LocationHypothesis::Area(r) => write!(f, "{}", r),
        }
    }
}

/// Outcome of comparing two hypotheses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Divergence {
    /// Comparable, with a distance (0.0 for overlapping regions)
    Meters(f64),
    /// Named regions with no common ancestor
    DisjointRegions,
    /// Mixed point/area pair, not comparable
    Incomparable,
}

impl Divergence {
    /// Whether this comparison exceeds the contradiction threshold.
    ///
    /// Disjoint regions always contradict; incomparable pairs never do.
    pub fn exceeds(&self, threshold_m: f64) -> bool {
        match self {
            Divergence::Meters(d) => *d > threshold_m,
            Divergence::DisjointRegions => true,
            Divergence::Incomparable => false,
        }
    }

    /// The measured distance, when one exists.
    pub fn meters(&self) -> Option<f64> {
        match self {
            Divergence::Meters(d) => Some(*d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert!(matches!(
            Coordinate::new(90.5, 0.0),
            Err(CoordinateError::Latitude(_))
        ));
        assert!(matches!(
            Coordinate::new(0.0, 181.0),
            Err(CoordinateError::Longitude(_))
        ));
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_haversine_zero_distance() {
        let c = coord(40.7128, -74.0060);
        assert!(c.distance_meters(&c) < 1e-6);
    }

    #[test]
    fn test_haversine_known_distance() {
        // NYC to Chicago, roughly 1,145 km
        let nyc = coord(40.7128, -74.0060);
        let chicago = coord(41.8781, -87.6298);
        let d = nyc.distance_meters(&chicago);
        assert!(d > 1_100_000.0 && d < 1_200_000.0, "got {}", d);
    }

    #[test]
    fn test_haversine_short_distance() {
        // Two points ~111m apart along a meridian (0.001 deg latitude)
        let a = coord(48.0, 11.0);
        let b = coord(48.001, 11.0);
        let d = a.distance_meters(&b);
        assert!(d > 100.0 && d < 120.0, "got {}", d);
    }

    #[test]
    fn test_region_parse_and_display() {
        let r: Region = "United States / New York / Brooklyn".parse().unwrap();
        assert_eq!(r.depth(), 3);
        assert_eq!(r.to_string(), "United States / New York / Brooklyn");
        assert!("   ".parse::<Region>().is_err());
    }

    #[test]
    fn test_region_containment() {
        let country: Region = "Japan".parse().unwrap();
        let city: Region = "Japan / Tokyo".parse().unwrap();
        let other: Region = "Chile / Santiago".parse().unwrap();

        assert!(country.contains(&city));
        assert!(!city.contains(&country));
        assert!(country.contains(&country));
        assert!(country.overlaps(&city));
        assert!(!country.overlaps(&other));
    }

    #[test]
    fn test_region_containment_case_insensitive() {
        let a: Region = "japan / tokyo".parse().unwrap();
        let b: Region = "Japan / Tokyo / Shibuya".parse().unwrap();
        assert!(a.contains(&b));
    }

    #[test]
    fn test_region_common_prefix() {
        let a: Region = "France / Provence / Marseille".parse().unwrap();
        let b: Region = "France / Provence / Aix".parse().unwrap();
        let c: Region = "Spain / Andalusia".parse().unwrap();

        let shared = a.common_prefix(&b).unwrap();
        assert_eq!(shared.to_string(), "France / Provence");
        assert!(a.common_prefix(&c).is_none());
    }

    #[test]
    fn test_divergence_points() {
        let a = LocationHypothesis::Point(coord(48.0, 11.0));
        let b = LocationHypothesis::Point(coord(48.001, 11.0));
        let d = a.divergence_meters(&b);
        assert!(d.meters().unwrap() < 150.0);
        assert!(!d.exceeds(500.0));
        assert!(d.exceeds(50.0));
    }

    #[test]
    fn test_divergence_regions() {
        let a = LocationHypothesis::Area("Italy / Tuscany".parse().unwrap());
        let b = LocationHypothesis::Area("Italy / Tuscany / Florence".parse().unwrap());
        let c = LocationHypothesis::Area("Greece / Crete".parse().unwrap());

        assert_eq!(a.divergence_meters(&b), Divergence::Meters(0.0));
        assert_eq!(a.divergence_meters(&c), Divergence::DisjointRegions);
        assert!(a.divergence_meters(&c).exceeds(f64::MAX));
    }

    #[test]
    fn test_divergence_mixed_pair_incomparable() {
        let point = LocationHypothesis::Point(coord(35.0, 139.0));
        let area = LocationHypothesis::Area("Japan / Tokyo".parse().unwrap());
        let d = point.divergence_meters(&area);
        assert_eq!(d, Divergence::Incomparable);
        assert!(!d.exceeds(0.0));
    }
}
